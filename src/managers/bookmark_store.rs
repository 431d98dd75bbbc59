//! Bookmark Store for Markboard.
//!
//! The in-memory ordered list of bookmarks shown by the dashboard. Every
//! mutation is a read-modify-write against the current value held by a
//! `tokio::sync::watch` channel, so concurrent sources (initial fetch, change
//! feed) compose regardless of interleaving, and observers get notified.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::types::bookmark::Bookmark;
use crate::types::change::ChangeEvent;

/// Liveness token for one mount of the dashboard.
///
/// Cloned into every continuation that may outlive the mount; once revoked, those
/// continuations must not touch view state.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// A token that was never live.
    pub fn revoked() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn revoke(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, observable list of bookmarks.
#[derive(Debug, Clone)]
pub struct BookmarkStore {
    tx: Arc<watch::Sender<Vec<Bookmark>>>,
}

impl BookmarkStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx: Arc::new(tx) }
    }

    /// Returns a copy of the current list.
    pub fn snapshot(&self) -> Vec<Bookmark> {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Returns a receiver notified on every change to the list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Bookmark>> {
        self.tx.subscribe()
    }

    /// Replaces the contents wholesale.
    pub fn replace_all(&self, bookmarks: Vec<Bookmark>) {
        self.tx.send_modify(|current| *current = bookmarks);
    }

    /// Puts `bookmark` at index 0. No de-duplication and no re-sort.
    pub fn prepend(&self, bookmark: Bookmark) {
        self.tx.send_modify(|current| current.insert(0, bookmark));
    }

    /// Removes every bookmark with `id`. Returns whether anything was removed.
    pub fn remove(&self, id: &str) -> bool {
        self.tx.send_if_modified(|current| remove_by_id(current, id))
    }

    pub fn clear(&self) {
        self.tx.send_if_modified(|current| {
            let changed = !current.is_empty();
            current.clear();
            changed
        });
    }

    /// Applies a decoded change event.
    pub fn apply(&self, event: &ChangeEvent) -> bool {
        self.tx.send_if_modified(|current| apply_event(current, event))
    }

    /// Applies `event` only while `liveness` holds.
    ///
    /// The check happens under the store lock, so it cannot race with [`retire`](Self::retire).
    pub fn apply_if_live(&self, liveness: &Liveness, event: &ChangeEvent) -> bool {
        self.tx.send_if_modified(|current| liveness.is_live() && apply_event(current, event))
    }

    /// Replaces the contents only while `liveness` holds.
    pub fn replace_all_if_live(&self, liveness: &Liveness, bookmarks: Vec<Bookmark>) -> bool {
        self.tx.send_if_modified(|current| {
            if !liveness.is_live() {
                return false;
            }
            *current = bookmarks;
            true
        })
    }

    /// Revokes `liveness` under the store lock.
    ///
    /// After this returns, no `*_if_live` call holding the same token can mutate the store.
    pub fn retire(&self, liveness: &Liveness) {
        self.tx.send_if_modified(|_| {
            liveness.revoke();
            false
        });
    }
}

impl Default for BookmarkStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_event(current: &mut Vec<Bookmark>, event: &ChangeEvent) -> bool {
    match event {
        ChangeEvent::Insert(bookmark) => {
            current.insert(0, bookmark.clone());
            true
        }
        ChangeEvent::Delete(id) => remove_by_id(current, id),
    }
}

fn remove_by_id(current: &mut Vec<Bookmark>, id: &str) -> bool {
    let before = current.len();
    current.retain(|b| b.id != id);
    current.len() != before
}
