//! Change Subscriber for Markboard.
//!
//! Holds the one live change feed of a dashboard mount. Raw changes arrive on
//! a channel, are decoded into [`ChangeEvent`]s by a pump task and applied to
//! the bookmark store. Closing the subscriber retires its liveness token under
//! the store lock, stops the pump and hands the feed handle back to the
//! backend, in that order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::managers::bookmark_store::{BookmarkStore, Liveness};
use crate::services::backend::{Backend, FeedHandle};
use crate::types::bookmark::{id_from_value, Bookmark};
use crate::types::change::{ChangeEvent, FeedFilter, RawChange};
use crate::types::errors::BackendError;

/// Why a raw change could not be turned into an event.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Event(ChangeEvent),
    /// A well-formed change of a kind the store does not track (updates).
    Ignored,
    /// A malformed payload; the reason is logged and the change dropped.
    Malformed(String),
}

/// Decodes a raw feed payload into a typed event.
pub fn decode_change(raw: &RawChange) -> DecodeOutcome {
    match raw.kind.to_ascii_uppercase().as_str() {
        "INSERT" => {
            let Some(record) = raw.new_record.as_ref() else {
                return DecodeOutcome::Malformed("insert without a record".to_string());
            };
            match serde_json::from_value::<Bookmark>(record.clone()) {
                Ok(bookmark) => DecodeOutcome::Event(ChangeEvent::Insert(bookmark)),
                Err(e) => DecodeOutcome::Malformed(format!("undecodable insert record: {}", e)),
            }
        }
        "DELETE" => {
            let id = raw
                .old_record
                .as_ref()
                .and_then(|old| old.get("id"))
                .and_then(id_from_value);
            match id {
                Some(id) => DecodeOutcome::Event(ChangeEvent::Delete(id)),
                None => DecodeOutcome::Malformed("delete without a prior-state id".to_string()),
            }
        }
        "UPDATE" => DecodeOutcome::Ignored,
        other => DecodeOutcome::Malformed(format!("unknown change type: {}", other)),
    }
}

/// The live subscription of one dashboard mount.
pub struct ChangeSubscriber {
    backend: Arc<dyn Backend>,
    store: BookmarkStore,
    liveness: Liveness,
    handle: Option<FeedHandle>,
    pump: Option<JoinHandle<()>>,
}

impl ChangeSubscriber {
    /// Opens a change feed for `filter` and starts applying its events to `store`.
    pub async fn attach(
        backend: Arc<dyn Backend>,
        filter: FeedFilter,
        store: BookmarkStore,
    ) -> Result<Self, BackendError> {
        let feed = backend.open_change_feed(filter.clone()).await?;
        info!(
            channel = %filter.channel,
            user_id = %filter.owner_id,
            handle = feed.handle.id(),
            "change feed opened"
        );

        let liveness = Liveness::new();
        let pump = tokio::spawn(pump_events(feed.events, store.clone(), liveness.clone()));

        Ok(Self {
            backend,
            store,
            liveness,
            handle: Some(feed.handle),
            pump: Some(pump),
        })
    }

    /// Id of the open feed handle, if still open.
    pub fn handle_id(&self) -> Option<&str> {
        self.handle.as_ref().map(FeedHandle::id)
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Closes the feed. Idempotent; the handle is released at most once.
    pub fn close(&mut self) {
        self.store.retire(&self.liveness);
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(handle) = self.handle.take() {
            debug!(handle = handle.id(), "closing change feed");
            self.backend.close_change_feed(handle);
        }
    }
}

impl Drop for ChangeSubscriber {
    fn drop(&mut self) {
        self.close();
    }
}

async fn pump_events(
    mut events: mpsc::UnboundedReceiver<RawChange>,
    store: BookmarkStore,
    liveness: Liveness,
) {
    while let Some(raw) = events.recv().await {
        if !liveness.is_live() {
            break;
        }
        match decode_change(&raw) {
            DecodeOutcome::Event(event) => {
                store.apply_if_live(&liveness, &event);
            }
            DecodeOutcome::Ignored => {}
            DecodeOutcome::Malformed(reason) => {
                warn!(reason = %reason, "dropping malformed change event");
            }
        }
    }
    if liveness.is_live() {
        warn!("change feed ended; live updates stopped");
    }
}
