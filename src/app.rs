//! Dashboard for Markboard.
//!
//! The view controller behind the single bookmark page. It owns the bookmark
//! store, the view state machine, the creation form and the live subscription
//! of the current mount, and hosts the command handlers (add, delete, logout).
//!
//! Shared as `Arc<Dashboard>`; every method takes `&self`, so commands may run
//! concurrently with the change feed. No lock is held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::managers::bookmark_store::{BookmarkStore, Liveness};
use crate::managers::change_subscriber::ChangeSubscriber;
use crate::managers::fetch_loader::FetchLoader;
use crate::managers::session_guard::SessionGuard;
use crate::services::backend::Backend;
use crate::types::bookmark::{normalize_url, Bookmark, NewBookmark};
use crate::types::change::FeedFilter;
use crate::types::config::RealtimeConfig;
use crate::types::errors::DashboardError;
use crate::types::session::Identity;
use crate::types::view::{BookmarkForm, Route, ViewState};

/// Moves the user between views.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

impl<F> Navigator for F
where
    F: Fn(Route) + Send + Sync,
{
    fn navigate(&self, route: Route) {
        self(route)
    }
}

/// Result of submitting the creation form.
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// Nothing was sent: a field was empty or no session is held.
    Skipped,
    /// The backend accepted the insert. The row reaches the list via the change feed.
    Submitted(Bookmark),
}

/// Central view controller.
pub struct Dashboard {
    backend: RwLock<Arc<dyn Backend>>,
    navigator: Arc<dyn Navigator>,
    channel_name: String,
    store: BookmarkStore,
    view: watch::Sender<ViewState>,
    identity: RwLock<Option<Identity>>,
    form: Mutex<BookmarkForm>,
    mount: Mutex<Liveness>,
    subscriber: Mutex<Option<ChangeSubscriber>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Dashboard {
    pub fn new(backend: Arc<dyn Backend>, navigator: Arc<dyn Navigator>) -> Self {
        Self::with_realtime(backend, navigator, &RealtimeConfig::default())
    }

    pub fn with_realtime(
        backend: Arc<dyn Backend>,
        navigator: Arc<dyn Navigator>,
        realtime: &RealtimeConfig,
    ) -> Self {
        let (view, _rx) = watch::channel(ViewState::Unresolved);
        Self {
            backend: RwLock::new(backend),
            navigator,
            channel_name: realtime.channel_name.clone(),
            store: BookmarkStore::new(),
            view,
            identity: RwLock::new(None),
            form: Mutex::new(BookmarkForm::default()),
            mount: Mutex::new(Liveness::revoked()),
            subscriber: Mutex::new(None),
        }
    }

    /// The backend instance currently bound.
    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn current_liveness(&self) -> Liveness {
        lock(&self.mount).clone()
    }

    fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = identity;
    }

    fn set_view(&self, liveness: &Liveness, state: ViewState) {
        if liveness.is_live() {
            debug!(?state, "view state");
            self.view.send_replace(state);
        }
    }

    // ─── Lifecycle ───

    /// Mounts the view: resolve identity, load bookmarks, then attach the change feed.
    ///
    /// Any previous mount is torn down first. Returns the state reached; a mount that is
    /// torn down midway reports the state teardown left behind.
    pub async fn mount(&self) -> ViewState {
        self.teardown();

        let liveness = Liveness::new();
        *lock(&self.mount) = liveness.clone();
        self.store.clear();
        self.set_identity(None);
        self.set_view(&liveness, ViewState::Unresolved);

        let backend = self.backend();
        let Some(identity) = SessionGuard::new(backend.clone()).resolve().await else {
            if liveness.is_live() {
                self.set_view(&liveness, ViewState::Redirecting);
                info!("no session; redirecting to entry view");
                self.navigator.navigate(Route::Entry);
            }
            return self.view_state();
        };
        if !liveness.is_live() {
            return self.view_state();
        }

        self.set_identity(Some(identity.clone()));
        self.set_view(&liveness, ViewState::Loading);

        // Failure is logged by the loader; the view still becomes ready with an empty list.
        let _ = FetchLoader::new(backend.clone())
            .load(&identity, &self.store, &liveness)
            .await;
        if !liveness.is_live() {
            return self.view_state();
        }
        self.set_view(&liveness, ViewState::Ready);

        let filter = FeedFilter::bookmarks_for(self.channel_name.clone(), identity.id.clone());
        match ChangeSubscriber::attach(backend, filter, self.store.clone()).await {
            Ok(mut subscriber) => {
                let mut slot = lock(&self.subscriber);
                if !liveness.is_live() {
                    subscriber.close();
                } else {
                    if let Some(mut previous) = slot.take() {
                        previous.close();
                    }
                    *slot = Some(subscriber);
                }
            }
            Err(e) => {
                warn!(error = %e, "could not open change feed; list will not update live");
            }
        }

        self.view_state()
    }

    /// Tears the current mount down: stops state updates, closes the change feed
    /// and forgets the identity, leaving the view `Unresolved`.
    ///
    /// Safe to call repeatedly; a feed handle is released at most once.
    pub fn teardown(&self) {
        self.teardown_to(ViewState::Unresolved);
    }

    fn teardown_to(&self, state: ViewState) {
        let liveness = self.current_liveness();
        self.store.retire(&liveness);
        if let Some(mut subscriber) = lock(&self.subscriber).take() {
            subscriber.close();
        }
        self.set_identity(None);
        self.view.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(?state, "view state");
            *current = state;
            true
        });
    }

    /// Swaps in a different backend instance and mounts again.
    ///
    /// The open feed of the old instance is closed before the new one is opened.
    pub async fn rebind(&self, backend: Arc<dyn Backend>) -> ViewState {
        self.teardown();
        *self.backend.write().unwrap_or_else(PoisonError::into_inner) = backend;
        self.mount().await
    }

    // ─── Observation ───

    pub fn view_state(&self) -> ViewState {
        *self.view.borrow()
    }

    pub fn watch_view(&self) -> watch::Receiver<ViewState> {
        self.view.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.view_state().is_loading()
    }

    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.store.snapshot()
    }

    pub fn watch_bookmarks(&self) -> watch::Receiver<Vec<Bookmark>> {
        self.store.subscribe()
    }

    pub fn store(&self) -> &BookmarkStore {
        &self.store
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Id of the open change feed, if one is attached.
    pub fn subscription_id(&self) -> Option<String> {
        lock(&self.subscriber)
            .as_ref()
            .and_then(|s| s.handle_id().map(str::to_string))
    }

    // ─── Form ───

    pub fn form(&self) -> BookmarkForm {
        lock(&self.form).clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        lock(&self.form).title = title.into();
    }

    pub fn set_url(&self, url: impl Into<String>) {
        lock(&self.form).url = url.into();
    }

    // ─── Commands ───

    /// Submits the creation form.
    ///
    /// Skips silently when a field is empty or no session is held. Otherwise inserts
    /// the bookmark with a normalized URL and clears the form whether or not the
    /// insert succeeded. The store is not touched; the new row arrives via the feed.
    pub async fn add_bookmark(&self) -> Result<AddOutcome, DashboardError> {
        let liveness = self.current_liveness();
        let form = self.form();
        let Some(identity) = self.identity().filter(|_| liveness.is_live()) else {
            debug!("add ignored: no session");
            return Ok(AddOutcome::Skipped);
        };
        if !form.is_complete() {
            debug!("add ignored: title and url are required");
            return Ok(AddOutcome::Skipped);
        }

        let new_bookmark = NewBookmark {
            title: form.title.trim().to_string(),
            url: normalize_url(&form.url),
            user_id: identity.id,
        };
        let result = self.backend().insert_bookmark(new_bookmark).await;

        if liveness.is_live() {
            lock(&self.form).clear();
        }

        match result {
            Ok(bookmark) => {
                info!(id = %bookmark.id, "bookmark added");
                Ok(AddOutcome::Submitted(bookmark))
            }
            Err(e) => {
                warn!(error = %e, "failed to add bookmark");
                Err(e.into())
            }
        }
    }

    /// Requests deletion of a bookmark. The store is reconciled by the feed's delete event.
    pub async fn delete_bookmark(&self, id: &str) -> Result<(), DashboardError> {
        if self.identity().is_none() || !self.current_liveness().is_live() {
            return Err(DashboardError::NoSession);
        }
        self.backend().delete_bookmark(id).await.map_err(|e| {
            warn!(id, error = %e, "failed to delete bookmark");
            DashboardError::from(e)
        })?;
        debug!(id, "bookmark delete requested");
        Ok(())
    }

    /// Signs out, navigates to the entry view and tears the view down.
    ///
    /// Navigation happens even when sign-out fails; the failure is still returned.
    pub async fn logout(&self) -> Result<(), DashboardError> {
        if self.identity().is_none() {
            return Err(DashboardError::NoSession);
        }
        let result = self.backend().sign_out().await;
        if let Err(e) = &result {
            warn!(error = %e, "sign-out failed");
        }

        self.navigator.navigate(Route::Entry);
        self.teardown_to(ViewState::Redirecting);
        info!("signed out");

        result.map_err(DashboardError::from)
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.teardown();
    }
}
