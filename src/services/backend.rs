//! Backend capability for Markboard.
//!
//! Persistence, authentication and change notification are all delegated to a
//! backend. The dashboard only ever talks to it through [`Backend`], which is
//! created once per process and passed in explicitly as `Arc<dyn Backend>`.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::bookmark::{Bookmark, NewBookmark};
use crate::types::change::{FeedFilter, RawChange};
use crate::types::errors::BackendError;
use crate::types::session::Identity;

/// Identifies one open change feed.
///
/// Deliberately not `Clone`: a handle is given back to the backend exactly once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FeedHandle {
    id: String,
}

impl FeedHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// A handle with a fresh random id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// An open change feed: the handle to close it plus the stream of raw changes.
#[derive(Debug)]
pub struct ChangeFeed {
    pub handle: FeedHandle,
    pub events: mpsc::UnboundedReceiver<RawChange>,
}

/// Trait defining the operations Markboard needs from a backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Resolves the currently signed-in user, if any.
    async fn resolve_identity(&self) -> Result<Option<Identity>, BackendError>;

    /// Signs in with email and password, establishing a session.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, BackendError>;

    /// Lists the bookmarks owned by `owner`, newest first.
    async fn query_bookmarks(&self, owner: &Identity) -> Result<Vec<Bookmark>, BackendError>;

    /// Inserts a bookmark; the backend assigns its id and creation time.
    async fn insert_bookmark(&self, bookmark: NewBookmark) -> Result<Bookmark, BackendError>;

    async fn delete_bookmark(&self, id: &str) -> Result<(), BackendError>;

    /// Opens a live change feed matching `filter`.
    async fn open_change_feed(&self, filter: FeedFilter) -> Result<ChangeFeed, BackendError>;

    /// Releases a change feed. Must not block; no further events are delivered for `handle`.
    fn close_change_feed(&self, handle: FeedHandle);

    async fn sign_out(&self) -> Result<(), BackendError>;
}
