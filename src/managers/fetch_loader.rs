//! Fetch Loader for Markboard.
//!
//! Performs the initial full load of a session's bookmarks into the store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::managers::bookmark_store::{BookmarkStore, Liveness};
use crate::services::backend::Backend;
use crate::types::errors::BackendError;
use crate::types::session::Identity;

pub struct FetchLoader {
    backend: Arc<dyn Backend>,
}

impl FetchLoader {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Loads all bookmarks of `identity`, newest first, and replaces the store contents.
    ///
    /// On failure the store is left untouched and the error is logged and returned.
    /// A result arriving after `liveness` was revoked is discarded.
    pub async fn load(
        &self,
        identity: &Identity,
        store: &BookmarkStore,
        liveness: &Liveness,
    ) -> Result<usize, BackendError> {
        let bookmarks = match self.backend.query_bookmarks(identity).await {
            Ok(bookmarks) => bookmarks,
            Err(e) => {
                warn!(user_id = %identity.id, error = %e, "initial bookmark fetch failed");
                return Err(e);
            }
        };

        let count = bookmarks.len();
        if store.replace_all_if_live(liveness, bookmarks) {
            info!(user_id = %identity.id, count, "bookmarks loaded");
        } else {
            debug!(user_id = %identity.id, "discarding fetch result for a torn-down view");
        }
        Ok(count)
    }
}
