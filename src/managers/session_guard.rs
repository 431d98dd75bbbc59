//! Session Guard for Markboard.
//!
//! Resolves the signed-in identity when the dashboard mounts. A failed
//! resolution is treated exactly like "nobody is signed in".

use std::sync::Arc;

use tracing::{debug, warn};

use crate::services::backend::Backend;
use crate::types::session::Identity;

/// Resolves and holds the identity for one dashboard mount.
pub struct SessionGuard {
    backend: Arc<dyn Backend>,
}

impl SessionGuard {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Returns the current identity, or `None` if there is none or resolution failed.
    pub async fn resolve(&self) -> Option<Identity> {
        match self.backend.resolve_identity().await {
            Ok(Some(identity)) => {
                debug!(user_id = %identity.id, "identity resolved");
                Some(identity)
            }
            Ok(None) => {
                debug!("no identity; visitor is not signed in");
                None
            }
            Err(e) => {
                warn!(error = %e, "identity resolution failed; treating as signed out");
                None
            }
        }
    }
}
