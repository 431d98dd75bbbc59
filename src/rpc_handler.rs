//! RPC method handler for the Markboard JSON-RPC protocol.
//!
//! Kept apart from `rpc_server.rs` so it can be tested without stdin/stdout.
//! `handle_method` dispatches a call to the [`Dashboard`] and its backend.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::app::{AddOutcome, Dashboard};
use crate::services::backend::Backend;
use crate::types::config::ClientConfig;
use crate::types::errors::BackendError;

/// Builds the backend selected by `config`.
pub fn build_backend(config: &ClientConfig) -> Result<Arc<dyn Backend>, BackendError> {
    match &config.backend {
        #[cfg(feature = "local")]
        crate::types::config::BackendConfig::Local { db_path } => {
            let path = db_path
                .clone()
                .map(std::path::PathBuf::from)
                .unwrap_or_else(crate::platform::default_db_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    BackendError::DatabaseError(format!("Failed to create data directory: {}", e))
                })?;
            }
            let backend = crate::services::local_backend::LocalBackend::open(&path)?;
            tracing::info!(path = %path.display(), "using local backend");
            Ok(Arc::new(backend))
        }
        #[cfg(feature = "supabase")]
        crate::types::config::BackendConfig::Supabase { url, anon_key } => {
            let sessions = crate::services::session_store::SessionStore::new(config.session_path.clone());
            let backend = crate::services::supabase::SupabaseBackend::new(
                url,
                anon_key,
                &config.http,
                &config.realtime,
                Some(sessions),
            )?;
            tracing::info!(url = %backend.base_url(), "using supabase backend");
            Ok(Arc::new(backend))
        }
        #[allow(unreachable_patterns)]
        _ => Err(BackendError::NetworkError(
            "requested backend is not compiled into this build".to_string(),
        )),
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Dispatch a JSON-RPC method call to the dashboard.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(
    dashboard: &Dashboard,
    method: &str,
    params: &Value,
) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true})),

        // ─── Auth ───
        "auth.sign_in" => {
            let email = str_param(params, "email").ok_or("missing email")?;
            let password = str_param(params, "password").ok_or("missing password")?;
            let identity = dashboard
                .backend()
                .sign_in_with_password(email, password)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"id": identity.id, "email": identity.email}))
        }
        "auth.logout" => {
            dashboard.logout().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        // ─── Dashboard ───
        "dashboard.mount" => {
            let state = dashboard.mount().await;
            Ok(json!({"state": state}))
        }
        "dashboard.state" => {
            let identity = dashboard.identity();
            Ok(json!({
                "state": dashboard.view_state(),
                "loading": dashboard.is_loading(),
                "user": identity.map(|i| json!({"id": i.id, "email": i.email})),
                "subscription": dashboard.subscription_id(),
                "form": dashboard.form(),
            }))
        }

        // ─── Form ───
        "form.set_title" => {
            let value = str_param(params, "value").ok_or("missing value")?;
            dashboard.set_title(value);
            Ok(json!({"ok": true}))
        }
        "form.set_url" => {
            let value = str_param(params, "value").ok_or("missing value")?;
            dashboard.set_url(value);
            Ok(json!({"ok": true}))
        }

        // ─── Bookmarks ───
        "bookmark.list" => serde_json::to_value(dashboard.bookmarks()).map_err(|e| e.to_string()),
        "bookmark.add" => {
            if let Some(title) = str_param(params, "title") {
                dashboard.set_title(title);
            }
            if let Some(url) = str_param(params, "url") {
                dashboard.set_url(url);
            }
            match dashboard.add_bookmark().await.map_err(|e| e.to_string())? {
                AddOutcome::Skipped => Ok(json!({"submitted": false})),
                AddOutcome::Submitted(bookmark) => {
                    Ok(json!({"submitted": true, "bookmark": bookmark}))
                }
            }
        }
        "bookmark.delete" => {
            let id = str_param(params, "id").ok_or("missing id")?;
            dashboard
                .delete_bookmark(id)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
