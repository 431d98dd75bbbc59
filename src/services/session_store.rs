//! Session Store for Markboard.
//!
//! Persists the auth session (tokens and user) as JSON so a restarted client
//! stays signed in. On Unix the file is only readable by its owner.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::platform;
use crate::types::errors::SessionError;
use crate::types::session::AuthSession;

/// Trait defining session persistence operations.
pub trait SessionStoreTrait {
    fn save_session(&self, session: &AuthSession) -> Result<(), SessionError>;
    fn restore_session(&self) -> Result<Option<AuthSession>, SessionError>;
    fn has_session(&self) -> bool;
    fn clear_session(&self) -> Result<(), SessionError>;
}

/// File-backed session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store at `path_override`, or `session.json` in the platform config dir.
    pub fn new(path_override: Option<String>) -> Self {
        let path = match path_override {
            Some(p) => PathBuf::from(p),
            None => platform::get_config_dir().join("session.json"),
        };
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStoreTrait for SessionStore {
    fn save_session(&self, session: &AuthSession) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SessionError::IoError(format!("Failed to create session directory: {}", e))
            })?;
        }

        let json = serde_json::to_vec(session)
            .map_err(|e| SessionError::SerializationError(e.to_string()))?;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .map_err(|e| SessionError::IoError(format!("Failed to open session file: {}", e)))?;

        // A file left by an older build may still carry wider permissions.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600)).map_err(|e| {
                SessionError::IoError(format!("Failed to restrict session file: {}", e))
            })?;
        }

        file.write_all(&json)
            .map_err(|e| SessionError::IoError(format!("Failed to write session file: {}", e)))?;

        Ok(())
    }

    /// Returns the saved session, or `None` when no session file exists.
    fn restore_session(&self) -> Result<Option<AuthSession>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)
            .map_err(|e| SessionError::IoError(format!("Failed to read session file: {}", e)))?;
        let session: AuthSession = serde_json::from_slice(&bytes)
            .map_err(|e| SessionError::SerializationError(e.to_string()))?;
        Ok(Some(session))
    }

    fn has_session(&self) -> bool {
        self.path.exists()
    }

    fn clear_session(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::IoError(format!(
                "Failed to remove session file: {}",
                e
            ))),
        }
    }
}
