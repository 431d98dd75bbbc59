use std::fmt;

// === BackendError ===

/// Errors returned by a backend capability.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The request could not be sent or the connection dropped.
    NetworkError(String),
    /// The backend answered with a non-success status.
    HttpError(u16, String),
    /// The response body could not be decoded.
    DecodeError(String),
    /// Local database operation failed.
    DatabaseError(String),
    /// The operation requires a signed-in user.
    NotAuthenticated,
    /// The live change feed could not be opened or failed.
    RealtimeError(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::NetworkError(msg) => write!(f, "Backend network error: {}", msg),
            BackendError::HttpError(status, body) => {
                write!(f, "Backend HTTP error {}: {}", status, body)
            }
            BackendError::DecodeError(msg) => write!(f, "Backend decode error: {}", msg),
            BackendError::DatabaseError(msg) => write!(f, "Backend database error: {}", msg),
            BackendError::NotAuthenticated => write!(f, "Not authenticated"),
            BackendError::RealtimeError(msg) => write!(f, "Realtime error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

// === DashboardError ===

/// Errors surfaced by dashboard commands.
#[derive(Debug)]
pub enum DashboardError {
    /// The command needs a resolved identity and none is held.
    NoSession,
    /// The backend rejected or failed the request.
    Backend(BackendError),
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashboardError::NoSession => write!(f, "No active session"),
            DashboardError::Backend(err) => write!(f, "Dashboard backend failure: {}", err),
        }
    }
}

impl std::error::Error for DashboardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DashboardError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for DashboardError {
    fn from(err: BackendError) -> Self {
        DashboardError::Backend(err)
    }
}

// === ConfigError ===

/// Errors related to configuration loading and saving.
#[derive(Debug)]
pub enum ConfigError {
    /// An I/O error occurred while reading or writing the config file.
    IoError(String),
    /// Failed to serialize or deserialize the config.
    SerializationError(String),
    /// A config value is invalid.
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "Config I/O error: {}", msg),
            ConfigError::SerializationError(msg) => {
                write!(f, "Config serialization error: {}", msg)
            }
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// === SessionError ===

/// Errors related to auth session persistence.
#[derive(Debug)]
pub enum SessionError {
    /// An I/O error occurred while reading or writing the session file.
    IoError(String),
    /// Failed to serialize or deserialize session data.
    SerializationError(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::IoError(msg) => write!(f, "Session I/O error: {}", msg),
            SessionError::SerializationError(msg) => {
                write!(f, "Session serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for SessionError {}
