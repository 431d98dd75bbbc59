use serde::{Deserialize, Serialize};

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Where the auth session is persisted. Defaults to `session.json` in the config dir.
    #[serde(default)]
    pub session_path: Option<String>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            realtime: RealtimeConfig::default(),
            http: HttpConfig::default(),
            session_path: None,
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Which backend the client talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Hosted Supabase project.
    Supabase { url: String, anon_key: String },
    /// Offline SQLite database. Defaults to `markboard.db` in the data dir.
    Local {
        #[serde(default)]
        db_path: Option<String>,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local { db_path: None }
    }
}

/// Live change feed settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RealtimeConfig {
    pub channel_name: String,
    pub heartbeat_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_name: "bookmarks-changes".to_string(),
            heartbeat_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 15 }
    }
}
