// Markboard Config Engine
// Loads client configuration from a JSON file at the platform config path,
// applies environment overrides, and saves changes back.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::platform;
use crate::types::config::{BackendConfig, ClientConfig};
use crate::types::errors::ConfigError;

pub const ENV_SUPABASE_URL: &str = "MARKBOARD_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "MARKBOARD_SUPABASE_ANON_KEY";
pub const ENV_DB_PATH: &str = "MARKBOARD_DB_PATH";
pub const ENV_LOG: &str = "MARKBOARD_LOG";

/// Trait defining the config engine interface.
pub trait ConfigEngineTrait {
    fn load(&mut self) -> Result<ClientConfig, ConfigError>;
    fn save(&self) -> Result<(), ConfigError>;
    fn get_config(&self) -> &ClientConfig;
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), ConfigError>;
    fn reset(&mut self) -> Result<(), ConfigError>;
    fn get_config_path(&self) -> &str;
}

/// Config engine that persists the client config as JSON on disk.
pub struct ConfigEngine {
    config_path: String,
    config: ClientConfig,
}

impl ConfigEngine {
    /// Creates a new ConfigEngine.
    ///
    /// If `path_override` is `Some`, uses that path for the config file.
    /// Otherwise, uses `config.json` in the platform-specific config directory.
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = path_override.unwrap_or_else(|| {
            platform::get_config_dir()
                .join("config.json")
                .to_string_lossy()
                .to_string()
        });

        Self {
            config_path,
            config: ClientConfig::default(),
        }
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up through `lookup`.
    ///
    /// A Supabase URL and anon key must be given together; either alone is an error.
    /// A database path switches to (or adjusts) the local backend and loses to Supabase.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match (get(ENV_SUPABASE_URL), get(ENV_SUPABASE_ANON_KEY)) {
            (Some(url), Some(anon_key)) => {
                debug!(url = %url, "using supabase backend from environment");
                self.config.backend = BackendConfig::Supabase { url, anon_key };
            }
            (None, None) => {
                if let Some(db_path) = get(ENV_DB_PATH) {
                    self.config.backend = BackendConfig::Local {
                        db_path: Some(db_path),
                    };
                }
            }
            _ => {
                return Err(ConfigError::InvalidValue(format!(
                    "{} and {} must be set together",
                    ENV_SUPABASE_URL, ENV_SUPABASE_ANON_KEY
                )));
            }
        }

        if let Some(filter) = get(ENV_LOG) {
            self.config.log_filter = filter;
        }
        Ok(())
    }
}

impl ConfigEngineTrait for ConfigEngine {
    /// Loads the config file. A missing file yields defaults; a malformed one is an error.
    fn load(&mut self) -> Result<ClientConfig, ConfigError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            self.config = ClientConfig::default();
            return Ok(self.config.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("Failed to read config file: {}", e)))?;

        self.config = serde_json::from_str(&content).map_err(|e| {
            ConfigError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;
        Ok(self.config.clone())
    }

    /// Saves the current config, creating parent directories if needed.
    fn save(&self) -> Result<(), ConfigError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConfigError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.config).map_err(|e| {
            ConfigError::SerializationError(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| ConfigError::IoError(format!("Failed to write config file: {}", e)))
    }

    fn get_config(&self) -> &ClientConfig {
        &self.config
    }

    /// Updates one value by dot-notation path (e.g. `realtime.heartbeat_secs`) and saves.
    ///
    /// The whole config is re-validated by deserializing it after the change.
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), ConfigError> {
        let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        let Some((last, parents)) = parts.split_last() else {
            return Err(ConfigError::InvalidValue("Key cannot be empty".to_string()));
        };

        let mut json_value = serde_json::to_value(&self.config).map_err(|e| {
            ConfigError::SerializationError(format!("Failed to serialize config: {}", e))
        })?;

        let mut current = &mut json_value;
        for part in parents {
            current = current.get_mut(*part).ok_or_else(|| {
                ConfigError::InvalidValue(format!("Key '{}' not found in config", key))
            })?;
        }
        match current {
            serde_json::Value::Object(map) if map.contains_key(*last) => {
                map.insert(last.to_string(), value);
            }
            _ => {
                return Err(ConfigError::InvalidValue(format!(
                    "Key '{}' not found in config",
                    key
                )));
            }
        }

        self.config = serde_json::from_value(json_value).map_err(|e| {
            ConfigError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;

        self.save()
    }

    /// Resets to defaults and saves.
    fn reset(&mut self) -> Result<(), ConfigError> {
        self.config = ClientConfig::default();
        self.save()
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
