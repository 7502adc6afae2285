//! File-based configuration.
//!
//! ```yaml
//! global_limit: 100
//! global_window_seconds: 60
//! key_prefix: api
//! window_mode: per_client
//! precedence: global_first
//! redis:
//!   url: redis://127.0.0.1:6379/
//!   connection_count: 4
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    DispatcherError, DispatcherOptions, GlobalWindowMode, KeyPrefix, Limit, Precedence,
    WindowSizeSeconds,
};

/// Dispatcher settings as read from a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Requests a client may issue across all routes per global window.
    pub global_limit: i64,

    /// Length of the global window in seconds.
    #[serde(default = "default_global_window_seconds")]
    pub global_window_seconds: u64,

    /// Prefix of every counter key.
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// Whether global windows are tracked per client or shared.
    #[serde(default)]
    pub window_mode: GlobalWindowMode,

    /// Which scope a rejection reports when both are exhausted.
    #[serde(default)]
    pub precedence: Precedence,

    /// Redis connection settings, when the Redis store is used.
    #[serde(default)]
    pub redis: Option<RedisStoreConfig>,
}

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/`.
    pub url: String,

    /// Number of managed connections used round-robin.
    #[serde(default = "default_connection_count")]
    pub connection_count: usize,
}

fn default_global_window_seconds() -> u64 {
    60
}

fn default_connection_count() -> usize {
    1
}

impl DispatcherConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DispatcherError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DispatcherError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self, DispatcherError> {
        serde_yaml::from_str(contents).map_err(|e| DispatcherError::Configuration(e.to_string()))
    }

    /// Validate into [`DispatcherOptions`].
    pub fn to_options(&self) -> Result<DispatcherOptions, DispatcherError> {
        Ok(DispatcherOptions {
            global_window: WindowSizeSeconds::try_from(self.global_window_seconds)?,
            global_limit: Limit::try_from(self.global_limit)?,
            prefix: self
                .key_prefix
                .clone()
                .map(KeyPrefix::try_from)
                .transpose()?,
            window_mode: self.window_mode,
            precedence: self.precedence,
        })
    }
}
