//! Engine tuning knobs.
//!
//! Every limit the engine enforces lives here so deployments can override
//! them from a TOML file. Missing fields fall back to the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration errors from loading a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Runtime configuration for the document engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum operations accepted in one batch. Larger batches are
    /// rejected before any work happens.
    pub max_batch_ops: usize,
    /// How many log entries a history query returns when the caller
    /// does not say.
    pub history_default_limit: usize,
    /// How many times to retry log cleanup after a document delete.
    pub cleanup_retry_attempts: u32,
    /// Delay between log cleanup retries, in milliseconds.
    pub cleanup_retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_ops: 100,
            history_default_limit: 20,
            cleanup_retry_attempts: 3,
            cleanup_retry_backoff_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a config file, or fall back to defaults when the file does
    /// not exist. Parse errors in an existing file are still surfaced.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// The cleanup retry delay as a [`Duration`].
    pub fn cleanup_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.cleanup_retry_backoff_ms)
    }
}
