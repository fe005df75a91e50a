//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tabletcopy_transport::{RetryConfig, MAX_PAYLOAD_SIZE};

/// Largest chunk size a client may request. A chunk travels in a single
/// frame together with its response envelope.
pub const MAX_CHUNK_SIZE_BYTES: u64 = MAX_PAYLOAD_SIZE as u64 - 64 * 1024;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or type error.
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or type error.
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is neither `.toml` nor `.json`.
    #[error("unsupported config file extension: {0:?}")]
    UnsupportedExtension(String),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Retry policy for a single chunk request.
///
/// Only transient transport failures are retried; verification and local
/// I/O failures always end the fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkRetryPolicy {
    /// Retries after the first attempt (default: 0).
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound on a single backoff.
    pub max_backoff_ms: u64,
}

impl Default for ChunkRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl ChunkRetryPolicy {
    /// Transport retry configuration implementing this policy.
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Configuration of the remote bootstrap client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyClientConfig {
    /// Largest chunk requested; the remote's limit applies if lower.
    pub max_chunk_size_bytes: u64,
    /// Timeout of a single call.
    pub rpc_timeout_ms: u64,
    /// Timeout for connecting to the remote.
    pub connect_timeout_ms: u64,
    /// Retry policy for chunk requests.
    pub chunk_retry: ChunkRetryPolicy,
    /// fsync every downloaded file when it is closed.
    pub force_fsync: bool,
}

impl Default for CopyClientConfig {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: 1024 * 1024,
            rpc_timeout_ms: 30_000,
            connect_timeout_ms: 5_000,
            chunk_retry: ChunkRetryPolicy::default(),
            force_fsync: true,
        }
    }
}

impl CopyClientConfig {
    /// Loads a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: CopyClientConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => return Err(ConfigError::UnsupportedExtension(ext.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunk_size_bytes == 0 {
            return Err(ConfigError::Invalid("max_chunk_size_bytes must be > 0".to_string()));
        }
        if self.max_chunk_size_bytes > MAX_CHUNK_SIZE_BYTES {
            return Err(ConfigError::Invalid(format!(
                "max_chunk_size_bytes must be <= {}",
                MAX_CHUNK_SIZE_BYTES
            )));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(ConfigError::Invalid("rpc_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    /// Chunk size to request given the remote's advertised limit (0 = none).
    pub fn effective_chunk_size(&self, remote_max: u64) -> u64 {
        if remote_max == 0 {
            self.max_chunk_size_bytes
        } else {
            self.max_chunk_size_bytes.min(remote_max)
        }
    }
}
