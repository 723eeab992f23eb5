//! Configuration settings for BlobSync
//!
//! Tuning values are threaded explicitly into each executor so that
//! differently-tuned executors can coexist in one process.

use crate::error::{BlobSyncError, Result};
use serde::{Deserialize, Serialize};

/// Default chunk size for chunked reads (8 MB)
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Default capacity of the eager prefetch buffer
pub const DEFAULT_EAGER_BUFFER: usize = 1024;

/// Environment variable overriding the concurrency limit
pub const ENV_CONCURRENCY: &str = "BLOBSYNC_CONCURRENCY";

/// Environment variable overriding the chunk size (accepts `8M`, `512K`, ...)
pub const ENV_CHUNK_SIZE: &str = "BLOBSYNC_CHUNK_SIZE";

/// Environment variable overriding the eager prefetch buffer
pub const ENV_EAGER_BUFFER: &str = "BLOBSYNC_EAGER_BUFFER";

/// Executor tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    /// Maximum number of in-flight tasks
    pub concurrency: usize,
    /// Chunk size for chunked reads, in bytes
    pub chunk_size: usize,
    /// Items buffered ahead of the consumer by eager streams
    pub eager_buffer: usize,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            // I/O bound work: oversubscribe the CPUs
            concurrency: num_cpus::get() * 4,
            chunk_size: DEFAULT_CHUNK_SIZE,
            eager_buffer: DEFAULT_EAGER_BUFFER,
        }
    }
}

impl BoostConfig {
    /// Create a config with the given concurrency and default everything else
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var(ENV_CONCURRENCY) {
            config.concurrency = value.trim().parse().map_err(|_| {
                BlobSyncError::config(format!("Invalid {}: {}", ENV_CONCURRENCY, value))
            })?;
        }
        if let Ok(value) = std::env::var(ENV_CHUNK_SIZE) {
            config.chunk_size = parse_size(&value)
                .map_err(|e| BlobSyncError::config(format!("Invalid {}: {}", ENV_CHUNK_SIZE, e)))?
                as usize;
        }
        if let Ok(value) = std::env::var(ENV_EAGER_BUFFER) {
            config.eager_buffer = value.trim().parse().map_err(|_| {
                BlobSyncError::config(format!("Invalid {}: {}", ENV_EAGER_BUFFER, value))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(BlobSyncError::InvalidConcurrency(0));
        }
        if self.chunk_size == 0 {
            return Err(BlobSyncError::config("Chunk size must be positive"));
        }
        if self.eager_buffer == 0 {
            return Err(BlobSyncError::config("Eager buffer must be positive"));
        }
        Ok(())
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(|c| c == 'G' || c == 'B'), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(|c| c == 'M' || c == 'B'), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(|c| c == 'K' || c == 'B'), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}
