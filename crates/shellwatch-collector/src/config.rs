//! Collector configuration.

use std::path::PathBuf;

use crate::error::CollectorError;

/// Default UDP bind address
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:40119";

/// Default store file prefix
pub const DEFAULT_STORE_PREFIX: &str = "shellwatch";

/// Default rotation ceiling (256 MiB)
pub const DEFAULT_MAX_STORE_BYTES: u64 = 256 * 1024 * 1024;

/// Where and how verified datagrams are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory that receives store files
    pub dir: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// Bytes written to one file before it is rotated
    pub max_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            prefix: DEFAULT_STORE_PREFIX.to_string(),
            max_bytes: DEFAULT_MAX_STORE_BYTES,
        }
    }
}

/// Collector runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Address to bind the UDP socket to (e.g. "0.0.0.0:40119")
    pub bind_address: String,
    /// Store settings
    pub store: StoreConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { bind_address: DEFAULT_BIND_ADDRESS.to_string(), store: StoreConfig::default() }
    }
}

impl CollectorConfig {
    /// Reject settings the collector cannot run with.
    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.store.max_bytes == 0 {
            return Err(CollectorError::Config("max store bytes must be non-zero".to_string()));
        }
        if self.store.prefix.is_empty() || self.store.prefix.contains('/') {
            return Err(CollectorError::Config(format!(
                "invalid store prefix '{}': must be non-empty and contain no '/'",
                self.store.prefix
            )));
        }
        Ok(())
    }
}
