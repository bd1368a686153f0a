//! Collector error types.

use std::fmt;

use crate::store::StoreError;

/// Errors that can occur in the collector.
#[derive(Debug)]
pub enum CollectorError {
    /// Configuration error (invalid bind address, zero ceiling, etc.).
    ///
    /// Fatal: prevents startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (bind failure, socket error).
    ///
    /// Bind failures are fatal. Receive errors on a bound socket are logged
    /// and the loop continues.
    Transport(String),

    /// Store error (opening or appending to a store file).
    ///
    /// See [`StoreError::is_fatal`]: failing to open a store file stops the
    /// collector, failing one append does not.
    Store(StoreError),
}

impl CollectorError {
    /// Returns true if the collector must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_) | Self::Transport(_) => true,
            Self::Store(err) => err.is_fatal(),
        }
    }
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Store(err) => write!(f, "store error: {err}"),
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CollectorError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<std::io::Error> for CollectorError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn collector_error_display() {
        let err = CollectorError::Config("max store bytes must be non-zero".to_string());
        assert_eq!(err.to_string(), "configuration error: max store bytes must be non-zero");

        let err = CollectorError::Transport("address in use".to_string());
        assert_eq!(err.to_string(), "transport error: address in use");
    }

    #[test]
    fn store_open_is_fatal_store_write_is_not() {
        let open = CollectorError::from(StoreError::Open {
            path: PathBuf::from("/nope/store.bin"),
            reason: "permission denied".to_string(),
        });
        assert!(open.is_fatal());

        let write = CollectorError::from(StoreError::Write {
            path: PathBuf::from("store.bin"),
            reason: "no space left on device".to_string(),
        });
        assert!(!write.is_fatal());
    }
}
