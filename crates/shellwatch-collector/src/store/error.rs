use std::path::PathBuf;

use thiserror::Error;

/// Store file errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store file could not be created or opened.
    ///
    /// Fatal. The collector has nowhere to put verified datagrams.
    #[error("failed to open store file {path}: {reason}")]
    Open {
        /// File the collector tried to create
        path: PathBuf,
        /// Underlying I/O error message
        reason: String,
    },

    /// Appending a record failed.
    ///
    /// Not fatal. The datagram is lost and the collector keeps receiving.
    #[error("failed to append to store file {path}: {reason}")]
    Write {
        /// Current store file
        path: PathBuf,
        /// Underlying I/O error message
        reason: String,
    },

    /// Record could not be framed (datagram longer than the length field)
    #[error("cannot frame store record: {0}")]
    Framing(String),
}

impl StoreError {
    /// Whether the collector must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}
