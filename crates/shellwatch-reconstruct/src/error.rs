//! Reconstruction error types.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that stop reading a store file or writing an artifact.
///
/// Tag mismatches and undecodable records are not errors: they are skipped
/// and counted in [`crate::ReconstructStats`].
#[derive(Debug, Error)]
pub enum ReconstructError {
    /// Store file could not be opened
    #[error("failed to open store file {path}: {source}")]
    Open {
        /// Store file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Read failed for a reason other than end of file
    #[error("read error at offset {offset}: {source}")]
    Read {
        /// Byte offset of the record being read
        offset: u64,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Record prefix declares a length no datagram can have.
    ///
    /// The rest of the file cannot be framed, so reading stops.
    #[error("corrupt record length {length} at offset {offset}")]
    CorruptLength {
        /// Byte offset of the record prefix
        offset: u64,
        /// Declared datagram length
        length: usize,
    },

    /// File ended inside a record
    #[error("truncated record at offset {offset}: expected {expected} bytes, found {actual}")]
    Truncated {
        /// Byte offset of the incomplete part
        offset: u64,
        /// Bytes the record needed
        expected: usize,
        /// Bytes present before end of file
        actual: usize,
    },

    /// Session artifact could not be written
    #[error("failed to write session file {path}: {source}")]
    Output {
        /// Artifact path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}
