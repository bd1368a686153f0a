//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from secret handling and randomness
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Secret material has the wrong length
    #[error("invalid secret length: expected {expected}, got {actual}")]
    InvalidSecretLength {
        /// Required length in bytes
        expected: usize,
        /// Supplied length in bytes
        actual: usize,
    },

    /// Secret string is not valid hexadecimal
    #[error("invalid secret encoding: {0}")]
    InvalidEncoding(String),

    /// The OS random number generator failed
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
}

impl From<hex::FromHexError> for CryptoError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidEncoding(err.to_string())
    }
}
