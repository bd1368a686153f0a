//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from encoding or decoding datagrams and store records
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Datagram is shorter than the smallest valid datagram.
    ///
    /// Rejected before any hashing or parsing.
    #[error("datagram too short: need at least {expected} bytes, got {actual}")]
    DatagramTooShort {
        /// Minimum valid size
        expected: usize,
        /// Received size
        actual: usize,
    },

    /// Datagram is longer than the largest valid datagram
    #[error("datagram too long: at most {max} bytes, got {actual}")]
    DatagramTooLong {
        /// Maximum valid size
        max: usize,
        /// Received size
        actual: usize,
    },

    /// Integrity tag does not match the ciphertext.
    ///
    /// The datagram was corrupted or tampered with. Callers drop it without
    /// decrypting.
    #[error("integrity tag mismatch")]
    IntegrityMismatch,

    /// Declared payload length runs past the end of the decrypted body
    #[error("truncated record: header declares {declared} payload bytes, {available} available")]
    Truncated {
        /// Payload length claimed by the header
        declared: usize,
        /// Payload bytes actually present (excluding the NUL terminator)
        available: usize,
    },

    /// Payload exceeds the 4096-byte chunk limit
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size
        size: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Direction byte is neither INPUT (0) nor OUTPUT (1)
    #[error("invalid direction byte: {0}")]
    InvalidDirection(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::Truncated { declared: 100, available: 3 };
        assert_eq!(
            err.to_string(),
            "truncated record: header declares 100 payload bytes, 3 available"
        );
    }
}
