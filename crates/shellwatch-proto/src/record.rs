//! Session records: one captured terminal chunk in plaintext.

use bytes::Bytes;

use crate::{
    errors::{ProtocolError, Result},
    header::RecordHeader,
};

/// Maximum payload carried by one record (one terminal read)
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// Which way a chunk travelled through the captured session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Typed on the controlling terminal, headed for the shell
    Input,
    /// Written by the shell, headed for the terminal
    Output,
}

impl Direction {
    /// Wire byte for this direction.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
        }
    }

    /// Parse a wire byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Input),
            1 => Ok(Self::Output),
            other => Err(ProtocolError::InvalidDirection(other)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// The logical unit carried by one datagram.
///
/// # Invariants
///
/// - `payload.len() <= MAX_PAYLOAD_SIZE`, enforced by [`SessionRecord::new`]
///   and re-checked on decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Capture time, seconds since the Unix epoch
    pub timestamp: u32,
    /// User id of the captured shell
    pub user_id: u32,
    /// Process id of the captured shell
    pub process_id: u32,
    /// Chunk direction
    pub direction: Direction,
    /// Raw terminal bytes; may contain any byte value including NUL
    pub payload: Bytes,
}

impl SessionRecord {
    /// Create a record, rejecting payloads over [`MAX_PAYLOAD_SIZE`].
    pub fn new(
        timestamp: u32,
        user_id: u32,
        process_id: u32,
        direction: Direction,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self { timestamp, user_id, process_id, direction, payload })
    }

    /// Header describing this record.
    pub fn header(&self) -> RecordHeader {
        // INVARIANT: payload.len() <= MAX_PAYLOAD_SIZE (4096) fits in u32.
        RecordHeader::new(
            self.timestamp,
            self.user_id,
            self.process_id,
            self.direction,
            self.payload.len() as u32,
        )
    }

    /// True when the payload is a lone carriage return (the Enter key).
    pub fn is_carriage_return(&self) -> bool {
        self.payload.as_ref() == b"\r"
    }
}
