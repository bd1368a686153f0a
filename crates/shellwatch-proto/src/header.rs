//! Record header with zero-copy parsing.
//!
//! The `RecordHeader` is a fixed 17-byte structure serialized as raw binary
//! (Big Endian). It is the first thing inside the encrypted body of every
//! datagram, followed by the payload and a single NUL byte.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    errors::{ProtocolError, Result},
    record::{Direction, MAX_PAYLOAD_SIZE},
};

/// Fixed 17-byte record header (Big Endian network byte order)
///
/// Fields are stored as raw byte arrays so the struct has alignment 1 and can
/// be cast from any decrypted buffer.
///
/// # Security
///
/// The #[repr(C, packed)] layout with zerocopy traits ensures every 17-byte
/// pattern is a valid `RecordHeader`, so casting decrypted bytes cannot cause
/// undefined behavior. The header is only trusted after the datagram's
/// integrity tag has been checked, and [`Self::from_bytes`] still bounds the
/// declared payload length before anyone copies payload bytes.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RecordHeader {
    timestamp: [u8; 4],  // u32 seconds since Unix epoch
    user_id: [u8; 4],    // u32 uid of the captured shell
    process_id: [u8; 4], // u32 pid of the captured shell
    direction: u8,       // 0 = INPUT, 1 = OUTPUT
    payload_len: [u8; 4], // u32 payload length
}

impl RecordHeader {
    /// Size of the serialized header (17 bytes)
    pub const SIZE: usize = 17;

    /// Create a header from field values.
    pub fn new(
        timestamp: u32,
        user_id: u32,
        process_id: u32,
        direction: Direction,
        payload_len: u32,
    ) -> Self {
        Self {
            timestamp: timestamp.to_be_bytes(),
            user_id: user_id.to_be_bytes(),
            process_id: process_id.to_be_bytes(),
            direction: direction.to_byte(),
            payload_len: payload_len.to_be_bytes(),
        }
    }

    /// Parse header from decrypted bytes (zero-copy, safe)
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Truncated` if fewer than 17 bytes are available
    /// - `ProtocolError::InvalidDirection` if the direction byte is unknown
    /// - `ProtocolError::PayloadTooLarge` if the declared length exceeds
    ///   [`MAX_PAYLOAD_SIZE`]
    ///
    /// Validation runs cheapest-first. Whether the declared payload actually
    /// fits in the remaining bytes is the caller's check, since only the
    /// caller knows the body length.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::Truncated { declared: Self::SIZE, available: bytes.len() })?
            .0;

        Direction::from_byte(header.direction)?;

        let payload_len = header.payload_len() as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge { size: payload_len, max: MAX_PAYLOAD_SIZE });
        }

        Ok(header)
    }

    /// Serialize header to bytes (zero-copy)
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Capture time, seconds since the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes(self.timestamp)
    }

    /// User id of the captured shell.
    #[must_use]
    pub fn user_id(&self) -> u32 {
        u32::from_be_bytes(self.user_id)
    }

    /// Process id of the captured shell.
    #[must_use]
    pub fn process_id(&self) -> u32 {
        u32::from_be_bytes(self.process_id)
    }

    /// Direction of the chunk. Always valid on a header returned by
    /// [`Self::from_bytes`].
    pub fn direction(&self) -> Result<Direction> {
        Direction::from_byte(self.direction)
    }

    /// Declared payload length in bytes.
    #[must_use]
    pub fn payload_len(&self) -> u32 {
        u32::from_be_bytes(self.payload_len)
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for RecordHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordHeader")
            .field("timestamp", &self.timestamp())
            .field("user_id", &self.user_id())
            .field("process_id", &self.process_id())
            .field("direction", &self.direction)
            .field("payload_len", &self.payload_len())
            .finish()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for RecordHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for RecordHeader {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    impl Arbitrary for RecordHeader {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (
                any::<u32>(),                            // timestamp
                any::<u32>(),                            // user_id
                any::<u32>(),                            // process_id
                prop_oneof![Just(Direction::Input), Just(Direction::Output)],
                0u32..=MAX_PAYLOAD_SIZE as u32,          // payload_len
            )
                .prop_map(|(timestamp, user_id, process_id, direction, payload_len)| {
                    Self::new(timestamp, user_id, process_id, direction, payload_len)
                })
                .boxed()
        }
    }

    #[test]
    fn header_size() {
        assert_eq!(std::mem::size_of::<RecordHeader>(), RecordHeader::SIZE);
        assert_eq!(RecordHeader::SIZE, 17);
    }

    proptest! {
        #[test]
        fn header_round_trip(header in any::<RecordHeader>()) {
            let bytes = header.to_bytes();
            let parsed = RecordHeader::from_bytes(&bytes).expect("should parse");
            prop_assert_eq!(&header, parsed);
        }
    }

    #[test]
    fn fields_are_big_endian() {
        let header = RecordHeader::new(0x0102_0304, 1000, 4242, Direction::Output, 5);
        let bytes = header.to_bytes();

        assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..8], &1000u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &4242u32.to_be_bytes());
        assert_eq!(bytes[12], 1);
        assert_eq!(&bytes[13..17], &5u32.to_be_bytes());
    }

    #[test]
    fn reject_short_buffer() {
        let result = RecordHeader::from_bytes(&[0u8; 10]);
        assert_eq!(result, Err(ProtocolError::Truncated { declared: 17, available: 10 }));
    }

    #[test]
    fn reject_invalid_direction() {
        let mut buf = [0u8; 17];
        buf[12] = 7;

        let result = RecordHeader::from_bytes(&buf);
        assert_eq!(result, Err(ProtocolError::InvalidDirection(7)));
    }

    #[test]
    fn reject_oversized_payload() {
        let mut buf = [0u8; 17];
        buf[13..17].copy_from_slice(&(MAX_PAYLOAD_SIZE as u32 + 1).to_be_bytes());

        let result = RecordHeader::from_bytes(&buf);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }
}
