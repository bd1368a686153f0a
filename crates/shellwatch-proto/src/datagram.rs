//! Datagram codec: encrypt-then-tag on the way out, verify-then-decrypt on
//! the way in.
//!
//! Layout on the wire:
//! `[IV: 16][ciphertext: RecordHeader 17 + payload 0..4096 + NUL 1][tag: 20]`
//!
//! The tag is `SHA-1(ciphertext)`. It covers neither the IV nor the
//! plaintext, which is what lets the collector check it without the secret.

use bytes::{BufMut, Bytes, BytesMut};
use shellwatch_crypto::{
    IV_SIZE, Iv, Secret, TAG_SIZE, apply_keystream, derive_packet_key, digest,
};

use crate::{
    errors::{ProtocolError, Result},
    header::RecordHeader,
    record::{MAX_PAYLOAD_SIZE, SessionRecord},
};

/// Size of the NUL terminator appended after the payload
const NUL_SIZE: usize = 1;

/// Smallest valid datagram: an empty payload (54 bytes)
pub const MIN_DATAGRAM_SIZE: usize = IV_SIZE + RecordHeader::SIZE + NUL_SIZE + TAG_SIZE;

/// Largest valid datagram: a full 4096-byte payload (4150 bytes)
pub const MAX_DATAGRAM_SIZE: usize = MIN_DATAGRAM_SIZE + MAX_PAYLOAD_SIZE;

/// Borrowed view over a size-checked datagram.
///
/// Construction only checks the length bounds, so the accessors can slice
/// without further checks. Nothing inside is trusted until [`Self::verify`]
/// succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram<'a> {
    bytes: &'a [u8],
}

impl<'a> Datagram<'a> {
    /// Wrap raw bytes after checking they could be a datagram.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::DatagramTooShort` below [`MIN_DATAGRAM_SIZE`]
    /// - `ProtocolError::DatagramTooLong` above [`MAX_DATAGRAM_SIZE`]
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < MIN_DATAGRAM_SIZE {
            return Err(ProtocolError::DatagramTooShort {
                expected: MIN_DATAGRAM_SIZE,
                actual: bytes.len(),
            });
        }

        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::DatagramTooLong {
                max: MAX_DATAGRAM_SIZE,
                actual: bytes.len(),
            });
        }

        Ok(Self { bytes })
    }

    /// The IV in front of the ciphertext.
    pub fn iv(&self) -> Iv {
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&self.bytes[..IV_SIZE]);
        Iv::new(iv)
    }

    /// Encrypted header, payload and NUL terminator.
    pub fn ciphertext(&self) -> &'a [u8] {
        &self.bytes[IV_SIZE..self.bytes.len() - TAG_SIZE]
    }

    /// Trailing integrity tag.
    pub fn tag(&self) -> &'a [u8] {
        &self.bytes[self.bytes.len() - TAG_SIZE..]
    }

    /// Whole datagram.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Total length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: a parsed datagram is at least [`MIN_DATAGRAM_SIZE`]
    /// bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Recompute the tag over the ciphertext and compare.
    ///
    /// Needs no secret. One hash over at most 4 KiB, so a receiver can drop
    /// corrupt traffic before touching the cipher.
    pub fn verify(&self) -> Result<()> {
        if digest(self.ciphertext()).as_slice() == self.tag() {
            Ok(())
        } else {
            Err(ProtocolError::IntegrityMismatch)
        }
    }

    /// Verify, then decrypt and parse the record.
    ///
    /// # Security
    ///
    /// - Verify First: the cipher never runs on bytes whose tag failed.
    /// - Bounded Copy: the declared payload length is checked against the
    ///   decrypted body before a single payload byte is copied.
    pub fn open(&self, secret: &Secret) -> Result<SessionRecord> {
        self.verify()?;

        let key = derive_packet_key(secret, &self.iv());
        let mut body = self.ciphertext().to_vec();
        apply_keystream(&key, &mut body);

        let header = RecordHeader::from_bytes(&body)?;
        let declared = header.payload_len() as usize;

        // INVARIANT: body.len() >= RecordHeader::SIZE + NUL_SIZE because
        // parse() enforced MIN_DATAGRAM_SIZE.
        let available = body.len() - RecordHeader::SIZE - NUL_SIZE;
        if declared > available {
            return Err(ProtocolError::Truncated { declared, available });
        }

        let payload_start = RecordHeader::SIZE;
        let payload = Bytes::copy_from_slice(&body[payload_start..payload_start + declared]);

        Ok(SessionRecord {
            timestamp: header.timestamp(),
            user_id: header.user_id(),
            process_id: header.process_id(),
            direction: header.direction()?,
            payload,
        })
    }
}

/// Encrypt and tag a record.
///
/// The caller supplies the IV and MUST NOT reuse it with the same secret.
/// Production callers use [`Iv::generate`].
///
/// # Errors
///
/// - `ProtocolError::PayloadTooLarge` if the payload exceeds 4096 bytes
pub fn encode(secret: &Secret, record: &SessionRecord, iv: Iv) -> Result<Bytes> {
    if record.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size: record.payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let body_len = RecordHeader::SIZE + record.payload.len() + NUL_SIZE;
    let mut buf = BytesMut::with_capacity(IV_SIZE + body_len + TAG_SIZE);

    buf.put_slice(iv.as_bytes());
    buf.put_slice(&record.header().to_bytes());
    buf.put_slice(&record.payload);
    buf.put_u8(0);

    let key = derive_packet_key(secret, &iv);
    apply_keystream(&key, &mut buf[IV_SIZE..]);

    let tag = digest(&buf[IV_SIZE..]);
    buf.put_slice(&tag);

    debug_assert_eq!(buf.len(), MIN_DATAGRAM_SIZE + record.payload.len());

    Ok(buf.freeze())
}

/// Check size bounds and the integrity tag without decrypting.
pub fn verify(datagram: &[u8]) -> Result<()> {
    Datagram::parse(datagram)?.verify()
}

/// Verify, decrypt and parse a datagram.
pub fn decode(secret: &Secret, datagram: &[u8]) -> Result<SessionRecord> {
    Datagram::parse(datagram)?.open(secret)
}
