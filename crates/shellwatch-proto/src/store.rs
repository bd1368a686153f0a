//! Store record framing.
//!
//! The collector appends each verified datagram to a store file behind a
//! 6-byte prefix:
//!
//! `[source IPv4 address: 4][datagram length: u16 BE][datagram]`
//!
//! The address is kept in network order (the octets as written in dotted
//! notation).

use std::net::Ipv4Addr;

use bytes::BufMut;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    datagram::{Datagram, MAX_DATAGRAM_SIZE, MIN_DATAGRAM_SIZE},
    errors::{ProtocolError, Result},
};

/// Largest store record: prefix plus a maximum-size datagram
pub const MAX_STORE_RECORD_SIZE: usize = StorePrefix::SIZE + MAX_DATAGRAM_SIZE;

/// Fixed 6-byte prefix in front of every stored datagram
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct StorePrefix {
    address: [u8; 4], // IPv4 source address, network order
    length: [u8; 2],  // u16 datagram length
}

impl StorePrefix {
    /// Size of the serialized prefix (6 bytes)
    pub const SIZE: usize = 6;

    /// Prefix for a datagram of `length` bytes received from `address`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::DatagramTooLong` if `length` exceeds the largest
    ///   valid datagram (and therefore possibly the u16 field)
    pub fn new(address: Ipv4Addr, length: usize) -> Result<Self> {
        if length > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::DatagramTooLong { max: MAX_DATAGRAM_SIZE, actual: length });
        }

        Ok(Self { address: address.octets(), length: (length as u16).to_be_bytes() })
    }

    /// Parse a prefix (zero-copy). Length is not validated here; the reader
    /// decides how to treat a corrupt length.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        Ok(Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::Truncated { declared: Self::SIZE, available: bytes.len() })?
            .0)
    }

    /// Serialize prefix to bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(IntoBytes::as_bytes(self));
        arr
    }

    /// Sender address.
    #[must_use]
    pub fn address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.address)
    }

    /// Length of the datagram that follows.
    #[must_use]
    pub fn datagram_len(&self) -> usize {
        u16::from_be_bytes(self.length) as usize
    }

    /// Whether the declared length could belong to a valid datagram.
    #[must_use]
    pub fn has_valid_length(&self) -> bool {
        (MIN_DATAGRAM_SIZE..=MAX_DATAGRAM_SIZE).contains(&self.datagram_len())
    }
}

impl std::fmt::Debug for StorePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePrefix")
            .field("address", &self.address())
            .field("length", &self.datagram_len())
            .finish()
    }
}

/// Write prefix and datagram into `dst` as one contiguous record.
///
/// Building the whole record first lets the collector append it with a single
/// write call.
pub fn encode_store_record(
    address: Ipv4Addr,
    datagram: &Datagram<'_>,
    dst: &mut impl BufMut,
) -> Result<()> {
    let prefix = StorePrefix::new(address, datagram.len())?;
    dst.put_slice(&prefix.to_bytes());
    dst.put_slice(datagram.as_bytes());
    Ok(())
}
