//! Shellwatch wire protocol.
//!
//! Two binary layouts live here:
//!
//! - The [`datagram`] codec: one captured terminal chunk, encrypted and
//!   integrity-tagged, as it travels over UDP from agent to collector.
//! - The [`store`] record framing: how the collector prefixes each verified
//!   datagram with the sender address and length before appending it to a
//!   store file.
//!
//! ```text
//! datagram:     [ IV 16 ][ RecordHeader 17 | payload 0..4096 | NUL ]enc [ tag 20 ]
//! store record: [ IPv4 4 ][ len u16 ][ datagram ]
//! ```
//!
//! All multi-byte integers are big endian. The crate does no I/O.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod datagram;
pub mod errors;
pub mod header;
pub mod record;
pub mod store;

pub use datagram::{Datagram, MAX_DATAGRAM_SIZE, MIN_DATAGRAM_SIZE, decode, encode, verify};
pub use errors::{ProtocolError, Result};
pub use header::RecordHeader;
pub use record::{Direction, MAX_PAYLOAD_SIZE, SessionRecord};
pub use store::{MAX_STORE_RECORD_SIZE, StorePrefix, encode_store_record};
