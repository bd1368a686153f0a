//! Fuzz target for integrity tag coverage
//!
//! # Strategy
//!
//! Encode a valid record, then apply arbitrary byte edits to the ciphertext
//! and tag.
//!
//! # Invariants
//!
//! - Any change to ciphertext or tag MUST fail with `IntegrityMismatch`
//! - Unedited datagrams MUST decode back to the original record

#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use shellwatch_crypto::{IV_SIZE, Iv, Secret};
use shellwatch_proto::{Direction, MAX_PAYLOAD_SIZE, ProtocolError, SessionRecord, decode, encode};

#[derive(Debug, Arbitrary)]
struct Input {
    iv: [u8; IV_SIZE],
    timestamp: u32,
    user_id: u32,
    process_id: u32,
    output: bool,
    payload: Vec<u8>,
    edits: Vec<(u16, u8)>,
}

fuzz_target!(|input: Input| {
    let secret = Secret::new([0x11; 16]);
    let mut payload = input.payload;
    payload.truncate(MAX_PAYLOAD_SIZE);

    let direction = if input.output { Direction::Output } else { Direction::Input };
    let Ok(record) = SessionRecord::new(
        input.timestamp,
        input.user_id,
        input.process_id,
        direction,
        Bytes::from(payload),
    ) else {
        return;
    };

    let Ok(encoded) = encode(&secret, &record, Iv::new(input.iv)) else {
        return;
    };
    let mut datagram = encoded.to_vec();

    let body = datagram.len() - IV_SIZE;
    for (position, xor) in &input.edits {
        let index = IV_SIZE + (*position as usize % body);
        datagram[index] ^= xor;
    }

    if datagram == encoded.as_ref() {
        assert_eq!(decode(&secret, &datagram), Ok(record));
    } else {
        assert_eq!(decode(&secret, &datagram), Err(ProtocolError::IntegrityMismatch));
    }
});
