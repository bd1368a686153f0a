//! Fuzz target for datagram decoding
//!
//! Feeds arbitrary bytes to `verify` and `decode` to find:
//! - Parser crashes or panics
//! - Declared payload lengths that read past the decrypted body
//! - Size checks that let short datagrams reach the cipher
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use shellwatch_crypto::Secret;
use shellwatch_proto::{MAX_PAYLOAD_SIZE, decode, verify};

fuzz_target!(|data: &[u8]| {
    let _ = verify(data);

    let secret = Secret::new([0x5A; 16]);
    if let Ok(record) = decode(&secret, data) {
        assert!(record.payload.len() <= MAX_PAYLOAD_SIZE);
    }
});
