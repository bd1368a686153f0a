//! Fuzz target for store file reading and reconstruction
//!
//! Treats arbitrary bytes as a store file and runs the full offline
//! pipeline over it (framing, tag check, decode, session grouping).
//!
//! # Invariants
//!
//! - Reading MUST stop with a structured error or a clean end, never panic
//! - Records read MUST equal accepted + tag mismatches + decode failures

#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use shellwatch_crypto::Secret;
use shellwatch_reconstruct::Reconstructor;

fuzz_target!(|data: &[u8]| {
    let mut reconstructor = Reconstructor::new(Secret::new([0x5A; 16]));
    let _ = reconstructor.ingest_reader(Cursor::new(data));

    let stats = reconstructor.stats();
    assert_eq!(
        stats.records_read,
        stats.records_accepted + stats.tag_mismatches + stats.decode_failures
    );
});
