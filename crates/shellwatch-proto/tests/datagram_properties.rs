//! Property-based tests for datagram encoding/decoding
//!
//! These verify the codec for ALL valid records, not just hand-picked
//! examples: round trip, tamper sensitivity and IV freshness.

use bytes::Bytes;
use proptest::prelude::*;
use shellwatch_crypto::{IV_SIZE, Iv, Secret};
use shellwatch_proto::{
    Direction, MAX_PAYLOAD_SIZE, MIN_DATAGRAM_SIZE, ProtocolError, SessionRecord, decode, encode,
    verify,
};

/// Strategy for generating arbitrary directions
fn arbitrary_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Input), Just(Direction::Output)]
}

/// Strategy for generating arbitrary records with payloads up to the limit
fn arbitrary_record() -> impl Strategy<Value = SessionRecord> {
    (
        any::<u32>(), // timestamp
        any::<u32>(), // user_id
        any::<u32>(), // process_id
        arbitrary_direction(),
        prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE),
    )
        .prop_map(|(timestamp, user_id, process_id, direction, payload)| SessionRecord {
            timestamp,
            user_id,
            process_id,
            direction,
            payload: Bytes::from(payload),
        })
}

fn arbitrary_secret() -> impl Strategy<Value = Secret> {
    any::<[u8; 16]>().prop_map(Secret::new)
}

fn arbitrary_iv() -> impl Strategy<Value = Iv> {
    any::<[u8; 16]>().prop_map(Iv::new)
}

proptest! {
    #[test]
    fn prop_encode_decode_roundtrip(
        secret in arbitrary_secret(),
        record in arbitrary_record(),
        iv in arbitrary_iv(),
    ) {
        let wire = encode(&secret, &record, iv).expect("encode should succeed");

        // PROPERTY: size is exactly the fixed overhead plus the payload
        prop_assert_eq!(wire.len(), MIN_DATAGRAM_SIZE + record.payload.len());

        // PROPERTY: Round-trip must be identity
        let decoded = decode(&secret, &wire).expect("decode should succeed");
        prop_assert_eq!(decoded, record);
    }

    #[test]
    fn prop_single_bit_flip_is_detected(
        secret in arbitrary_secret(),
        record in arbitrary_record(),
        iv in arbitrary_iv(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut wire = encode(&secret, &record, iv).expect("encode should succeed").to_vec();

        // Flip one bit somewhere in the ciphertext or tag (everything after the IV)
        let offset = IV_SIZE + position.index(wire.len() - IV_SIZE);
        wire[offset] ^= 1 << bit;

        prop_assert_eq!(verify(&wire), Err(ProtocolError::IntegrityMismatch));
        prop_assert_eq!(decode(&secret, &wire), Err(ProtocolError::IntegrityMismatch));
    }

    #[test]
    fn prop_decode_never_panics_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..5000)) {
        let _ = decode(&Secret::new([0; 16]), &bytes);
    }
}

#[test]
fn fresh_ivs_produce_distinct_datagrams() {
    let secret = Secret::new([0x11; 16]);
    let record =
        SessionRecord::new(1_700_000_000, 1000, 4242, Direction::Input, &b"uname -a"[..]).unwrap();

    let first = encode(&secret, &record, Iv::generate().unwrap()).unwrap();
    let second = encode(&secret, &record, Iv::generate().unwrap()).unwrap();

    assert_ne!(first[..IV_SIZE], second[..IV_SIZE], "IVs must differ");
    assert_ne!(first[IV_SIZE..], second[IV_SIZE..], "ciphertexts must differ");

    // Both still decode to the same record
    assert_eq!(decode(&secret, &first).unwrap(), record);
    assert_eq!(decode(&secret, &second).unwrap(), record);
}

#[test]
fn payload_may_contain_nul_bytes() {
    let secret = Secret::new([0x22; 16]);
    let record =
        SessionRecord::new(0, 0, 0, Direction::Output, &b"\0\0a\0b\0"[..]).unwrap();

    let wire = encode(&secret, &record, Iv::new([9; 16])).unwrap();
    assert_eq!(decode(&secret, &wire).unwrap().payload.as_ref(), b"\0\0a\0b\0");
}
