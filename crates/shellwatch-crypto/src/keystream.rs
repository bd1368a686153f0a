//! RC4 keystream keyed by a [`PacketKey`].
//!
//! RC4 is symmetric: applying the keystream twice with the same key restores
//! the input, so one function serves both encryption and decryption.

use rc4::{KeyInit, Rc4, StreamCipher, consts::U20};

use crate::derivation::PacketKey;

/// XOR `data` in place with the RC4 keystream for `key`.
///
/// Every call starts a fresh keystream, so a key is only ever applied to one
/// contiguous region (the datagram body).
pub fn apply_keystream(key: &PacketKey, data: &mut [u8]) {
    let Ok(mut cipher) = Rc4::<U20>::new_from_slice(key.as_bytes()) else {
        unreachable!("packet keys are always 20 bytes");
    };
    cipher.apply_keystream(data);
}
