//! Per-packet key derivation from the shared secret and a random IV

use zeroize::Zeroize;

use crate::{
    IV_SIZE, PACKET_KEY_SIZE,
    digest::digest_parts,
    error::CryptoError,
    secret::Secret,
};

/// Random per-datagram value, sent in the clear in front of the ciphertext.
///
/// An IV must never repeat under the same secret: it is the only input that
/// makes two packet keys differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv([u8; IV_SIZE]);

impl Iv {
    /// Wrap caller-provided IV bytes.
    pub const fn new(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh IV from the OS cryptographic RNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; IV_SIZE];
        getrandom::fill(&mut bytes).map_err(|e| CryptoError::Entropy(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Raw IV bytes.
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

/// 20-byte RC4 key for one datagram. Zeroized on drop.
pub struct PacketKey([u8; PACKET_KEY_SIZE]);

impl PacketKey {
    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PACKET_KEY_SIZE] {
        &self.0
    }
}

impl Drop for PacketKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Derive the packet key: `SHA-1(secret ‖ iv)`.
///
/// # Security
///
/// - Deterministic: same (secret, iv) always yields the same key, which is
///   what lets the reconstructor decrypt from the IV embedded in the datagram
/// - Different IVs produce unrelated keys, so RC4 never reuses a keystream as
///   long as IVs are fresh
pub fn derive_packet_key(secret: &Secret, iv: &Iv) -> PacketKey {
    PacketKey(digest_parts(&[secret.as_bytes(), iv.as_bytes()]))
}
