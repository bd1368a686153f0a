//! SHA-1 digests used for tags, key derivation and session identity.

use sha1::{Digest as _, Sha1};

/// Size of a SHA-1 digest in bytes
pub const DIGEST_SIZE: usize = 20;

/// A 20-byte SHA-1 digest
pub type Digest = [u8; DIGEST_SIZE];

/// SHA-1 over a single buffer.
pub fn digest(data: &[u8]) -> Digest {
    digest_parts(&[data])
}

/// SHA-1 over the concatenation of `parts`, without allocating the
/// concatenation.
pub fn digest_parts(parts: &[&[u8]]) -> Digest {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part);
    }

    let mut out = [0u8; DIGEST_SIZE];
    out.copy_from_slice(&hasher.finalize());
    out
}
