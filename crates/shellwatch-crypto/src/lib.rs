//! Shellwatch Cryptographic Primitives
//!
//! Building blocks for the shellwatch datagram codec. Pure functions with
//! deterministic outputs. Callers provide the per-packet IV so encoding can be
//! tested deterministically; [`Iv::generate`] draws one from the OS RNG for
//! production use.
//!
//! # Key Lifecycle
//!
//! ```text
//! Shared Secret (16 bytes, configured)      IV (16 bytes, per datagram)
//!        │                                    │
//!        └──────────────┬─────────────────────┘
//!                       ▼
//!          SHA-1(secret ‖ IV) → Packet Key (20 bytes)
//!                       │
//!                       ▼
//!          RC4 keystream over header ‖ payload ‖ NUL
//!                       │
//!                       ▼
//!          SHA-1(ciphertext) → Integrity Tag (20 bytes, in the clear)
//! ```
//!
//! # Security
//!
//! The integrity tag is an unkeyed digest over ciphertext. It detects
//! corruption and casual tampering and lets a relay discard bad traffic
//! without holding the secret. It does NOT authenticate the sender: anyone can
//! compute a valid tag for bytes they made up. Confidentiality holds only
//! against observers without the shared secret.
//!
//! Packet keys are zeroized on drop, as is the shared secret.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod derivation;
mod digest;
mod error;
mod keystream;
mod secret;

pub use derivation::{Iv, PacketKey, derive_packet_key};
pub use digest::{DIGEST_SIZE, Digest, digest, digest_parts};
pub use error::CryptoError;
pub use keystream::apply_keystream;
pub use secret::{SECRET_SIZE, Secret};

/// Size of the per-datagram IV in bytes.
pub const IV_SIZE: usize = 16;

/// Size of the integrity tag in bytes (one SHA-1 digest).
pub const TAG_SIZE: usize = DIGEST_SIZE;

/// Size of the derived packet key in bytes (one SHA-1 digest).
pub const PACKET_KEY_SIZE: usize = DIGEST_SIZE;
