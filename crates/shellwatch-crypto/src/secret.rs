//! Shared secret configured on every agent and reconstructor.

use std::fmt;

use zeroize::Zeroize;

use crate::error::CryptoError;

/// Length of the shared secret in bytes
pub const SECRET_SIZE: usize = 16;

/// 16-byte shared secret mixed into every packet key.
///
/// The secret never travels on the wire. Only the agent (to encrypt) and the
/// reconstructor (to decrypt) hold it; the collector does not need it.
///
/// `Debug` is redacted and the bytes are zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; SECRET_SIZE]);

impl Secret {
    /// Wrap raw secret bytes.
    pub const fn new(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a secret from a byte slice of exactly [`SECRET_SIZE`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; SECRET_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSecretLength { expected: SECRET_SIZE, actual: bytes.len() }
        })?;
        Ok(Self(array))
    }

    /// Parse a secret from 32 hexadecimal characters.
    ///
    /// Surrounding whitespace is ignored so values read from files or
    /// environment variables with a trailing newline still parse.
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes = hex::decode(encoded.trim())?;
        let secret = Self::from_slice(&bytes);
        bytes.zeroize();
        secret
    }

    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl std::str::FromStr for Secret {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex() {
        let secret = Secret::from_hex("ba36f72a508e5bd395f934d352264674").unwrap();
        assert_eq!(secret.as_bytes()[0], 0xBA);
        assert_eq!(secret.as_bytes()[15], 0x74);
    }

    #[test]
    fn trims_whitespace() {
        let secret = Secret::from_hex("  00112233445566778899aabbccddeeff\n").unwrap();
        assert_eq!(secret.as_bytes()[1], 0x11);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = Secret::from_hex("0011").unwrap_err();
        assert_eq!(err, CryptoError::InvalidSecretLength { expected: 16, actual: 2 });
    }

    #[test]
    fn rejects_non_hex() {
        let err = Secret::from_hex("not hex at all, clearly not hex!").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEncoding(_)));
    }

    #[test]
    fn debug_is_redacted() {
        let secret = Secret::new([0xAB; SECRET_SIZE]);
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("ab"));
        assert!(!rendered.contains("171"));
    }
}
