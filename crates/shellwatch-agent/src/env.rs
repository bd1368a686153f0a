//! Environment abstraction for deterministic testing.
//!
//! The capture driver needs wall-clock seconds for record timestamps and
//! fresh randomness for IVs. Both come through [`Environment`] so tests can
//! pin them.

use std::time::{SystemTime, UNIX_EPOCH};

use shellwatch_crypto::{CryptoError, IV_SIZE, Iv};

/// Time and randomness for the capture driver.
///
/// # Invariants
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - IVs drawn through [`Environment::iv`] are never reused under one secret
pub trait Environment: Clone + Send + Sync + 'static {
    /// Seconds since the Unix epoch, truncated to the 32-bit wire field.
    fn unix_time(&self) -> u32;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), CryptoError>;

    /// Fresh per-datagram IV.
    fn iv(&self) -> Result<Iv, CryptoError> {
        let mut bytes = [0u8; IV_SIZE];
        self.random_bytes(&mut bytes)?;
        Ok(Iv::new(bytes))
    }
}

/// Production environment: system clock and OS RNG.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn unix_time(&self) -> u32 {
        // A clock before 1970 is reported as 0 rather than failing the chunk
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
    }

    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), CryptoError> {
        getrandom::fill(buffer).map_err(|e| CryptoError::Entropy(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_time_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemEnv::new().unix_time() > 1_577_836_800);
    }

    #[test]
    fn system_ivs_differ() {
        let env = SystemEnv::new();
        assert_ne!(env.iv().unwrap(), env.iv().unwrap());
    }
}
