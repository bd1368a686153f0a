//! Datagram handling.
//!
//! [`Collector`] owns the store and the counters and decides, for one
//! received datagram, whether it is stored or dropped. It never holds the
//! shared secret: acceptance is the tag check alone, so nothing is decrypted
//! here. The async receive loop in [`crate::Server`] only feeds it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use shellwatch_proto::{Datagram, ProtocolError};

use crate::{
    config::StoreConfig,
    error::CollectorError,
    store::RotatingStore,
};

/// What happened to one received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Tag verified and the record was appended
    Stored {
        /// Store record size including the prefix
        bytes: usize,
        /// Whether the append triggered a rotation
        rotated: bool,
    },
    /// Shorter than the smallest valid datagram
    DiscardedShort,
    /// Longer than the largest valid datagram
    DiscardedOversized,
    /// Integrity tag did not match
    IntegrityFailure,
    /// Sender address cannot be expressed in the 4-byte address tag
    UnsupportedSender,
}

/// Running totals kept by the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Datagrams received
    pub received: u64,
    /// Datagrams appended to a store file
    pub stored: u64,
    /// Store bytes written across all files
    pub bytes_stored: u64,
    /// Too short to be a datagram
    pub discarded_short: u64,
    /// Too long to be a datagram
    pub discarded_oversized: u64,
    /// Tag mismatches
    pub integrity_failures: u64,
    /// Non-IPv4 senders
    pub unsupported_senders: u64,
    /// Appends that failed
    pub store_errors: u64,
    /// Store file rotations
    pub rotations: u64,
}

/// Verifies datagrams and appends them to the rotating store.
#[derive(Debug)]
pub struct Collector {
    store: RotatingStore,
    stats: CollectorStats,
}

impl Collector {
    /// Open the first store file and start with zeroed counters.
    pub fn open(config: &StoreConfig) -> Result<Self, CollectorError> {
        let store = RotatingStore::open(&config.dir, &config.prefix, config.max_bytes)?;
        Ok(Self { store, stats: CollectorStats::default() })
    }

    /// Handle one received datagram.
    ///
    /// Malformed, tampered and unsupported traffic is counted and reported as
    /// a [`Disposition`], never as an error. Errors come only from the store:
    /// a failed append is returned as a non-fatal error, a failed rotation as
    /// a fatal one (see [`CollectorError::is_fatal`]). A record is counted as
    /// stored once it is written, even if the rotation after it fails.
    pub fn handle_datagram(
        &mut self,
        from: SocketAddr,
        bytes: &[u8],
    ) -> Result<Disposition, CollectorError> {
        self.stats.received += 1;

        let datagram = match Datagram::parse(bytes) {
            Ok(datagram) => datagram,
            Err(ProtocolError::DatagramTooShort { actual, .. }) => {
                tracing::trace!(%from, len = actual, "discarding short datagram");
                self.stats.discarded_short += 1;
                return Ok(Disposition::DiscardedShort);
            },
            Err(e) => {
                tracing::debug!(%from, error = %e, "discarding malformed datagram");
                self.stats.discarded_oversized += 1;
                return Ok(Disposition::DiscardedOversized);
            },
        };

        if let Err(e) = datagram.verify() {
            tracing::warn!(%from, error = %e, "dropping datagram");
            self.stats.integrity_failures += 1;
            return Ok(Disposition::IntegrityFailure);
        }

        let Some(address) = sender_ipv4(from) else {
            tracing::warn!(%from, "dropping datagram from non-IPv4 sender");
            self.stats.unsupported_senders += 1;
            return Ok(Disposition::UnsupportedSender);
        };

        let bytes = self.store.append(address, &datagram).inspect_err(|_| {
            self.stats.store_errors += 1;
        })?;
        self.stats.stored += 1;
        self.stats.bytes_stored += bytes as u64;
        tracing::trace!(%from, bytes, "stored datagram");

        let rotated = self.store.rotate_if_full()?;
        Ok(Disposition::Stored { bytes, rotated })
    }

    /// Counters so far
    pub fn stats(&self) -> CollectorStats {
        // Rotations also happen when a damaged file is abandoned
        CollectorStats { rotations: self.store.rotations(), ..self.stats }
    }

    /// Store currently being written
    pub fn store(&self) -> &RotatingStore {
        &self.store
    }

    /// Flush and close the store, returning the final counters.
    pub fn shutdown(self) -> Result<CollectorStats, CollectorError> {
        let stats = self.stats();
        self.store.close()?;
        Ok(stats)
    }
}

/// IPv4 address to tag a stored record with.
///
/// IPv4-mapped IPv6 senders (dual-stack sockets) reduce to their IPv4 form.
pub fn sender_ipv4(from: SocketAddr) -> Option<Ipv4Addr> {
    match from.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use super::*;

    #[test]
    fn ipv4_sender_kept() {
        let from: SocketAddr = "192.168.1.20:5555".parse().unwrap();
        assert_eq!(sender_ipv4(from), Some(Ipv4Addr::new(192, 168, 1, 20)));
    }

    #[test]
    fn mapped_ipv6_sender_reduced() {
        let mapped = Ipv4Addr::new(10, 1, 2, 3).to_ipv6_mapped();
        let from = SocketAddr::new(IpAddr::V6(mapped), 40119);
        assert_eq!(sender_ipv4(from), Some(Ipv4Addr::new(10, 1, 2, 3)));
    }

    #[test]
    fn native_ipv6_sender_rejected() {
        let from = SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 40119);
        assert_eq!(sender_ipv4(from), None);
    }

    #[test]
    fn short_datagram_counted_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            dir: dir.path().to_path_buf(),
            prefix: "unit".to_string(),
            max_bytes: 1024,
        };
        let mut collector = Collector::open(&config).unwrap();
        let from: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let disposition = collector.handle_datagram(from, &[0u8; 53]).unwrap();

        assert_eq!(disposition, Disposition::DiscardedShort);
        assert_eq!(collector.stats().discarded_short, 1);
        assert_eq!(collector.stats().stored, 0);
        assert_eq!(collector.store().bytes_written(), 0);
    }

    #[test]
    fn forged_datagram_counted_as_integrity_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            dir: dir.path().to_path_buf(),
            prefix: "unit".to_string(),
            max_bytes: 1024,
        };
        let mut collector = Collector::open(&config).unwrap();
        let from: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let disposition = collector.handle_datagram(from, &[0xAB; 80]).unwrap();

        assert_eq!(disposition, Disposition::IntegrityFailure);
        assert_eq!(collector.stats().integrity_failures, 1);
        assert_eq!(collector.store().bytes_written(), 0);
    }
}
