//! Shellwatch collector.
//!
//! Receives capture datagrams over UDP, checks each integrity tag, and appends
//! the survivors to size-rotated store files for later offline
//! reconstruction. The collector never holds the shared secret.
//!
//! # Components
//!
//! - [`Collector`]: per-datagram decision logic and counters (no network I/O)
//! - [`RotatingStore`]: append-only store files with size-based rotation
//! - [`UdpTransport`]: tokio UDP socket
//! - [`Server`]: receive loop that feeds the collector until shutdown
//!
//! One datagram is handled to completion before the next is received, so the
//! store handle and counters need no locking.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod collector;
pub mod config;
mod error;
pub mod store;
mod transport;

use std::{future::Future, net::SocketAddr};

pub use collector::{Collector, CollectorStats, Disposition, sender_ipv4};
pub use config::{CollectorConfig, StoreConfig};
pub use error::CollectorError;
pub use store::{RotatingStore, StoreError};
pub use transport::{RECV_BUFFER_SIZE, UdpTransport};

/// Production collector: UDP transport plus the rotating store.
#[derive(Debug)]
pub struct Server {
    collector: Collector,
    transport: UdpTransport,
}

impl Server {
    /// Validate the configuration, open the first store file and bind the
    /// socket.
    ///
    /// # Errors
    ///
    /// All errors are fatal: invalid configuration, store directory not
    /// writable, or bind failure.
    pub async fn bind(config: CollectorConfig) -> Result<Self, CollectorError> {
        config.validate()?;
        let collector = Collector::open(&config.store)?;
        let transport = UdpTransport::bind(&config.bind_address).await?;

        Ok(Self { collector, transport })
    }

    /// Receive datagrams until `shutdown` resolves or a fatal store error
    /// occurs.
    ///
    /// On shutdown the store file is synced and closed and the final counters
    /// are returned.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<CollectorStats, CollectorError> {
        let Self { mut collector, transport } = self;
        tracing::info!("Collector receiving on {}", transport.local_addr()?);

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                received = transport.recv_from(&mut buf) => {
                    let (len, from) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            tracing::error!("Receive error: {}", e);
                            continue;
                        },
                    };

                    if let Err(e) = collector.handle_datagram(from, &buf[..len]) {
                        if e.is_fatal() {
                            tracing::error!("Fatal store error: {}", e);
                            return Err(e);
                        }
                        tracing::error!(%from, "Dropped datagram: {}", e);
                    }
                },
                () = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                },
            }
        }

        let stats = collector.shutdown()?;
        log_stats(&stats);
        Ok(stats)
    }

    /// Local address the collector is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CollectorError> {
        self.transport.local_addr()
    }
}

fn log_stats(stats: &CollectorStats) {
    tracing::info!(
        received = stats.received,
        stored = stats.stored,
        bytes_stored = stats.bytes_stored,
        discarded_short = stats.discarded_short,
        discarded_oversized = stats.discarded_oversized,
        integrity_failures = stats.integrity_failures,
        unsupported_senders = stats.unsupported_senders,
        store_errors = stats.store_errors,
        rotations = stats.rotations,
        "Collector stopped"
    );
}
