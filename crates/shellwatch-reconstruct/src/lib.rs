//! Shellwatch session reconstruction.
//!
//! Reads store files written by the collector, verifies and decrypts each
//! datagram with the shared secret, regroups interleaved records into
//! sessions, and replays each session's keystrokes into command lines.
//!
//! ```text
//! store files ──► StoreReader ──► decode ──► SessionRegistry ──► replay ──► {uid}-{pid}-{addr}.log
//! ```
//!
//! Several store files (a rotated series) can be fed into one
//! [`Reconstructor`], so a session that spans a rotation comes out as one
//! artifact.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod reader;
pub mod registry;
pub mod replay;

use std::{
    fs::File,
    io::{BufReader, Read},
    net::Ipv4Addr,
    path::{Path, PathBuf},
};

pub use error::ReconstructError;
pub use reader::{StoreEntry, StoreReader};
pub use registry::{Session, SessionKey, SessionRegistry};
pub use replay::{LineAssembler, artifact_name, command_lines, write_session};
use shellwatch_crypto::Secret;
use shellwatch_proto::{ProtocolError, decode};

/// Result of feeding one stored datagram to the reconstructor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Decoded and appended to a session
    Accepted {
        /// Whether the record started a new session
        new_session: bool,
    },
    /// Integrity tag mismatch; skipped without decrypting
    TagMismatch,
    /// Tag matched but the plaintext did not decode (wrong secret or a
    /// malformed record from a buggy agent)
    Undecodable(ProtocolError),
}

/// Counters for one reconstruction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructStats {
    /// Store records read
    pub records_read: u64,
    /// Records decoded into sessions
    pub records_accepted: u64,
    /// Records skipped on tag mismatch
    pub tag_mismatches: u64,
    /// Records skipped because decoding failed
    pub decode_failures: u64,
    /// Store files that ended in a fatal error
    pub failed_files: u64,
}

/// Artifacts produced by [`Reconstructor::write_sessions`]
#[derive(Debug, Default)]
pub struct WriteSummary {
    /// Artifact path and line count for each session written
    pub written: Vec<(PathBuf, usize)>,
    /// Sessions whose artifact could not be written
    pub failed: Vec<ReconstructError>,
}

/// One reconstruction run: secret, session registry and counters.
#[derive(Debug)]
pub struct Reconstructor {
    secret: Secret,
    registry: SessionRegistry,
    stats: ReconstructStats,
}

impl Reconstructor {
    /// Start a run with an empty registry
    pub fn new(secret: Secret) -> Self {
        Self { secret, registry: SessionRegistry::new(), stats: ReconstructStats::default() }
    }

    /// Verify, decode and file one datagram from `address`.
    pub fn ingest(&mut self, address: Ipv4Addr, datagram: &[u8]) -> IngestOutcome {
        self.stats.records_read += 1;

        // decode checks the tag before touching the secret
        match decode(&self.secret, datagram) {
            Ok(record) => {
                self.stats.records_accepted += 1;
                let new_session = self.registry.insert(address, record);
                IngestOutcome::Accepted { new_session }
            },
            Err(ProtocolError::IntegrityMismatch) => {
                tracing::debug!(%address, "skipping record with bad integrity tag");
                self.stats.tag_mismatches += 1;
                IngestOutcome::TagMismatch
            },
            Err(e) => {
                tracing::warn!(%address, error = %e, "skipping undecodable record");
                self.stats.decode_failures += 1;
                IngestOutcome::Undecodable(e)
            },
        }
    }

    /// Ingest every record of a store file read from `reader`.
    ///
    /// Returns the number of records read. On a fatal framing error, records
    /// before the damage stay in the registry.
    pub fn ingest_reader<R: Read>(&mut self, reader: R) -> Result<u64, ReconstructError> {
        let mut count = 0;
        for entry in StoreReader::new(reader) {
            let entry = entry.inspect_err(|_| self.stats.failed_files += 1)?;
            self.ingest(entry.address, &entry.datagram);
            count += 1;
        }
        Ok(count)
    }

    /// Open and ingest a store file.
    pub fn ingest_file(&mut self, path: &Path) -> Result<u64, ReconstructError> {
        let file = File::open(path).map_err(|source| {
            self.stats.failed_files += 1;
            ReconstructError::Open { path: path.to_path_buf(), source }
        })?;

        let count = self.ingest_reader(BufReader::new(file))?;
        tracing::info!(path = %path.display(), records = count, "ingested store file");
        Ok(count)
    }

    /// Write one artifact per session into `dir`.
    ///
    /// A failed artifact does not stop the others.
    pub fn write_sessions(&self, dir: &Path) -> WriteSummary {
        let mut summary = WriteSummary::default();
        for session in self.registry.sessions() {
            match write_session(dir, session) {
                Ok((path, lines)) => {
                    tracing::debug!(path = %path.display(), lines, "wrote session");
                    summary.written.push((path, lines));
                },
                Err(e) => {
                    tracing::error!("{}", e);
                    summary.failed.push(e);
                },
            }
        }
        summary
    }

    /// Sessions collected so far
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Counters so far
    pub fn stats(&self) -> ReconstructStats {
        self.stats
    }
}
