//! Rotating append-only store.
//!
//! Verified datagrams are appended to the current store file as
//! `[IPv4 address][u16 BE length][datagram]`. Once the bytes written to a file
//! exceed the configured ceiling the file is synced, closed, and a fresh file
//! named from the wall clock takes its place. A file therefore never exceeds
//! the ceiling by more than one [`MAX_STORE_RECORD_SIZE`].
//!
//! Appends are all or nothing: a write that fails partway is truncated back
//! to the last whole record, so one failed append never breaks the framing of
//! the records after it.
//!
//! The store is synchronous: the collector handles one datagram to completion
//! before receiving the next, so there is no writer contention.

mod error;
mod naming;

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    net::Ipv4Addr,
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
};

use bytes::BytesMut;
use chrono::Local;
pub use error::StoreError;
pub use naming::{STORE_EXTENSION, store_file_name};
use shellwatch_proto::{Datagram, MAX_STORE_RECORD_SIZE, encode_store_record};

/// Permission bits for new store files (owner read/write only)
const STORE_FILE_MODE: u32 = 0o600;

/// Append-only store file that rotates at a size ceiling.
#[derive(Debug)]
pub struct RotatingStore {
    dir: PathBuf,
    prefix: String,
    max_bytes: u64,
    file: File,
    path: PathBuf,
    // Length of `file`: it starts empty and only grows by whole records
    written: u64,
    rotations: u64,
    scratch: BytesMut,
}

impl RotatingStore {
    /// Open the first store file in `dir`.
    ///
    /// # Errors
    ///
    /// - `StoreError::Open` if no file could be created (missing directory,
    ///   permissions, or every suffixed name taken)
    pub fn open(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        max_bytes: u64,
    ) -> Result<Self, StoreError> {
        let dir = dir.into();
        let prefix = prefix.into();
        let (file, path) = create_store_file(&dir, &prefix)?;

        tracing::info!(path = %path.display(), max_bytes, "opened store file");

        Ok(Self {
            dir,
            prefix,
            max_bytes,
            file,
            path,
            written: 0,
            rotations: 0,
            scratch: BytesMut::with_capacity(MAX_STORE_RECORD_SIZE),
        })
    }

    /// Append one verified datagram received from `address`; returns the
    /// record size including the prefix.
    ///
    /// The prefix and datagram go out in a single `write_all`. If that fails
    /// partway the file is truncated back to its previous length; if even the
    /// truncation fails the damaged file is abandoned for a new one.
    ///
    /// # Errors
    ///
    /// - `StoreError::Framing` if the datagram cannot be framed
    /// - `StoreError::Write` if the append failed; the file holds only whole
    ///   records (non-fatal)
    /// - `StoreError::Open` if the damaged file could not be replaced (fatal)
    pub fn append(
        &mut self,
        address: Ipv4Addr,
        datagram: &Datagram<'_>,
    ) -> Result<usize, StoreError> {
        self.scratch.clear();
        encode_store_record(address, datagram, &mut self.scratch)
            .map_err(|e| StoreError::Framing(e.to_string()))?;

        if let Err(e) = self.file.write_all(&self.scratch) {
            let err = self.write_error(&e);
            self.roll_back()?;
            return Err(err);
        }

        let bytes = self.scratch.len();
        self.written += bytes as u64;
        Ok(bytes)
    }

    /// Rotate if the current file is over the ceiling. Returns whether a new
    /// file was opened.
    ///
    /// # Errors
    ///
    /// - `StoreError::Open` if the next file could not be created
    pub fn rotate_if_full(&mut self) -> Result<bool, StoreError> {
        if self.written <= self.max_bytes {
            return Ok(false);
        }
        self.rotate()?;
        Ok(true)
    }

    /// Close the current file and open a new one.
    ///
    /// # Errors
    ///
    /// - `StoreError::Open` if the next file could not be created
    pub fn rotate(&mut self) -> Result<(), StoreError> {
        if let Err(e) = self.file.sync_all() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to sync store file");
        }

        let (file, path) = create_store_file(&self.dir, &self.prefix)?;
        tracing::info!(
            closed = %self.path.display(),
            opened = %path.display(),
            bytes = self.written,
            "rotated store file"
        );

        // Old handle is dropped (closed) on assignment
        self.file = file;
        self.path = path;
        self.written = 0;
        self.rotations += 1;
        Ok(())
    }

    /// Flush and close the current file.
    ///
    /// # Errors
    ///
    /// - `StoreError::Write` if the final sync failed
    pub fn close(self) -> Result<(), StoreError> {
        self.file.sync_all().map_err(|e| self.write_error(&e))?;
        tracing::info!(path = %self.path.display(), bytes = self.written, "closed store file");
        Ok(())
    }

    /// Path of the file currently being written
    pub fn current_path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the current file
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Number of rotations since the store was opened
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Drop whatever a failed write left after the last whole record.
    fn roll_back(&mut self) -> Result<(), StoreError> {
        match self.file.set_len(self.written) {
            Ok(()) => {
                tracing::warn!(
                    path = %self.path.display(),
                    len = self.written,
                    "rolled back partial append"
                );
                Ok(())
            },
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "cannot roll back partial append, abandoning file"
                );
                self.rotate()
            },
        }
    }

    fn write_error(&self, err: &io::Error) -> StoreError {
        StoreError::Write { path: self.path.clone(), reason: err.to_string() }
    }
}

/// Create a new store file, adding a `-N` suffix while the name is taken.
fn create_store_file(dir: &Path, prefix: &str) -> Result<(File, PathBuf), StoreError> {
    let now = Local::now();

    for attempt in 0..naming::MAX_NAME_ATTEMPTS {
        let path = dir.join(naming::suffixed_name(prefix, &now, attempt));
        match OpenOptions::new().append(true).create_new(true).mode(STORE_FILE_MODE).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(StoreError::Open { path, reason: e.to_string() }),
        }
    }

    Err(StoreError::Open {
        path: dir.join(store_file_name(prefix, &now)),
        reason: format!("{} candidate names already exist", naming::MAX_NAME_ATTEMPTS),
    })
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use shellwatch_crypto::{Iv, Secret};
    use shellwatch_proto::{Direction, SessionRecord, StorePrefix, encode};

    use super::*;

    fn datagram_bytes(payload: &[u8]) -> bytes::Bytes {
        let secret = Secret::new([7u8; 16]);
        let record = SessionRecord::new(
            1_700_000_000,
            1000,
            4242,
            Direction::Input,
            bytes::Bytes::copy_from_slice(payload),
        )
        .unwrap();
        encode(&secret, &record, Iv::new([3u8; 16])).unwrap()
    }

    #[test]
    fn append_writes_prefixed_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RotatingStore::open(dir.path(), "test", 1 << 20).unwrap();

        let bytes = datagram_bytes(b"ls");
        let datagram = Datagram::parse(&bytes).unwrap();
        let appended = store.append(Ipv4Addr::new(10, 0, 0, 7), &datagram).unwrap();

        assert_eq!(appended, StorePrefix::SIZE + bytes.len());
        assert!(!store.rotate_if_full().unwrap());

        let path = store.current_path().to_path_buf();
        store.close().unwrap();

        let contents = std::fs::read(&path).unwrap();
        let prefix = StorePrefix::from_bytes(&contents).unwrap();
        assert_eq!(prefix.address(), Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(prefix.datagram_len(), bytes.len());
        assert_eq!(&contents[StorePrefix::SIZE..], &bytes[..]);
    }

    #[test]
    fn new_files_are_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = RotatingStore::open(dir.path(), "perm", 1024).unwrap();

        let mode = std::fs::metadata(store.current_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn rotation_within_one_second_gets_distinct_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RotatingStore::open(dir.path(), "fast", 1024).unwrap();
        let first = store.current_path().to_path_buf();

        store.rotate().unwrap();
        store.rotate().unwrap();

        assert_ne!(store.current_path(), first);
        assert_eq!(store.rotations(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn missing_directory_is_fatal_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RotatingStore::open(dir.path().join("absent"), "x", 1024).unwrap_err();

        assert!(matches!(err, StoreError::Open { .. }));
        assert!(err.is_fatal());
    }
}
