//! Sequential store file reader.
//!
//! A store file is a flat run of `[IPv4 4][u16 BE length][datagram]` records
//! with no index or trailer. End of file on a record boundary is a clean end;
//! anywhere else it means the file was cut mid-record.

use std::{
    io::{self, Read},
    net::Ipv4Addr,
};

use bytes::Bytes;
use shellwatch_proto::StorePrefix;

use crate::error::ReconstructError;

/// One stored datagram and the address it arrived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// Sender address recorded by the collector
    pub address: Ipv4Addr,
    /// Datagram bytes, not yet verified
    pub datagram: Bytes,
    /// Byte offset of the record prefix in the file
    pub offset: u64,
}

/// Reads [`StoreEntry`] values from a store file.
///
/// After an error the reader is exhausted: framing is lost, so nothing after
/// the damaged record can be trusted to start on a boundary.
#[derive(Debug)]
pub struct StoreReader<R> {
    inner: R,
    offset: u64,
    done: bool,
}

impl<R: Read> StoreReader<R> {
    /// Wrap a reader positioned at the start of a store file.
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0, done: false }
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at a clean end of file.
    ///
    /// # Errors
    ///
    /// - `Truncated` if the file ends inside a prefix or datagram
    /// - `CorruptLength` if the prefix declares a length outside the valid
    ///   datagram range
    /// - `Read` on any other I/O failure
    pub fn next_entry(&mut self) -> Result<Option<StoreEntry>, ReconstructError> {
        if self.done {
            return Ok(None);
        }

        let result = self.read_entry();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn read_entry(&mut self) -> Result<Option<StoreEntry>, ReconstructError> {
        let record_offset = self.offset;

        let mut prefix_buf = [0u8; StorePrefix::SIZE];
        let got = self.fill(&mut prefix_buf)?;
        if got == 0 {
            return Ok(None);
        }
        if got < StorePrefix::SIZE {
            return Err(ReconstructError::Truncated {
                offset: record_offset,
                expected: StorePrefix::SIZE,
                actual: got,
            });
        }

        let Ok(prefix) = StorePrefix::from_bytes(&prefix_buf) else {
            unreachable!("prefix buffer is exactly StorePrefix::SIZE bytes");
        };
        if !prefix.has_valid_length() {
            return Err(ReconstructError::CorruptLength {
                offset: record_offset,
                length: prefix.datagram_len(),
            });
        }

        let length = prefix.datagram_len();
        let mut datagram = vec![0u8; length];
        let got = self.fill(&mut datagram)?;
        if got < length {
            return Err(ReconstructError::Truncated {
                offset: record_offset + StorePrefix::SIZE as u64,
                expected: length,
                actual: got,
            });
        }

        Ok(Some(StoreEntry {
            address: prefix.address(),
            datagram: Bytes::from(datagram),
            offset: record_offset,
        }))
    }

    /// Read until `buf` is full or end of file; returns bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, ReconstructError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    self.offset += n as u64;
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(ReconstructError::Read { offset: self.offset, source });
                },
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for StoreReader<R> {
    type Item = Result<StoreEntry, ReconstructError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
