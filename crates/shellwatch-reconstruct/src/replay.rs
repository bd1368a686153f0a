//! Command line replay.
//!
//! Keystroke chunks are concatenated into a line buffer. A chunk that is
//! exactly `\r` (Enter) ends the line. Anything typed after the last Enter is
//! never emitted, and Enter on an empty buffer produces no line.

use std::{
    fs::OpenOptions,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use shellwatch_proto::SessionRecord;

use crate::{
    error::ReconstructError,
    registry::{Session, SessionKey},
};

/// Accumulates keystrokes and yields completed command lines.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buf: Vec<u8>,
}

impl LineAssembler {
    /// Empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one keystroke chunk. Returns the completed line when the chunk is
    /// a command boundary.
    pub fn push(&mut self, chunk: &SessionRecord) -> Option<Vec<u8>> {
        if !chunk.is_carriage_return() {
            self.buf.extend_from_slice(&chunk.payload);
            return None;
        }

        if self.buf.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }

    /// Bytes typed since the last boundary
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }
}

/// Completed command lines of `chunks`, oldest first.
pub fn command_lines<'a>(chunks: impl IntoIterator<Item = &'a SessionRecord>) -> Vec<Vec<u8>> {
    let mut assembler = LineAssembler::new();
    chunks.into_iter().filter_map(|chunk| assembler.push(chunk)).collect()
}

/// Artifact file name: `{uid}-{pid}-{a.b.c.d}.log`.
pub fn artifact_name(key: &SessionKey) -> String {
    format!("{}-{}-{}.log", key.user_id, key.process_id, key.address)
}

/// Append the session's command lines to its artifact in `dir`.
///
/// The file is created if needed and opened for append, so repeated runs
/// over new store files extend existing artifacts. Returns the artifact path
/// and the number of lines written.
pub fn write_session(dir: &Path, session: &Session) -> Result<(PathBuf, usize), ReconstructError> {
    let path = dir.join(artifact_name(session.key()));
    let lines = command_lines(session.input_chunks());

    let output_error = |source| ReconstructError::Output { path: path.clone(), source };

    let file = OpenOptions::new().create(true).append(true).open(&path).map_err(output_error)?;
    let mut out = BufWriter::new(file);
    for line in &lines {
        out.write_all(line).map_err(output_error)?;
        out.write_all(b"\n").map_err(output_error)?;
    }
    out.flush().map_err(output_error)?;

    Ok((path, lines.len()))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use bytes::Bytes;
    use shellwatch_proto::Direction;

    use super::*;

    fn keys(chunks: &[&'static [u8]]) -> Vec<SessionRecord> {
        chunks
            .iter()
            .map(|c| {
                SessionRecord::new(0, 0, 0, Direction::Input, Bytes::from_static(c)).unwrap()
            })
            .collect()
    }

    #[test]
    fn keystrokes_form_one_line() {
        let chunks = keys(&[b"l", b"s", b" ", b"-", b"l", b"\r"]);
        assert_eq!(command_lines(&chunks), vec![b"ls -l".to_vec()]);
    }

    #[test]
    fn trailing_content_never_flushed() {
        let chunks = keys(&[b"i", b"d", b"\r", b"e", b"x", b"i"]);
        assert_eq!(command_lines(&chunks), vec![b"id".to_vec()]);
    }

    #[test]
    fn empty_enter_emits_nothing() {
        let chunks = keys(&[b"\r", b"p", b"w", b"d", b"\r", b"\r"]);
        assert_eq!(command_lines(&chunks), vec![b"pwd".to_vec()]);
    }

    #[test]
    fn multi_byte_chunk_containing_cr_is_not_a_boundary() {
        // Only a chunk that is exactly "\r" ends a line (pasted text arrives whole)
        let chunks = keys(&[b"echo a\r", b"\r"]);
        assert_eq!(command_lines(&chunks), vec![b"echo a\r".to_vec()]);
    }

    #[test]
    fn pending_tracks_unterminated_input() {
        let mut assembler = LineAssembler::new();
        for chunk in keys(&[b"c", b"d"]) {
            assert!(assembler.push(&chunk).is_none());
        }
        assert_eq!(assembler.pending(), b"cd");
    }

    #[test]
    fn artifact_name_format() {
        let key = SessionKey { address: Ipv4Addr::new(192, 168, 0, 9), user_id: 0, process_id: 812 };
        assert_eq!(artifact_name(&key), "0-812-192.168.0.9.log");
    }
}
