//! Session registry.
//!
//! Groups decoded records into sessions by identity hash: SHA-1 over the
//! sender address, user id and process id. Sessions keep their chunks in
//! arrival order and are enumerated in the order they were first seen.

use std::{collections::HashMap, net::Ipv4Addr};

use shellwatch_crypto::{Digest, digest_parts};
use shellwatch_proto::{Direction, SessionRecord};

/// Fields that identify one captured session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Agent host, as recorded by the collector
    pub address: Ipv4Addr,
    /// User id of the captured shell
    pub user_id: u32,
    /// Process id of the captured shell
    pub process_id: u32,
}

impl SessionKey {
    /// Key for a record received from `address`.
    pub fn for_record(address: Ipv4Addr, record: &SessionRecord) -> Self {
        Self { address, user_id: record.user_id, process_id: record.process_id }
    }

    /// SHA-1 of `address ‖ user_id BE ‖ process_id BE`.
    pub fn identity_hash(&self) -> Digest {
        digest_parts(&[
            &self.address.octets(),
            &self.user_id.to_be_bytes(),
            &self.process_id.to_be_bytes(),
        ])
    }
}

/// One session's chunks in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    key: SessionKey,
    chunks: Vec<SessionRecord>,
}

impl Session {
    fn new(key: SessionKey) -> Self {
        Self { key, chunks: Vec::new() }
    }

    /// Identity of this session
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// All chunks, oldest first
    pub fn chunks(&self) -> &[SessionRecord] {
        &self.chunks
    }

    /// Keystroke chunks, oldest first
    pub fn input_chunks(&self) -> impl Iterator<Item = &SessionRecord> {
        self.chunks.iter().filter(|c| c.direction == Direction::Input)
    }

    /// Number of shell output chunks
    pub fn output_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.direction == Direction::Output).count()
    }
}

/// Sessions of one reconstruction run, keyed by identity hash.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    index: HashMap<Digest, usize>,
    sessions: Vec<Session>,
}

impl SessionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `record` to its session, creating the session on first sight.
    ///
    /// Returns true if a new session was created.
    pub fn insert(&mut self, address: Ipv4Addr, record: SessionRecord) -> bool {
        let key = SessionKey::for_record(address, &record);
        let hash = key.identity_hash();

        let (slot, created) = match self.index.get(&hash) {
            Some(&slot) => (slot, false),
            None => {
                let slot = self.sessions.len();
                self.sessions.push(Session::new(key));
                self.index.insert(hash, slot);
                (slot, true)
            },
        };

        self.sessions[slot].chunks.push(record);
        created
    }

    /// Session for `key`, if any record matched it
    pub fn get(&self, key: &SessionKey) -> Option<&Session> {
        self.index.get(&key.identity_hash()).map(|&slot| &self.sessions[slot])
    }

    /// Sessions in first-seen order
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Number of sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if no records were inserted
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
