//! Capture driver.
//!
//! Pure decision logic for one monitored session: which chunks are logged,
//! how they are encoded, and where they are forwarded. No I/O happens here;
//! the runtime executes the returned [`CaptureAction`]s.
//!
//! Logging never blocks forwarding. A chunk that cannot be encoded is still
//! forwarded, and transmit failures are only counted.

use bytes::Bytes;
use shellwatch_crypto::Secret;
use shellwatch_proto::{Direction, MAX_PAYLOAD_SIZE, SessionRecord, encode};

use crate::{
    env::Environment,
    event::{CaptureAction, CaptureEvent},
    policy::is_password_context,
};

/// Identity stamped on every record of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Real user id of the agent
    pub user_id: u32,
    /// Process id of the monitored shell
    pub process_id: u32,
}

/// Driver settings
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Secret used for encoding
    pub secret: Secret,
    /// Log shell output as well as keystrokes
    pub log_output: bool,
}

/// Counters kept over the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Terminal chunks seen
    pub input_chunks: u64,
    /// Shell output chunks seen
    pub output_chunks: u64,
    /// Terminal chunks withheld as password input
    pub suppressed_chunks: u64,
    /// Datagrams handed to the transport successfully
    pub packets_sent: u64,
    /// Datagrams the transport failed to send
    pub send_failures: u64,
    /// Chunks that could not be encoded (entropy failure)
    pub encode_failures: u64,
}

/// Sans-IO capture state machine for one session.
#[derive(Debug)]
pub struct CaptureDriver<E: Environment> {
    env: E,
    config: CaptureConfig,
    identity: SessionIdentity,
    stats: CaptureStats,
    stopped: bool,
}

impl<E: Environment> CaptureDriver<E> {
    /// Driver for the session of `identity`.
    pub fn new(env: E, config: CaptureConfig, identity: SessionIdentity) -> Self {
        Self { env, config, identity, stats: CaptureStats::default(), stopped: false }
    }

    /// Process an event and return resulting actions.
    ///
    /// After [`CaptureAction::Stop`] has been returned every further event
    /// yields no actions.
    pub fn handle(&mut self, event: CaptureEvent) -> Vec<CaptureAction> {
        if self.stopped {
            return Vec::new();
        }

        match event {
            CaptureEvent::TerminalInput { bytes, line } => {
                self.stats.input_chunks += 1;
                if is_password_context(line) {
                    self.stats.suppressed_chunks += 1;
                    tracing::trace!(len = bytes.len(), "forwarding password input unlogged");
                    return vec![CaptureAction::WriteToShell(bytes)];
                }

                let mut actions = self.transmit(Direction::Input, &bytes);
                actions.push(CaptureAction::WriteToShell(bytes));
                actions
            },
            CaptureEvent::ShellOutput(bytes) => {
                self.stats.output_chunks += 1;
                let mut actions = if self.config.log_output {
                    self.transmit(Direction::Output, &bytes)
                } else {
                    Vec::new()
                };
                actions.push(CaptureAction::WriteToTerminal(bytes));
                actions
            },
            CaptureEvent::ChildExited | CaptureEvent::EndOfStream => {
                self.stopped = true;
                vec![CaptureAction::Stop]
            },
        }
    }

    /// Record the outcome of a [`CaptureAction::Transmit`].
    pub fn record_transmit<Err: std::fmt::Display>(&mut self, result: Result<(), Err>) {
        match result {
            Ok(()) => self.stats.packets_sent += 1,
            Err(e) => {
                self.stats.send_failures += 1;
                tracing::debug!(error = %e, "datagram not sent");
            },
        }
    }

    /// Counters so far
    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Identity stamped on records
    pub fn identity(&self) -> SessionIdentity {
        self.identity
    }

    /// Whether `Stop` has been emitted
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Encode `bytes` as one datagram per `MAX_PAYLOAD_SIZE` slice.
    fn transmit(&mut self, direction: Direction, bytes: &Bytes) -> Vec<CaptureAction> {
        let timestamp = self.env.unix_time();
        let mut actions = Vec::new();

        for offset in (0..bytes.len()).step_by(MAX_PAYLOAD_SIZE) {
            let end = (offset + MAX_PAYLOAD_SIZE).min(bytes.len());
            let Ok(record) = SessionRecord::new(
                timestamp,
                self.identity.user_id,
                self.identity.process_id,
                direction,
                bytes.slice(offset..end),
            ) else {
                unreachable!("slice is at most MAX_PAYLOAD_SIZE bytes");
            };

            let iv = match self.env.iv() {
                Ok(iv) => iv,
                Err(e) => {
                    self.stats.encode_failures += 1;
                    tracing::debug!(error = %e, "no IV for datagram");
                    continue;
                },
            };

            let Ok(datagram) = encode(&self.config.secret, &record, iv) else {
                unreachable!("record payload was validated on construction");
            };
            actions.push(CaptureAction::Transmit(datagram));
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    };

    use proptest::prelude::*;
    use shellwatch_crypto::CryptoError;
    use shellwatch_proto::decode;

    use super::*;
    use crate::policy::LineDiscipline;

    #[derive(Clone)]
    struct TestEnv {
        counter: Arc<AtomicU8>,
        entropy_fails: bool,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { counter: Arc::new(AtomicU8::new(0)), entropy_fails: false }
        }
    }

    impl Environment for TestEnv {
        fn unix_time(&self) -> u32 {
            1_700_000_000
        }

        fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), CryptoError> {
            if self.entropy_fails {
                return Err(CryptoError::Entropy("test".into()));
            }
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            buffer.fill(n);
            Ok(())
        }
    }

    fn secret() -> Secret {
        Secret::new([9; 16])
    }

    fn driver(log_output: bool) -> CaptureDriver<TestEnv> {
        CaptureDriver::new(
            TestEnv::new(),
            CaptureConfig { secret: secret(), log_output },
            SessionIdentity { user_id: 1000, process_id: 4321 },
        )
    }

    fn input(bytes: &'static [u8], line: LineDiscipline) -> CaptureEvent {
        CaptureEvent::TerminalInput { bytes: Bytes::from_static(bytes), line }
    }

    #[test]
    fn input_is_transmitted_then_forwarded() {
        let mut driver = driver(false);
        let actions = driver.handle(input(b"ls", LineDiscipline::RAW));

        assert_eq!(actions.len(), 2);
        let CaptureAction::Transmit(datagram) = &actions[0] else {
            panic!("expected transmit first, got {actions:?}");
        };
        assert_eq!(actions[1], CaptureAction::WriteToShell(Bytes::from_static(b"ls")));

        let record = decode(&secret(), datagram).unwrap();
        assert_eq!(record.direction, Direction::Input);
        assert_eq!(record.user_id, 1000);
        assert_eq!(record.process_id, 4321);
        assert_eq!(record.timestamp, 1_700_000_000);
        assert_eq!(record.payload.as_ref(), b"ls");
    }

    #[test]
    fn password_input_forwarded_unlogged() {
        let mut driver = driver(false);
        let actions = driver.handle(input(b"hunter2\r", LineDiscipline::PASSWORD_PROMPT));

        assert_eq!(actions, vec![CaptureAction::WriteToShell(Bytes::from_static(b"hunter2\r"))]);
        assert_eq!(driver.stats().suppressed_chunks, 1);
    }

    #[test]
    fn output_not_logged_by_default() {
        let mut driver = driver(false);
        let actions = driver.handle(CaptureEvent::ShellOutput(Bytes::from_static(b"total 0\r\n")));

        assert_eq!(
            actions,
            vec![CaptureAction::WriteToTerminal(Bytes::from_static(b"total 0\r\n"))]
        );
    }

    #[test]
    fn output_logged_when_enabled() {
        let mut driver = driver(true);
        let actions = driver.handle(CaptureEvent::ShellOutput(Bytes::from_static(b"$ ")));

        assert_eq!(actions.len(), 2);
        let CaptureAction::Transmit(datagram) = &actions[0] else {
            panic!("expected transmit first, got {actions:?}");
        };
        assert_eq!(decode(&secret(), datagram).unwrap().direction, Direction::Output);
    }

    #[test]
    fn each_datagram_gets_fresh_iv() {
        let mut driver = driver(false);
        let first = driver.handle(input(b"a", LineDiscipline::RAW));
        let second = driver.handle(input(b"a", LineDiscipline::RAW));

        assert_ne!(first[0], second[0]);
    }

    #[test]
    fn oversized_chunk_split_into_datagrams() {
        let mut driver = driver(false);
        let bytes = Bytes::from(vec![b'x'; MAX_PAYLOAD_SIZE + 10]);
        let actions =
            driver.handle(CaptureEvent::TerminalInput { bytes, line: LineDiscipline::RAW });

        let transmits: Vec<_> =
            actions.iter().filter(|a| matches!(a, CaptureAction::Transmit(_))).collect();
        assert_eq!(transmits.len(), 2);
    }

    #[test]
    fn entropy_failure_still_forwards() {
        let mut driver = CaptureDriver::new(
            TestEnv { entropy_fails: true, ..TestEnv::new() },
            CaptureConfig { secret: secret(), log_output: false },
            SessionIdentity { user_id: 0, process_id: 1 },
        );

        let actions = driver.handle(input(b"id", LineDiscipline::RAW));

        assert_eq!(actions, vec![CaptureAction::WriteToShell(Bytes::from_static(b"id"))]);
        assert_eq!(driver.stats().encode_failures, 1);
    }

    #[test]
    fn stop_is_terminal() {
        let mut driver = driver(false);
        assert_eq!(driver.handle(CaptureEvent::ChildExited), vec![CaptureAction::Stop]);
        assert!(driver.is_stopped());
        assert!(driver.handle(input(b"x", LineDiscipline::RAW)).is_empty());
    }

    #[test]
    fn transmit_outcomes_counted() {
        let mut driver = driver(false);
        driver.record_transmit::<std::io::Error>(Ok(()));
        driver.record_transmit(Err(std::io::Error::other("connection refused")));

        assert_eq!(driver.stats().packets_sent, 1);
        assert_eq!(driver.stats().send_failures, 1);
    }

    proptest! {
        #[test]
        fn logged_payloads_reassemble_the_chunk(
            chunk in prop::collection::vec(any::<u8>(), 1..3 * MAX_PAYLOAD_SIZE),
        ) {
            let mut driver = driver(false);
            let bytes = Bytes::from(chunk.clone());
            let actions =
                driver.handle(CaptureEvent::TerminalInput { bytes, line: LineDiscipline::RAW });

            let mut logged = Vec::new();
            for action in &actions {
                if let CaptureAction::Transmit(datagram) = action {
                    let record = decode(&secret(), datagram).unwrap();
                    prop_assert!(record.payload.len() <= MAX_PAYLOAD_SIZE);
                    logged.extend_from_slice(&record.payload);
                }
            }

            prop_assert_eq!(&logged, &chunk);
            prop_assert_eq!(actions.last(), Some(&CaptureAction::WriteToShell(Bytes::from(chunk))));
        }
    }
}
