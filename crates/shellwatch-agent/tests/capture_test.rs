//! Capture driver driven through a scripted session, with datagrams sent
//! over a real UDP socket and decoded on the other side.

use std::net::UdpSocket;

use bytes::Bytes;
use shellwatch_agent::{
    CaptureAction, CaptureConfig, CaptureDriver, CaptureEvent, LineDiscipline, SessionIdentity,
    SystemEnv, UdpTransport,
};
use shellwatch_crypto::Secret;
use shellwatch_proto::{Direction, SessionRecord, decode};

fn secret() -> Secret {
    Secret::from_hex("ba36f72a508e5bd395f934d352264674").unwrap()
}

fn keystrokes(text: &str, line: LineDiscipline) -> Vec<CaptureEvent> {
    text.bytes()
        .map(|b| CaptureEvent::TerminalInput { bytes: Bytes::copy_from_slice(&[b]), line })
        .collect()
}

/// Run `events` through a driver, sending datagrams to a local socket.
/// Returns the decoded records and the bytes forwarded to the shell.
fn capture(events: Vec<CaptureEvent>, log_output: bool) -> (Vec<SessionRecord>, Vec<u8>) {
    let collector = UdpSocket::bind("127.0.0.1:0").unwrap();
    let transport = UdpTransport::connect(&collector.local_addr().unwrap().to_string()).unwrap();

    let mut driver = CaptureDriver::new(
        SystemEnv::new(),
        CaptureConfig { secret: secret(), log_output },
        SessionIdentity { user_id: 1000, process_id: 2222 },
    );

    let mut to_shell = Vec::new();
    for event in events {
        for action in driver.handle(event) {
            match action {
                CaptureAction::Transmit(datagram) => {
                    let result = transport.send(&datagram);
                    driver.record_transmit(result);
                },
                CaptureAction::WriteToShell(bytes) => to_shell.extend_from_slice(&bytes),
                CaptureAction::WriteToTerminal(_) | CaptureAction::Stop => {},
            }
        }
    }

    let sent = driver.stats().packets_sent;
    let mut records = Vec::new();
    let mut buf = [0u8; 8192];
    for _ in 0..sent {
        let (n, _) = collector.recv_from(&mut buf).unwrap();
        records.push(decode(&secret(), &buf[..n]).unwrap());
    }

    (records, to_shell)
}

#[test]
fn password_never_leaves_the_host() {
    let mut events = keystrokes("sudo id\r", LineDiscipline::RAW);
    events.extend(keystrokes("hunter2\r", LineDiscipline::PASSWORD_PROMPT));
    events.extend(keystrokes("exit\r", LineDiscipline::RAW));
    events.push(CaptureEvent::ChildExited);

    let (records, to_shell) = capture(events, false);

    // Everything reaches the shell
    assert_eq!(to_shell, b"sudo id\rhunter2\rexit\r");

    // Only the two commands are logged, one keystroke per datagram
    let logged: Vec<u8> = records.iter().flat_map(|r| r.payload.to_vec()).collect();
    assert_eq!(logged, b"sudo id\rexit\r");
    assert!(records.iter().all(|r| r.direction == Direction::Input));
    assert!(records.iter().all(|r| r.user_id == 1000 && r.process_id == 2222));
}

#[test]
fn output_direction_logged_only_when_enabled() {
    let events = || {
        let mut events = keystrokes("ls\r", LineDiscipline::RAW);
        events.push(CaptureEvent::ShellOutput(Bytes::from_static(b"Cargo.toml\r\n")));
        events.push(CaptureEvent::EndOfStream);
        events
    };

    let (records, _) = capture(events(), false);
    assert_eq!(records.len(), 3);

    let (records, _) = capture(events(), true);
    assert_eq!(records.len(), 4);
    assert_eq!(records[3].direction, Direction::Output);
    assert_eq!(records[3].payload.as_ref(), b"Cargo.toml\r\n");
}

#[test]
fn events_after_stop_are_ignored() {
    let mut events = vec![CaptureEvent::EndOfStream];
    events.extend(keystrokes("rm -rf /\r", LineDiscipline::RAW));

    let (records, to_shell) = capture(events, false);
    assert!(records.is_empty());
    assert!(to_shell.is_empty());
}
