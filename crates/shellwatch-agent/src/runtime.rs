//! Unix runtime for a monitored session.
//!
//! Sets up the pty, forks the real shell onto it and relays bytes between the
//! user's terminal and the pty master, executing the actions of the
//! [`CaptureDriver`]. One thread, one blocking `poll` with no timeout.
//! SIGCHLD and SIGWINCH only set atomic flags; `poll` returns `EINTR` and
//! the flags are checked after every wake. A SIGCHLD flag is confirmed with a
//! non-blocking `waitpid` before the session ends, and output the shell left
//! on the pty is forwarded first.
//!
//! Any setup failure unwinds what was opened so far and the real shell is
//! exec'd directly: capture failing must never lock a user out.

use std::{
    fmt,
    io::{self, IsTerminal},
    os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
    sync::atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
    pty::{ForkptyResult, forkpty},
    sys::{
        signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction},
        wait::{WaitPidFlag, WaitStatus, waitpid},
    },
    unistd::{self, Pid, getuid},
};

use crate::{
    config::AgentConfig,
    driver::{CaptureConfig, CaptureDriver, SessionIdentity},
    env::SystemEnv,
    error::AgentError,
    event::{CaptureAction, CaptureEvent},
    policy::LineDiscipline,
    shell::ShellCommand,
    terminal::{self, RawModeGuard},
    transport::UdpTransport,
};

/// Bytes read per wake from either side; one chunk never exceeds a payload
pub const READ_BUFFER_SIZE: usize = shellwatch_proto::MAX_PAYLOAD_SIZE;

/// Exit status reported when the real shell cannot be exec'd
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// Reads of leftover pty output once the shell has exited; background jobs
/// may still hold the pty and keep writing
const MAX_DRAIN_READS: usize = 64;

static CHILD_EXITED: AtomicBool = AtomicBool::new(false);
static WINDOW_CHANGED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(signum: libc::c_int) {
    match signum {
        libc::SIGCHLD => CHILD_EXITED.store(true, Ordering::SeqCst),
        libc::SIGWINCH => WINDOW_CHANGED.store(true, Ordering::SeqCst),
        _ => {},
    }
}

/// Whether the session is being captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Shell runs on a pty and its input is captured
    Monitored,
    /// Shell was exec'd directly; nothing is captured
    Passthrough,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Monitored => f.write_str("monitored"),
            Self::Passthrough => f.write_str("passthrough"),
        }
    }
}

/// Result of session setup: a running monitored shell, or the reason the
/// shell must run unmonitored.
enum Setup {
    Monitored(MonitoredSession),
    Passthrough(AgentError),
}

impl Setup {
    /// Every setup failure leads to passthrough.
    fn attempt(config: &AgentConfig, shell: &ShellCommand) -> Self {
        match MonitoredSession::start(config, shell) {
            Ok(session) => Self::Monitored(session),
            Err(e) => Self::Passthrough(e),
        }
    }

    fn state(&self) -> MonitorState {
        match self {
            Self::Monitored(_) => MonitorState::Monitored,
            Self::Passthrough(_) => MonitorState::Passthrough,
        }
    }
}

/// Run the agent for `shell`.
///
/// In the monitored state this returns the shell's exit status once it is
/// gone. In passthrough the process is replaced by the shell, so this
/// returns only if that `exec` failed.
pub fn run(config: &AgentConfig, shell: &ShellCommand) -> Result<i32, AgentError> {
    let setup = Setup::attempt(config, shell);
    let state = setup.state();

    match setup {
        Setup::Monitored(session) => {
            tracing::debug!(%state, pid = session.child.as_raw(), "started");
            Ok(session.run())
        },
        Setup::Passthrough(reason) => {
            tracing::info!(%state, error = %reason, "shell unmonitored");
            Err(shell.exec())
        },
    }
}

/// stdin, stdout and stderr must all be terminals.
pub fn check_interactive() -> Result<(), AgentError> {
    let streams = [
        ("stdin", io::stdin().is_terminal()),
        ("stdout", io::stdout().is_terminal()),
        ("stderr", io::stderr().is_terminal()),
    ];
    match streams.into_iter().find(|(_, is_tty)| !is_tty) {
        Some((name, _)) => Err(AgentError::NotInteractive(name)),
        None => Ok(()),
    }
}

#[allow(unsafe_code)]
fn install_signal_handlers() -> Result<(), AgentError> {
    // No SA_RESTART: the blocking poll must return EINTR so flags get checked.
    // SA_NOCLDSTOP: a stopped or continued shell is not an exited one.
    for (sig, flags) in
        [(Signal::SIGCHLD, SaFlags::SA_NOCLDSTOP), (Signal::SIGWINCH, SaFlags::empty())]
    {
        let action = SigAction::new(SigHandler::Handler(on_signal), flags, SigSet::empty());
        // Safety: the handler only stores to atomics, which is
        // async-signal-safe.
        unsafe { sigaction(sig, &action) }
            .map_err(|e| AgentError::Signal(format!("sigaction {sig}: {e}")))?;
    }
    Ok(())
}

/// Exit status of `child` if it has terminated, without blocking.
///
/// Killed shells report `128 + signal`, as shells do for their own children.
pub fn child_exit_status(child: Pid) -> Option<i32> {
    match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => exit_code(status),
        // Nothing left to wait for: someone else reaped it
        Err(Errno::ECHILD) => Some(0),
        Err(e) => {
            tracing::debug!("waitpid: {}", e);
            None
        },
    }
}

fn exit_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
        _ => None,
    }
}

/// A shell running on a pty with the user's terminal in raw mode.
struct MonitoredSession {
    driver: CaptureDriver<SystemEnv>,
    transport: UdpTransport,
    master: OwnedFd,
    child: Pid,
    // Set once the shell has been reaped
    exit_status: Option<i32>,
    // Restores the user's terminal when the session is dropped
    _raw_mode: RawModeGuard<io::Stdin>,
}

impl MonitoredSession {
    #[allow(unsafe_code)]
    fn start(config: &AgentConfig, shell: &ShellCommand) -> Result<Self, AgentError> {
        check_interactive()?;
        let transport = UdpTransport::connect(&config.collector)?;

        let winsize = terminal::window_size(io::stdin())
            .inspect_err(|e| tracing::debug!("{}; pty keeps default size", e))
            .ok();

        install_signal_handlers()?;
        CHILD_EXITED.store(false, Ordering::SeqCst);
        WINDOW_CHANGED.store(false, Ordering::SeqCst);

        let raw_mode = RawModeGuard::enter(io::stdin())?;

        // Safety: the child only calls execve (and _exit on failure); every
        // argument was built before the fork.
        let forked = unsafe { forkpty(winsize.as_ref(), Some(raw_mode.saved())) }
            .map_err(|e| AgentError::Spawn(format!("forkpty: {e}")))?;

        let (child, master) = match forked {
            ForkptyResult::Parent { child, master } => (child, master),
            ForkptyResult::Child => {
                let _ = shell.exec();
                // Safety: _exit skips destructors, which belong to the parent
                unsafe { libc::_exit(EXEC_FAILURE_STATUS) }
            },
        };

        let identity =
            SessionIdentity { user_id: getuid().as_raw(), process_id: child.as_raw() as u32 };
        let driver = CaptureDriver::new(
            SystemEnv::new(),
            CaptureConfig { secret: config.secret.clone(), log_output: config.log_output },
            identity,
        );

        Ok(Self { driver, transport, master, child, exit_status: None, _raw_mode: raw_mode })
    }

    /// Relay until the shell exits or a side closes; returns the exit status.
    fn run(mut self) -> i32 {
        let mut buf = [0u8; READ_BUFFER_SIZE];

        while !self.driver.is_stopped() {
            for event in self.next_events(&mut buf) {
                let actions = self.driver.handle(event);
                self.execute(actions);
            }
        }

        log_stats(&self.driver);
        self.reap()
    }

    /// Block until something happens and turn it into events.
    fn next_events(&mut self, buf: &mut [u8]) -> Vec<CaptureEvent> {
        let mut events = Vec::new();
        let stdin = io::stdin();

        let (terminal_ready, shell_ready) = {
            let mut fds = [
                PollFd::new(stdin.as_fd(), PollFlags::POLLIN),
                PollFd::new(self.master.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => (is_ready(&fds[0]), is_ready(&fds[1])),
                Err(Errno::EINTR) => (false, false),
                Err(e) => {
                    tracing::debug!("poll: {}", e);
                    return vec![CaptureEvent::EndOfStream];
                },
            }
        };

        if terminal_ready {
            match read_chunk(stdin.as_fd(), buf) {
                ReadOutcome::Data(bytes) => {
                    let line = terminal::line_discipline(&self.master).unwrap_or_else(|e| {
                        tracing::debug!("{}; treating input as loggable", e);
                        LineDiscipline::COOKED
                    });
                    events.push(CaptureEvent::TerminalInput { bytes, line });
                },
                ReadOutcome::Closed => events.push(CaptureEvent::EndOfStream),
                ReadOutcome::Interrupted => {},
            }
        }

        if shell_ready {
            match read_chunk(self.master.as_fd(), buf) {
                ReadOutcome::Data(bytes) => events.push(CaptureEvent::ShellOutput(bytes)),
                ReadOutcome::Closed => events.push(CaptureEvent::EndOfStream),
                ReadOutcome::Interrupted => {},
            }
        }

        if WINDOW_CHANGED.swap(false, Ordering::SeqCst) {
            self.sync_window_size();
        }
        if CHILD_EXITED.swap(false, Ordering::SeqCst) {
            if let Some(status) = child_exit_status(self.child) {
                self.exit_status = Some(status);
                let leftover = drain(self.master.as_fd(), buf);
                events.extend(leftover.into_iter().map(CaptureEvent::ShellOutput));
                events.push(CaptureEvent::ChildExited);
            }
        }

        events
    }

    fn execute(&mut self, actions: Vec<CaptureAction>) {
        for action in actions {
            match action {
                CaptureAction::Transmit(datagram) => {
                    let result = self.transport.send(&datagram);
                    self.driver.record_transmit(result);
                },
                CaptureAction::WriteToShell(bytes) => {
                    if let Err(e) = write_all(self.master.as_fd(), &bytes) {
                        tracing::debug!("write to shell: {}", e);
                        self.driver.handle(CaptureEvent::EndOfStream);
                    }
                },
                CaptureAction::WriteToTerminal(bytes) => {
                    if let Err(e) = write_all(io::stdout().as_fd(), &bytes) {
                        tracing::debug!("write to terminal: {}", e);
                        self.driver.handle(CaptureEvent::EndOfStream);
                    }
                },
                CaptureAction::Stop => {},
            }
        }
    }

    fn sync_window_size(&self) {
        let result = terminal::window_size(io::stdin())
            .and_then(|ws| terminal::set_window_size(&self.master, &ws));
        if let Err(e) = result {
            tracing::debug!("window size not propagated: {}", e);
        }
    }

    /// Wait for the shell, hanging it up first if it is still running.
    fn reap(&self) -> i32 {
        if let Some(status) = self.exit_status.or_else(|| child_exit_status(self.child)) {
            return status;
        }

        // SIGCONT so a stopped shell can act on the hangup
        let _ = signal::kill(self.child, Signal::SIGHUP);
        let _ = signal::kill(self.child, Signal::SIGCONT);

        loop {
            match waitpid(self.child, None) {
                Ok(status) => {
                    if let Some(code) = exit_code(status) {
                        return code;
                    }
                },
                Err(Errno::EINTR) => {},
                Err(e) => {
                    tracing::debug!("waitpid: {}", e);
                    return 0;
                },
            }
        }
    }
}

fn is_ready(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|r| {
        r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
    })
}

/// Result of one read from either side
#[derive(Debug)]
enum ReadOutcome {
    Data(Bytes),
    /// End of file or error (EIO on the master means the shell closed the slave)
    Closed,
    Interrupted,
}

/// Output still queued on the pty master, read without blocking.
fn drain(fd: BorrowedFd<'_>, buf: &mut [u8]) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    for _ in 0..MAX_DRAIN_READS {
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        let ready = matches!(poll(&mut fds, PollTimeout::ZERO), Ok(n) if n > 0);
        if !ready || !is_ready(&fds[0]) {
            break;
        }
        match read_chunk(fd, buf) {
            ReadOutcome::Data(bytes) => chunks.push(bytes),
            ReadOutcome::Closed | ReadOutcome::Interrupted => break,
        }
    }
    chunks
}

fn read_chunk(fd: BorrowedFd<'_>, buf: &mut [u8]) -> ReadOutcome {
    match unistd::read(fd.as_raw_fd(), buf) {
        Ok(0) => ReadOutcome::Closed,
        Ok(n) => ReadOutcome::Data(Bytes::copy_from_slice(&buf[..n])),
        Err(Errno::EINTR | Errno::EAGAIN) => ReadOutcome::Interrupted,
        Err(e) => {
            tracing::debug!("read: {}", e);
            ReadOutcome::Closed
        },
    }
}

fn write_all(fd: BorrowedFd<'_>, mut data: &[u8]) -> Result<(), Errno> {
    while !data.is_empty() {
        match unistd::write(fd, data) {
            Ok(0) => return Err(Errno::EIO),
            Ok(n) => data = &data[n..],
            Err(Errno::EINTR) => {},
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn log_stats(driver: &CaptureDriver<SystemEnv>) {
    let identity = driver.identity();
    let stats = driver.stats();
    tracing::info!(
        user_id = identity.user_id,
        process_id = identity.process_id,
        input_chunks = stats.input_chunks,
        output_chunks = stats.output_chunks,
        suppressed_chunks = stats.suppressed_chunks,
        packets_sent = stats.packets_sent,
        send_failures = stats.send_failures,
        encode_failures = stats.encode_failures,
        "session ended"
    );
}

#[cfg(test)]
mod tests {
    use std::{process::Command, thread, time::Duration};

    use nix::pty::openpty;

    use super::*;

    fn wait_for_exit(child: Pid) -> i32 {
        for _ in 0..500 {
            if let Some(status) = child_exit_status(child) {
                return status;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("child {child} did not exit");
    }

    fn spawn(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program).args(args).spawn().unwrap();
        Pid::from_raw(i32::try_from(child.id()).unwrap())
    }

    #[test]
    fn monitor_state_display() {
        assert_eq!(MonitorState::Monitored.to_string(), "monitored");
        assert_eq!(MonitorState::Passthrough.to_string(), "passthrough");
    }

    #[test]
    fn read_chunk_reports_data_then_hangup() {
        let pty = openpty(None, None).unwrap();
        write_all(pty.slave.as_fd(), b"ok").unwrap();

        let mut buf = [0u8; 16];
        let ReadOutcome::Data(chunk) = read_chunk(pty.master.as_fd(), &mut buf) else {
            panic!("expected data");
        };
        assert_eq!(chunk.as_ref(), b"ok");

        drop(pty.slave);
        assert!(matches!(read_chunk(pty.master.as_fd(), &mut buf), ReadOutcome::Closed));
    }

    #[test]
    fn drain_collects_output_left_after_hangup() {
        let pty = openpty(None, None).unwrap();
        write_all(pty.slave.as_fd(), b"logout").unwrap();
        drop(pty.slave);

        let mut buf = [0u8; 64];
        let chunks = drain(pty.master.as_fd(), &mut buf);
        let drained: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(drained, b"logout");
    }

    #[test]
    fn drain_does_not_block_on_idle_pty() {
        let pty = openpty(None, None).unwrap();

        let mut buf = [0u8; 64];
        assert!(drain(pty.master.as_fd(), &mut buf).is_empty());
        drop(pty.slave);
    }

    #[test]
    fn exit_status_of_exited_child() {
        let child = spawn("sh", &["-c", "exit 3"]);
        assert_eq!(wait_for_exit(child), 3);
    }

    #[test]
    fn stopped_child_has_not_exited() {
        let child = spawn("sleep", &["30"]);
        signal::kill(child, Signal::SIGSTOP).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(child_exit_status(child), None);

        signal::kill(child, Signal::SIGCONT).unwrap();
        assert_eq!(child_exit_status(child), None);

        signal::kill(child, Signal::SIGKILL).unwrap();
        assert_eq!(wait_for_exit(child), 128 + Signal::SIGKILL as i32);
    }

    #[test]
    fn signal_handler_sets_flags() {
        CHILD_EXITED.store(false, Ordering::SeqCst);
        on_signal(libc::SIGCHLD);
        assert!(CHILD_EXITED.swap(false, Ordering::SeqCst));

        WINDOW_CHANGED.store(false, Ordering::SeqCst);
        on_signal(libc::SIGWINCH);
        assert!(WINDOW_CHANGED.swap(false, Ordering::SeqCst));
    }
}
