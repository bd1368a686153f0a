//! Capture events and actions.

use bytes::Bytes;

use crate::policy::LineDiscipline;

/// Events the runtime feeds into the capture driver.
///
/// The runtime is responsible for:
/// - Reading the user's terminal and the pty master
/// - Sampling the pty line discipline before each terminal chunk
/// - Noticing child exit and end of stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Bytes read from the user's terminal.
    TerminalInput {
        /// Chunk as read, at most one read buffer
        bytes: Bytes,
        /// Pty line discipline at the time of the read
        line: LineDiscipline,
    },

    /// Bytes read from the pty master (shell output).
    ShellOutput(Bytes),

    /// SIGCHLD was observed; the monitored shell is gone.
    ChildExited,

    /// One side reached end of file or failed.
    EndOfStream,
}

/// Actions the capture driver produces for the runtime to execute, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureAction {
    /// Send an encoded datagram to the collector.
    ///
    /// The runtime reports the outcome via
    /// [`crate::CaptureDriver::record_transmit`].
    Transmit(Bytes),

    /// Forward bytes to the shell (pty master).
    WriteToShell(Bytes),

    /// Forward bytes to the user's terminal.
    WriteToTerminal(Bytes),

    /// Stop relaying and reap the shell.
    Stop,
}
