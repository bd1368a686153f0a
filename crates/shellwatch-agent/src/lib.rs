//! Capture agent
//!
//! Installed in place of a login shell. Runs the real shell on a
//! pseudo-terminal and sends every keystroke chunk (and optionally every
//! output chunk) to the collector as an encrypted, integrity-tagged UDP
//! datagram.
//!
//! # Architecture
//!
//! The agent follows the Sans-IO and Action-Based pattern. The
//! [`CaptureDriver`] receives events ([`CaptureEvent`]), decides what is
//! logged and where bytes go, and returns actions ([`CaptureAction`]). The
//! [`runtime`] module owns the pty, the terminal and the socket and executes
//! those actions.
//!
//! # Components
//!
//! - [`CaptureDriver`]: per-session decision logic and counters
//! - [`AgentConfig`]: environment-variable configuration
//! - [`ShellCommand`]: real shell resolution and `execve`
//! - [`RawModeGuard`]: raw mode on the user's terminal, restored on drop
//! - [`UdpTransport`]: best-effort datagram sender
//!
//! # Fail-open
//!
//! If anything needed for monitoring cannot be set up (no terminal,
//! unreachable socket, raw mode refused, fork failure) the agent `exec`s the
//! real shell unmonitored ([`MonitorState::Passthrough`]).

#![deny(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
mod driver;
mod env;
mod error;
mod event;
pub mod policy;
pub mod runtime;
pub mod shell;
pub mod terminal;
mod transport;

pub use config::AgentConfig;
pub use driver::{CaptureConfig, CaptureDriver, CaptureStats, SessionIdentity};
pub use env::{Environment, SystemEnv};
pub use error::AgentError;
pub use event::{CaptureAction, CaptureEvent};
pub use policy::{LineDiscipline, is_password_context};
pub use runtime::MonitorState;
pub use shell::ShellCommand;
pub use terminal::RawModeGuard;
pub use transport::UdpTransport;
