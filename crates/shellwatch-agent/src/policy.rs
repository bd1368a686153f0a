//! Password-context policy.
//!
//! A terminal chunk typed while the shell's line discipline has echo off but
//! canonical mode on is almost certainly a secret (the shape `getpass`,
//! `sudo` and `passwd` put the terminal in). Such chunks are forwarded to the
//! shell but never logged.

/// Line-discipline flags sampled from the pty before each terminal chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineDiscipline {
    /// ICANON: input is line-buffered by the kernel
    pub canonical: bool,
    /// ECHO: typed characters are echoed back
    pub echo: bool,
}

impl LineDiscipline {
    /// Cooked mode with echo, the state of an idle shell prompt in most
    /// setups that do not use line editing.
    pub const COOKED: Self = Self { canonical: true, echo: true };

    /// What interactive line editors (readline, zle) switch to.
    pub const RAW: Self = Self { canonical: false, echo: false };

    /// Echo off in canonical mode: a password prompt.
    pub const PASSWORD_PROMPT: Self = Self { canonical: true, echo: false };
}

/// Whether input arriving under `line` must not be logged.
pub fn is_password_context(line: LineDiscipline) -> bool {
    line.canonical && !line.echo
}
