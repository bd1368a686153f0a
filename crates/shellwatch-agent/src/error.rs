//! Agent error types.

use thiserror::Error;

/// Errors that keep the agent from monitoring a session.
///
/// Every error other than [`AgentError::Exec`] happens during setup and sends
/// the agent to passthrough: the real shell runs unmonitored.
#[derive(Debug, Error)]
pub enum AgentError {
    /// stdin, stdout or stderr is not a terminal
    #[error("not an interactive session: {0} is not a terminal")]
    NotInteractive(&'static str),

    /// Real shell path could not be built
    #[error("cannot resolve real shell: {0}")]
    ShellResolution(String),

    /// Collector socket could not be set up
    #[error("transport error: {0}")]
    Transport(String),

    /// Terminal attributes or window size could not be read or set
    #[error("terminal error: {0}")]
    Terminal(String),

    /// Pseudo-terminal allocation or fork failed
    #[error("spawn error: {0}")]
    Spawn(String),

    /// Signal handlers could not be installed
    #[error("signal setup failed: {0}")]
    Signal(String),

    /// Real shell could not be executed
    #[error("exec of {path} failed: {reason}")]
    Exec {
        /// Shell path passed to execve
        path: String,
        /// errno description
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_failure_names_the_shell() {
        let err = AgentError::Exec { path: "/bin/bash".into(), reason: "No such file".into() };
        assert_eq!(err.to_string(), "exec of /bin/bash failed: No such file");
    }

    #[test]
    fn display_names_the_stream() {
        assert_eq!(
            AgentError::NotInteractive("stdout").to_string(),
            "not an interactive session: stdout is not a terminal"
        );
    }
}
