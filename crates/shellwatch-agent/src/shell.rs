//! Real shell resolution and exec.
//!
//! The agent is installed under the name of a login shell (for example as
//! `/usr/local/bin/bash`) and the real binary lives in the real shell
//! directory. The real shell is found by joining that directory with the
//! file name the agent was invoked as.

use std::{
    ffi::{CString, OsStr, OsString},
    os::unix::ffi::OsStrExt,
    path::{Path, PathBuf},
};

use nix::unistd::execve;

use crate::{config::PRIVATE_VARS, error::AgentError};

/// Longest real shell path accepted, in bytes
pub const MAX_SHELL_PATH: usize = 255;

/// Shell used when the real shell cannot be resolved
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Path of the real shell for an agent invoked as `argv0`.
///
/// A leading `-` (the login-shell marker) is not part of the file name. The
/// result must fit in [`MAX_SHELL_PATH`] bytes and must not be the agent
/// executable itself, which would exec the agent in a loop.
pub fn resolve_real_shell(
    real_shell_dir: &Path,
    argv0: &OsStr,
    agent_exe: Option<&Path>,
) -> Result<PathBuf, AgentError> {
    let name = Path::new(argv0)
        .file_name()
        .map(OsStr::as_bytes)
        .map(|name| name.strip_prefix(b"-").unwrap_or(name))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            AgentError::ShellResolution(format!("no shell name in argv[0] {argv0:?}"))
        })?;

    let path = real_shell_dir.join(OsStr::from_bytes(name));
    let len = path.as_os_str().len();
    if len > MAX_SHELL_PATH {
        return Err(AgentError::ShellResolution(format!(
            "path is {len} bytes, limit is {MAX_SHELL_PATH}"
        )));
    }

    if let Some(agent) = agent_exe {
        let same = match (std::fs::canonicalize(&path), std::fs::canonicalize(agent)) {
            (Ok(shell), Ok(agent)) => shell == agent,
            _ => false,
        };
        if same {
            return Err(AgentError::ShellResolution(format!(
                "{} is the agent itself",
                path.display()
            )));
        }
    }

    Ok(path)
}

/// Everything needed to `execve` the real shell.
///
/// Built before any fork so the child only has to call `execve`.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
}

impl ShellCommand {
    /// Command for `path` with the agent's own argv and environment.
    ///
    /// argv is passed through unchanged so the shell sees the same `argv[0]`
    /// (and login marker). Agent-private variables are removed from the
    /// environment.
    pub fn new(
        path: &Path,
        args: &[OsString],
        vars: impl IntoIterator<Item = (OsString, OsString)>,
    ) -> Result<Self, AgentError> {
        let path = c_string(path.as_os_str())?;

        let mut argv = args.iter().map(|arg| c_string(arg)).collect::<Result<Vec<_>, _>>()?;
        if argv.is_empty() {
            argv.push(path.clone());
        }

        let envp = vars
            .into_iter()
            .filter(|(key, _)| {
                !PRIVATE_VARS.iter().any(|private| key.as_os_str() == OsStr::new(private))
            })
            .filter_map(|(key, value)| {
                let mut entry = key;
                entry.push("=");
                entry.push(value);
                c_string(&entry).ok()
            })
            .collect();

        Ok(Self { path, argv, envp })
    }

    /// Resolve the real shell, falling back to [`FALLBACK_SHELL`].
    pub fn resolve(real_shell_dir: &Path) -> Self {
        let args: Vec<OsString> = std::env::args_os().collect();
        let vars: Vec<(OsString, OsString)> = std::env::vars_os().collect();
        let argv0 = args.first().cloned().unwrap_or_default();
        let agent_exe = std::env::current_exe().ok();

        let path = resolve_real_shell(real_shell_dir, &argv0, agent_exe.as_deref())
            .unwrap_or_else(|e| {
                tracing::warn!("{}; falling back to {}", e, FALLBACK_SHELL);
                PathBuf::from(FALLBACK_SHELL)
            });

        match Self::new(&path, &args, vars.clone()) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("{}; running {} without arguments", e, FALLBACK_SHELL);
                Self::fallback(vars)
            },
        }
    }

    /// `/bin/sh` with no arguments beyond argv[0].
    fn fallback(vars: Vec<(OsString, OsString)>) -> Self {
        let path = PathBuf::from(FALLBACK_SHELL);
        match Self::new(&path, &[], vars) {
            Ok(command) => command,
            Err(_) => unreachable!("fallback shell path has no interior NUL"),
        }
    }

    /// Replace the current process with the shell.
    ///
    /// Returns only on failure.
    pub fn exec(&self) -> AgentError {
        match execve(&self.path, &self.argv, &self.envp) {
            Ok(never) => match never {},
            Err(errno) => AgentError::Exec {
                path: self.path.to_string_lossy().into_owned(),
                reason: errno.desc().to_string(),
            },
        }
    }

    /// Shell path
    pub fn path(&self) -> &CString {
        &self.path
    }

    /// Arguments, starting with argv[0]
    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// Environment as `KEY=VALUE` entries
    pub fn envp(&self) -> &[CString] {
        &self.envp
    }
}

fn c_string(value: &OsStr) -> Result<CString, AgentError> {
    CString::new(value.as_bytes())
        .map_err(|_| AgentError::ShellResolution(format!("{value:?} contains a NUL byte")))
}
