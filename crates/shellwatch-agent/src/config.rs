//! Agent configuration.
//!
//! The agent runs in place of a login shell, so its argv belongs to that
//! shell and cannot carry flags. Every setting has a compiled-in default and
//! an environment override; an override that does not parse is ignored.

use std::path::PathBuf;

use shellwatch_crypto::Secret;

/// Shared secret override (32 hex characters)
pub const ENV_SECRET: &str = "SHELLWATCH_SECRET";
/// Collector `host:port` override
pub const ENV_COLLECTOR: &str = "SHELLWATCH_COLLECTOR";
/// Enables capture of shell output
pub const ENV_LOG_OUTPUT: &str = "SHELLWATCH_LOG_OUTPUT";
/// Directory holding the real shells
pub const ENV_REAL_SHELL_DIR: &str = "SHELLWATCH_REAL_SHELL_DIR";
/// Tracing filter for the agent's own diagnostics (silent when unset)
pub const ENV_LOG: &str = "SHELLWATCH_LOG";

/// Agent settings that are never passed on to the real shell
pub const PRIVATE_VARS: &[&str] = &[ENV_SECRET];

/// Default collector endpoint
pub const DEFAULT_COLLECTOR: &str = "127.0.0.1:40119";
/// Default real shell directory
pub const DEFAULT_REAL_SHELL_DIR: &str = "/bin/";
/// Compiled-in shared secret, used when [`ENV_SECRET`] is unset
pub const DEFAULT_SECRET: [u8; 16] = [
    0xBA, 0x36, 0xF7, 0x2A, 0x50, 0x8E, 0x5B, 0xD3, 0x95, 0xF9, 0x34, 0xD3, 0x52, 0x26, 0x46, 0x74,
];

/// Agent settings
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Secret used to encrypt datagrams
    pub secret: Secret,
    /// Collector endpoint (`host:port`)
    pub collector: String,
    /// Capture the OUTPUT direction too
    pub log_output: bool,
    /// Directory the real shell is resolved in
    pub real_shell_dir: PathBuf,
    /// Tracing filter; `None` keeps the agent silent
    pub log_filter: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            secret: Secret::new(DEFAULT_SECRET),
            collector: DEFAULT_COLLECTOR.to_string(),
            log_output: false,
            real_shell_dir: PathBuf::from(DEFAULT_REAL_SHELL_DIR),
            log_filter: None,
        }
    }
}

impl AgentConfig {
    /// Settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secret) = lookup(ENV_SECRET).and_then(|v| Secret::from_hex(&v).ok()) {
            config.secret = secret;
        }
        if let Some(collector) = lookup(ENV_COLLECTOR).filter(|v| is_endpoint(v)) {
            config.collector = collector.trim().to_string();
        }
        if let Some(log_output) = lookup(ENV_LOG_OUTPUT).and_then(|v| parse_bool(&v)) {
            config.log_output = log_output;
        }
        if let Some(dir) = lookup(ENV_REAL_SHELL_DIR).filter(|v| v.starts_with('/')) {
            config.real_shell_dir = PathBuf::from(dir);
        }
        config.log_filter = lookup(ENV_LOG).filter(|v| !v.trim().is_empty());

        config
    }
}

/// `host:port` with a numeric port. Name resolution happens at connect time.
fn is_endpoint(value: &str) -> bool {
    value
        .trim()
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
