//! Shellwatch capture agent binary.
//!
//! # Installation
//!
//! ```bash
//! # Real shells stay in /bin; the agent is installed under the shell's name
//! install -m 0755 shellwatch-agent /usr/local/bin/bash
//! chsh -s /usr/local/bin/bash alice
//! ```
//!
//! Configuration comes from `SHELLWATCH_*` environment variables (see
//! [`shellwatch_agent::config`]). The agent prints nothing unless
//! `SHELLWATCH_LOG` is set.

use shellwatch_agent::{AgentConfig, ShellCommand, runtime};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let config = AgentConfig::from_env();

    if let Some(filter) = &config.log_filter {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(EnvFilter::new(filter))
            .init();
    }

    let shell = ShellCommand::resolve(&config.real_shell_dir);

    let status = match runtime::run(&config, &shell) {
        Ok(status) => status,
        Err(e) => {
            tracing::error!("{}", e);
            runtime::EXEC_FAILURE_STATUS
        },
    };

    std::process::exit(status);
}
