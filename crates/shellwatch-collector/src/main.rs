//! Shellwatch collector binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port, store files in the current directory
//! shellwatch-collector
//!
//! # Custom store location and a 64 MiB rotation ceiling
//! shellwatch-collector --bind 0.0.0.0:40119 --store-dir /var/lib/shellwatch \
//!     --max-store-bytes 67108864
//! ```

use std::path::PathBuf;

use clap::Parser;
use shellwatch_collector::{
    CollectorConfig, Server, StoreConfig,
    config::{DEFAULT_BIND_ADDRESS, DEFAULT_MAX_STORE_BYTES, DEFAULT_STORE_PREFIX},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Shellwatch datagram collector
#[derive(Parser, Debug)]
#[command(name = "shellwatch-collector")]
#[command(about = "Receives shellwatch capture datagrams and stores them for reconstruction")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "SHELLWATCH_BIND", default_value = DEFAULT_BIND_ADDRESS)]
    bind: String,

    /// Directory that receives store files
    #[arg(short, long, default_value = ".")]
    store_dir: PathBuf,

    /// Store file name prefix
    #[arg(short, long, default_value = DEFAULT_STORE_PREFIX)]
    prefix: String,

    /// Bytes written to one store file before it is rotated
    #[arg(long, default_value_t = DEFAULT_MAX_STORE_BYTES)]
    max_store_bytes: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Shellwatch collector starting");
    tracing::info!("Binding to {}", args.bind);

    let config = CollectorConfig {
        bind_address: args.bind,
        store: StoreConfig {
            dir: args.store_dir,
            prefix: args.prefix,
            max_bytes: args.max_store_bytes,
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Collector listening on {}", server.local_addr()?);

    server.run(shutdown_signal()).await?;

    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
