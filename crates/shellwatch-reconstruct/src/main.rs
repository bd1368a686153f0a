//! Shellwatch reconstruction binary.
//!
//! # Usage
//!
//! ```bash
//! # Rebuild command history from a rotated series into ./sessions
//! SHELLWATCH_SECRET=... shellwatch-reconstruct --output-dir sessions store-*.bin
//!
//! # Print every decoded record instead
//! shellwatch-reconstruct --secret ba36f72a508e5bd395f934d352264674 --dump store.bin
//! ```

use std::{
    fs::File,
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use shellwatch_crypto::Secret;
use shellwatch_proto::{SessionRecord, decode};
use shellwatch_reconstruct::{ReconstructError, Reconstructor, StoreReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Shellwatch session reconstructor
#[derive(Parser, Debug)]
#[command(name = "shellwatch-reconstruct")]
#[command(about = "Rebuilds per-session command history from shellwatch store files")]
#[command(version)]
struct Args {
    /// Store files, in the order they were written
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Shared secret (32 hex characters)
    #[arg(long, env = "SHELLWATCH_SECRET", hide_env_values = true)]
    secret: Secret,

    /// Directory that receives session artifacts
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Print every decoded record instead of writing artifacts
    #[arg(long)]
    dump: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let ok = if args.dump {
        dump(&args.secret, &args.files)
    } else {
        reconstruct(args.secret, &args.files, &args.output_dir)
    };

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn reconstruct(secret: Secret, files: &[PathBuf], output_dir: &Path) -> bool {
    let mut reconstructor = Reconstructor::new(secret);
    let mut ok = true;

    for path in files {
        if let Err(e) = reconstructor.ingest_file(path) {
            tracing::error!(path = %path.display(), "{}", e);
            ok = false;
        }
    }

    let summary = reconstructor.write_sessions(output_dir);
    if !summary.failed.is_empty() {
        ok = false;
    }

    let stats = reconstructor.stats();
    tracing::info!(
        records_read = stats.records_read,
        records_accepted = stats.records_accepted,
        tag_mismatches = stats.tag_mismatches,
        decode_failures = stats.decode_failures,
        failed_files = stats.failed_files,
        sessions = reconstructor.registry().len(),
        artifacts = summary.written.len(),
        lines = summary.written.iter().map(|(_, lines)| lines).sum::<usize>(),
        "Reconstruction finished"
    );

    ok
}

fn dump(secret: &Secret, files: &[PathBuf]) -> bool {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut ok = true;

    for path in files {
        if let Err(e) = dump_file(secret, path, &mut out) {
            tracing::error!(path = %path.display(), "{}", e);
            ok = false;
        }
    }

    ok
}

fn dump_file(secret: &Secret, path: &Path, out: &mut impl Write) -> Result<(), ReconstructError> {
    let file = File::open(path)
        .map_err(|source| ReconstructError::Open { path: path.to_path_buf(), source })?;

    for entry in StoreReader::new(BufReader::new(file)) {
        let entry = entry?;
        let line = match decode(secret, &entry.datagram) {
            Ok(record) => format_record(entry.address, &record),
            Err(e) => format!("{} offset={} skipped: {}", entry.address, entry.offset, e),
        };

        // Closed pipe (e.g. `| head`) ends the dump quietly
        if writeln!(out, "{line}").is_err() {
            return Ok(());
        }
    }

    Ok(())
}

fn format_record(address: std::net::Ipv4Addr, record: &SessionRecord) -> String {
    format!(
        "{} uid={} pid={} {} {} len={} {}",
        record.timestamp,
        record.user_id,
        record.process_id,
        address,
        record.direction,
        record.payload.len(),
        record.payload.escape_ascii()
    )
}
