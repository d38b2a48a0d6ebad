//! `warcsync`: run a WARC recorder and a replay service, keeping their CDX indexes in sync.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::error;
use warcsync::config::{base_dir, RecorderConfig};
use warcsync::controller::{install_signal_handlers, Controller, StartupOptions};

#[derive(Parser)]
#[command(name = "warcsync")]
#[command(about = "Web recorder controller: keeps recording and done CDX indexes in sync")]
struct Args {
    /// Config file with a `recorder` block
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Remove the current dedup database to start fresh
    #[arg(short, long)]
    flush_dedup: bool,

    /// Tracing filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    warcsync::logging::init(&args.log_level);

    let config = match RecorderConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    if let Err(e) = install_signal_handlers(&shutdown) {
        error!(error = %e, "failed to install signal handlers");
        return ExitCode::FAILURE;
    }

    let options = StartupOptions {
        flush_dedup: args.flush_dedup,
    };
    match Controller::new(config, base_dir(&args.config)).run(&options, shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "controller failed");
            ExitCode::FAILURE
        }
    }
}
