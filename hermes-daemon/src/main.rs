//! `hermes-backup`: the scheduled backup server.
//!
//! ```text
//! hermes-backup [--config <path>] [--pid-file <path>]
//! ```
//!
//! SIGINT/SIGTERM stop gracefully (a second one forces exit), SIGHUP reloads
//! the configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use hermes_daemon::paths::{pid_file_path, CONFIG_PATH_ENV, DEFAULT_CONFIG, PID_FILE_ENV};
use hermes_daemon::{start_blocking, DaemonOptions};

#[derive(Parser, Debug)]
#[command(name = "hermes-backup", version, about = "Hermes scheduled backup server", long_about = None)]
struct Args {
    /// Configuration file.
    #[arg(long, env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// PID file location (defaults to hermes-backup.pid next to the binary).
    #[arg(long, env = PID_FILE_ENV)]
    pid_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let options = DaemonOptions {
        pid_file: args.pid_file.unwrap_or_else(pid_file_path),
        config_path: args.config,
    };
    let config_path = options.config_path.display().to_string();
    start_blocking(options).with_context(|| format!("hermes-backup failed (config {config_path})"))
}
