//! `hermes service restart`: in-place reload via SIGHUP.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use hermes_daemon::paths::{pid_file_path, sibling_binary, DAEMON_BINARY, PID_FILE_ENV};
use hermes_daemon::{PidStore, ProcessSupervisor};

#[derive(Subcommand, Debug)]
pub enum ServiceCommand {
    /// Ask the running server to reload its configuration (SIGHUP).
    Restart {
        /// PID file of the running server.
        #[arg(long, env = PID_FILE_ENV)]
        pid_file: Option<PathBuf>,
    },
}

pub fn run(cmd: ServiceCommand) -> Result<()> {
    match cmd {
        ServiceCommand::Restart { pid_file } => {
            let store = PidStore::new(pid_file.unwrap_or_else(pid_file_path));
            // Binary and config are unused by a reload.
            let supervisor = ProcessSupervisor::new(sibling_binary(DAEMON_BINARY), PathBuf::new(), store);
            let pid = supervisor.reload().context("failed to signal backup server")?;
            println!("{} Reload requested (pid {pid})", "✓".green());
            Ok(())
        }
    }
}
