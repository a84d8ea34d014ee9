//! `hermes server start|stop|restart|status`

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use hermes_daemon::paths::{pid_file_path, sibling_binary, DAEMON_BINARY, PID_FILE_ENV};
use hermes_daemon::{DaemonStatus, PidStore, ProcessSupervisor, StopOutcome};

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Backup server binary (default: hermes-backup next to this executable).
    #[arg(long, global = true)]
    pub binary: Option<PathBuf>,

    /// PID file (default: hermes-backup.pid next to this executable).
    #[arg(long, global = true, env = PID_FILE_ENV)]
    pub pid_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: ServerCommand,
}

#[derive(Subcommand, Debug)]
pub enum ServerCommand {
    /// Start the backup server in the background.
    Start,
    /// Gracefully stop the backup server (forced after 10s).
    Stop,
    /// Stop, then start the backup server.
    Restart,
    /// Report whether the backup server is running.
    Status {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

impl ServerArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let binary = self.binary.unwrap_or_else(|| sibling_binary(DAEMON_BINARY));
        let pid_store = PidStore::new(self.pid_file.unwrap_or_else(pid_file_path));
        let mut supervisor = ProcessSupervisor::new(binary, absolute(config_path)?, pid_store);

        match self.command {
            ServerCommand::Start => {
                let handle = supervisor.start().context("failed to start backup server")?;
                println!("{} Hermes Backup server started (pid {})", "✓".green(), handle.pid);
            }
            ServerCommand::Stop => match supervisor.stop().context("failed to stop backup server")? {
                StopOutcome::AlreadyStopped => println!("backup server is not running"),
                StopOutcome::Graceful { pid } => {
                    println!("{} Hermes Backup server stopped (pid {pid})", "✓".green())
                }
                StopOutcome::Forced { pid } => println!(
                    "{} backup server (pid {pid}) did not exit in time; killed",
                    "!".yellow().bold()
                ),
            },
            ServerCommand::Restart => {
                let handle = supervisor.restart().context("failed to restart backup server")?;
                println!("{} Hermes Backup server restarted (pid {})", "✓".green(), handle.pid);
            }
            ServerCommand::Status { json } => {
                let status = supervisor.status().context("failed to read backup server status")?;
                if json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&status).context("failed to render status JSON")?
                    );
                } else {
                    print_status(status, supervisor.pid_store().path());
                }
            }
        }
        Ok(())
    }
}

fn print_status(status: DaemonStatus, pid_file: &Path) {
    match status {
        DaemonStatus::Stopped => println!("{} stopped", "■".bright_black().bold()),
        DaemonStatus::Running(pid) => println!("{} running (pid {pid})", "■".green().bold()),
        DaemonStatus::Stale(pid) => println!(
            "{} stopped (stale pid {pid} in {})",
            "■".yellow().bold(),
            pid_file.display()
        ),
    }
}

/// The daemon is spawned with our working directory, but an absolute path
/// keeps its logs and `ps` output unambiguous.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("could not determine working directory")?;
    Ok(cwd.join(path))
}
