//! Hermes: scheduled rclone backups.
//!
//! # Usage
//!
//! ```text
//! hermes project list|add|delete <name>|update <name>
//! hermes server start|stop|restart|status [--binary <path>] [--pid-file <path>]
//! hermes backup run [--projects a,b]
//! hermes config show|edit
//! hermes service restart [--pid-file <path>]
//! ```
//!
//! Every command accepts `--config <path>` (env `CONFIG_PATH`, default
//! `config.yaml`).

mod commands;
mod prompt;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    backup::BackupCommand, config::ConfigCommand, project::ProjectCommand, server::ServerArgs,
    service::ServiceCommand,
};
use hermes_daemon::paths::{CONFIG_PATH_ENV, DEFAULT_CONFIG};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "hermes",
    version,
    about = "Manage scheduled rclone backups and the backup server",
    long_about = None,
)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, env = CONFIG_PATH_ENV, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage backup projects defined in the config file.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Start, stop or restart the backup server.
    Server(ServerArgs),

    /// Trigger backups manually.
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },

    /// Inspect or edit logging and default settings.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Interact with the running backup server.
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Commands::Project { command } => commands::project::run(&cli.config, command),
        Commands::Server(args) => args.run(&cli.config),
        Commands::Backup { command } => commands::backup::run(&cli.config, command),
        Commands::Config { command } => commands::config::run(&cli.config, command),
        Commands::Service { command } => commands::service::run(command),
    }
}
