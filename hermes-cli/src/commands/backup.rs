//! `hermes backup run`: one-shot foreground backup.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tracing::debug;

use hermes_daemon::rclone_runner;

use super::load_effective;

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// Run backups now, stopping at the first failing project.
    Run {
        /// Comma separated project names (default: all).
        #[arg(long, value_delimiter = ',')]
        projects: Vec<String>,
    },
}

pub fn run(config_path: &Path, cmd: BackupCommand) -> Result<()> {
    match cmd {
        BackupCommand::Run { projects } => run_now(config_path, projects),
    }
}

fn run_now(config_path: &Path, names: Vec<String>) -> Result<()> {
    let config = load_effective(config_path)?;
    let names: Vec<String> = names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    let unknown: Vec<&str> = names
        .iter()
        .filter(|n| config.project(n).is_none())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        bail!("unknown project(s): {}", unknown.join(", "));
    }

    let selected = config.select_projects(&names);
    if selected.is_empty() {
        println!("no projects configured");
        return Ok(());
    }

    let runner = rclone_runner(&config);
    for project in &selected {
        debug!(project = %project.name, sources = project.source_paths.len(), "running backup");
        let report = runner
            .run(project)
            .with_context(|| format!("backup for project '{}' failed", project.name))?;
        println!(
            "{} Backup for project '{}' completed in {:.1?} ({} transfers)",
            "✓".green(),
            report.project,
            report.duration,
            report.transfers,
        );
    }
    Ok(())
}
