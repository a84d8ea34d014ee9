//! `hermes project list|add|delete|update`

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use hermes_core::{Project, ProjectName, RemoteTarget, TransferMode};

use super::{load_effective, load_for_edit, save};
use crate::prompt::{split_csv, Prompter};

/// Manage backup projects.
#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// List configured projects (with defaults applied).
    #[command(alias = "ls")]
    List,

    /// Add or replace a project. Missing values are prompted for.
    Add(AddArgs),

    /// Delete a project by name.
    #[command(alias = "d")]
    Delete {
        name: String,
    },

    /// Interactively update a project.
    #[command(alias = "u")]
    Update {
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Project name.
    #[arg(long)]
    pub name: Option<String>,

    /// Source path; repeatable or comma separated.
    #[arg(long = "source", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Cron expression; empty inherits `defaults.cron`.
    #[arg(long)]
    pub cron: Option<String>,

    /// Transfer mode: copy | sync.
    #[arg(long)]
    pub mode: Option<TransferMode>,

    /// Remote as `<name>:<bucket>`; repeatable.
    #[arg(long = "remote", value_parser = parse_remote)]
    pub remotes: Vec<RemoteTarget>,
}

fn parse_remote(value: &str) -> std::result::Result<RemoteTarget, String> {
    match value.split_once(':') {
        Some((name, bucket)) if !name.trim().is_empty() && !bucket.trim().is_empty() => {
            Ok(RemoteTarget::new(name.trim(), bucket.trim()))
        }
        _ => Err(format!("expected <name>:<bucket>, got '{value}'")),
    }
}

pub fn run(config_path: &Path, cmd: ProjectCommand) -> Result<()> {
    match cmd {
        ProjectCommand::List => list(config_path),
        ProjectCommand::Add(args) => add(config_path, args),
        ProjectCommand::Delete { name } => delete(config_path, &name),
        ProjectCommand::Update { name } => update(config_path, &name),
    }
}

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "project")]
    name: String,
    #[tabled(rename = "cron")]
    cron: String,
    #[tabled(rename = "mode")]
    mode: String,
    #[tabled(rename = "sources")]
    sources: String,
    #[tabled(rename = "remotes")]
    remotes: String,
}

impl From<&Project> for ProjectRow {
    fn from(p: &Project) -> Self {
        Self {
            name: p.name.to_string(),
            cron: p.cron.clone(),
            mode: p.mode.to_string(),
            sources: p.source_paths.join("\n"),
            remotes: p
                .rclone_remotes
                .iter()
                .map(RemoteTarget::destination)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

fn list(config_path: &Path) -> Result<()> {
    let config = load_effective(config_path)?;
    if config.projects.is_empty() {
        println!("no projects configured");
        println!("Run: hermes project add --name <name> --source <path>");
        return Ok(());
    }

    let mut projects: Vec<&Project> = config.projects.iter().collect();
    projects.sort_by(|a, b| a.name.cmp(&b.name));
    let rows: Vec<ProjectRow> = projects.into_iter().map(ProjectRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn add(config_path: &Path, args: AddArgs) -> Result<()> {
    let mut prompter = Prompter::stdio();
    let name = match args.name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => prompter.ask_required("Project name")?,
    };
    let mut source_paths = args.sources;
    source_paths.retain(|s| !s.trim().is_empty());
    if source_paths.is_empty() {
        source_paths = split_csv(&prompter.ask_required("Source paths (comma separated)")?);
    }
    if source_paths.is_empty() {
        bail!("at least one source path is required");
    }
    let rclone_remotes = if args.remotes.is_empty() {
        prompter.ask_remotes()?
    } else {
        args.remotes
    };
    let cron = match args.cron {
        Some(cron) => cron,
        None => prompter.ask("Cron expression (blank for default)")?,
    };

    let project = Project {
        name: ProjectName::from(name),
        source_paths,
        cron,
        mode: args.mode.unwrap_or_default(),
        rclone_remotes,
    };

    let mut config = load_for_edit(config_path)?;
    let replaced = config.upsert_project(project.clone());
    save(&config, config_path)?;

    let verb = if replaced { "replaced" } else { "added" };
    println!("{} Project '{}' {verb}", "✓".green(), project.name);
    print_project(&project);
    Ok(())
}

fn delete(config_path: &Path, name: &str) -> Result<()> {
    let mut config = load_for_edit(config_path)?;
    if config.remove_project(&ProjectName::from(name)).is_none() {
        bail!("project {name} not found");
    }
    save(&config, config_path)?;
    println!("{} Project '{name}' deleted", "✓".green());
    Ok(())
}

fn update(config_path: &Path, name: &str) -> Result<()> {
    let mut config = load_for_edit(config_path)?;
    let Some(current) = config.project(name).cloned() else {
        bail!("project {name} not found");
    };

    let mut prompter = Prompter::stdio();
    let new_name = prompter.ask_default("Project name", current.name.as_str())?;
    let sources = prompter.ask_default("Source paths (comma separated)", &current.source_paths.join(","))?;
    let cron = prompter.ask_default("Cron expression", &current.cron)?;
    let mode = prompter
        .ask_default("Mode (copy/sync)", current.mode.as_str())?
        .parse::<TransferMode>()
        .map_err(anyhow::Error::msg)?;
    let rclone_remotes = prompter.ask_remotes_with_defaults(&current.rclone_remotes)?;

    let updated = Project {
        name: ProjectName::from(new_name),
        source_paths: split_csv(&sources),
        cron,
        mode,
        rclone_remotes,
    };
    if updated.name != current.name && config.project(updated.name.as_str()).is_some() {
        bail!("project {} already exists", updated.name);
    }
    let slot = config
        .project_mut(name)
        .with_context(|| format!("project {name} not found"))?;
    *slot = updated.clone();
    save(&config, config_path)?;

    println!("{} Project '{}' updated", "✓".green(), updated.name);
    print_project(&updated);
    Ok(())
}

fn print_project(p: &Project) {
    println!("  name:    {}", p.name);
    println!("  sources: {}", p.source_paths.join(", "));
    let cron = if p.cron.is_empty() { "(default)" } else { p.cron.as_str() };
    println!("  cron:    {cron}");
    println!("  mode:    {}", p.mode);
    for remote in &p.rclone_remotes {
        println!("  remote:  {remote}");
    }
}
