//! `hermes config show|edit`: logging and default settings.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::Serialize;

use hermes_core::{Defaults, Logging, Timezone};

use super::{load_for_edit, save};
use crate::prompt::Prompter;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the logging and defaults sections.
    Show,
    /// Interactively update logging and defaults.
    Edit,
}

#[derive(Serialize)]
struct Overview<'a> {
    logging: &'a Logging,
    defaults: &'a Defaults,
}

pub fn run(config_path: &Path, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(config_path),
        ConfigCommand::Edit => edit(config_path),
    }
}

fn show(config_path: &Path) -> Result<()> {
    let config = hermes_core::Config::load_raw(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let overview = Overview {
        logging: &config.logging,
        defaults: &config.defaults,
    };
    let yaml = serde_yaml::to_string(&overview).context("failed to render config")?;
    print!("{yaml}");
    Ok(())
}

fn edit(config_path: &Path) -> Result<()> {
    let mut config = load_for_edit(config_path)?;
    let mut prompter = Prompter::stdio();

    config.logging.path = prompter.ask_default("Logging path", &config.logging.path)?;
    config.logging.debug = prompter
        .ask_default("Logging debug (true/false)", &config.logging.debug.to_string())?
        .eq_ignore_ascii_case("true");

    let defaults = &mut config.defaults;
    defaults.rclone_remote = prompter.ask_default("Defaults rclone_remote", &defaults.rclone_remote)?;
    defaults.bucket = prompter.ask_default("Defaults bucket", &defaults.bucket)?;
    defaults.cron = prompter.ask_default("Defaults cron", &defaults.cron)?;
    defaults.timezone = match prompter
        .ask_default("Defaults timezone (local/utc)", &defaults.timezone.to_string())?
        .to_ascii_lowercase()
        .as_str()
    {
        "utc" => Timezone::Utc,
        _ => Timezone::Local,
    };

    save(&config, config_path)?;
    println!("{} Config saved to {}", "✓".green(), config_path.display());
    Ok(())
}
