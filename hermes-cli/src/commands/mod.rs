pub mod backup;
pub mod config;
pub mod project;
pub mod server;
pub mod service;

use std::path::Path;

use anyhow::{Context, Result};

use hermes_core::{Config, ConfigError};

/// Effective configuration (defaults applied) for read-only commands.
pub(crate) fn load_effective(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config {}", path.display()))
}

/// Configuration as written on disk, for commands that edit and save it.
/// A missing file starts from an empty configuration.
pub(crate) fn load_for_edit(path: &Path) -> Result<Config> {
    match Config::load_raw(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound { .. }) => Ok(Config::default()),
        Err(err) => Err(err).with_context(|| format!("failed to load config {}", path.display())),
    }
}

pub(crate) fn save(config: &Config, path: &Path) -> Result<()> {
    config
        .save(path)
        .with_context(|| format!("failed to save config {}", path.display()))
}
