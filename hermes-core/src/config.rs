//! YAML configuration store.
//!
//! # API pattern
//!
//! - [`Config::load`]: read → parse → validate → apply defaults. Used by the
//!   daemon and by one-shot runs; the result is what gets scheduled.
//! - [`Config::load_raw`]: read → parse → validate, defaults left unapplied.
//!   Used by the editing commands so that saving does not bake defaults into
//!   every project.
//! - [`Config::save`]: atomic write (`.tmp` sibling → `chmod 0600` → `rename`).

use std::collections::HashSet;
use std::path::Path;

use crate::error::{io_err, ConfigError};
use crate::types::{Config, Project, ProjectName, RemoteTarget};

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

impl Config {
    /// Load, validate and apply defaults.
    ///
    /// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with
    /// path + line context) if malformed YAML and `ConfigError::Invalid` if an
    /// invariant is violated.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let mut config = Self::load_raw(path)?;
        config.apply_defaults();
        Ok(config)
    }

    /// Load and validate without applying defaults.
    pub fn load_raw(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let config = Self::from_yaml_str(&contents).map_err(|e| match e {
            ConfigError::Yaml(source) => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate a YAML document. Defaults are not applied.
    pub fn from_yaml_str(contents: &str) -> Result<Config, ConfigError> {
        let config: Config = if contents.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    // -----------------------------------------------------------------------
    // 2. Validate + defaults
    // -----------------------------------------------------------------------

    /// Check every invariant a project definition must satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for project in &self.projects {
            validate_project(project)?;
            if !seen.insert(project.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "project {}: duplicate project name",
                    project.name
                )));
            }
        }
        Ok(())
    }

    /// Fill in `cron` and `rclone_remotes` from `defaults` where a project
    /// omits them. A default remote is only synthesized when
    /// `defaults.rclone_remote` is set.
    pub fn apply_defaults(&mut self) {
        let defaults = &self.defaults;
        for project in &mut self.projects {
            if project.cron.trim().is_empty() {
                project.cron = defaults.cron.clone();
            }
            if project.rclone_remotes.is_empty() && !defaults.rclone_remote.is_empty() {
                project.rclone_remotes = vec![RemoteTarget::new(
                    defaults.rclone_remote.clone(),
                    defaults.bucket.clone(),
                )];
            }
        }
    }

    // -----------------------------------------------------------------------
    // 3. Project helpers
    // -----------------------------------------------------------------------

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name.as_str() == name)
    }

    pub fn project_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.name.as_str() == name)
    }

    /// Insert `project`, replacing any project with the same name in place.
    /// Returns `true` when an existing project was replaced.
    pub fn upsert_project(&mut self, project: Project) -> bool {
        match self.project_mut(project.name.as_str()) {
            Some(existing) => {
                *existing = project;
                true
            }
            None => {
                self.projects.push(project);
                false
            }
        }
    }

    /// Remove the named project. Returns the removed project, if any.
    pub fn remove_project(&mut self, name: &ProjectName) -> Option<Project> {
        let index = self.projects.iter().position(|p| &p.name == name)?;
        Some(self.projects.remove(index))
    }

    /// Projects whose names appear in `names`, in config order; all projects
    /// when `names` is empty.
    pub fn select_projects(&self, names: &[String]) -> Vec<Project> {
        if names.is_empty() {
            return self.projects.clone();
        }
        self.projects
            .iter()
            .filter(|p| names.iter().any(|n| n == p.name.as_str()))
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // 4. Save (atomic)
    // -----------------------------------------------------------------------

    /// Atomically save to `path`.
    ///
    /// `.tmp` is always in the same directory as the target so the final
    /// `rename` never crosses filesystems.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.yaml".to_string());
        let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
        set_file_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }
}

fn validate_project(project: &Project) -> Result<(), ConfigError> {
    if project.name.as_str().trim().is_empty() {
        return Err(ConfigError::Invalid("project name is required".to_string()));
    }
    if project.source_paths.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "project {}: source_paths is required",
            project.name
        )));
    }
    if project.source_paths.iter().any(|s| s.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!(
            "project {}: source path must not be empty",
            project.name
        )));
    }
    for remote in &project.rclone_remotes {
        if remote.name.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "project {}: rclone_remote name is required",
                project.name
            )));
        }
        if remote.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "project {}: rclone_remote bucket is required",
                project.name
            )));
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
