//! Domain types for the Hermes backup configuration.
//!
//! All types are serializable/deserializable via serde + serde_yaml. Optional
//! fields are skipped on save when empty so a saved file reloads identically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a backup project (identity key within a config).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ProjectName(pub String);

impl ProjectName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How a project's sources are transferred to each remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Add or update files at the destination; never delete.
    #[default]
    Copy,
    /// Make the destination an exact mirror of the source.
    Sync,
}

impl TransferMode {
    /// The rclone subcommand implementing this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            TransferMode::Copy => "copy",
            TransferMode::Sync => "sync",
        }
    }

    fn is_default(&self) -> bool {
        *self == TransferMode::Copy
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "copy" => Ok(TransferMode::Copy),
            "sync" => Ok(TransferMode::Sync),
            other => Err(format!("unknown mode '{other}'; expected: copy, sync")),
        }
    }
}

/// Wall clock used to evaluate cron expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Timezone {
    #[default]
    Local,
    Utc,
}

impl Timezone {
    fn is_default(&self) -> bool {
        *self == Timezone::Local
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timezone::Local => write!(f, "local"),
            Timezone::Utc => write!(f, "utc"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A named rclone remote plus the bucket/path on it that receives backups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RemoteTarget {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bucket: String,
}

impl RemoteTarget {
    pub fn new(name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: bucket.into(),
        }
    }

    /// `<remote>:<bucket>` as understood by rclone.
    pub fn destination(&self) -> String {
        format!("{}:{}", self.name, self.bucket)
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.bucket)
    }
}

/// A unit of backup work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Project {
    #[serde(default)]
    pub name: ProjectName,
    /// Transferred in declared order.
    #[serde(default)]
    pub source_paths: Vec<String>,
    /// Empty means "inherit `defaults.cron`".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cron: String,
    #[serde(default, skip_serializing_if = "TransferMode::is_default")]
    pub mode: TransferMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rclone_remotes: Vec<RemoteTarget>,
}

/// Log sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Logging {
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
}

/// Values applied to projects that omit them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Defaults {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cron: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rclone_remote: String,
    #[serde(default, skip_serializing_if = "Timezone::is_default")]
    pub timezone: Timezone,
    /// Upper bound for a single rclone invocation; unset means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_timeout_secs: Option<u64>,
}

/// Root of the Hermes YAML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub projects: Vec<Project>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
