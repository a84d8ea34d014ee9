//! Error types for hermes-transfer.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use hermes_core::{ProjectName, RemoteTarget};

/// Failure of a single rclone invocation.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The transfer tool could not be launched at all.
    #[error("failed to launch {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on or killing the child process failed.
    #[error("I/O error while waiting for {binary}: {source}")]
    Wait {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited unsuccessfully; `stderr` carries its own diagnostics.
    #[error("{}", exit_message(*code, stderr))]
    Exit { code: Option<i32>, stderr: String },

    /// The tool ran longer than the configured per-transfer timeout and was killed.
    #[error("transfer timed out after {}s", after.as_secs())]
    Timeout { after: Duration },
}

fn exit_message(code: Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };
    if stderr.is_empty() {
        status
    } else {
        format!("{status}: {stderr}")
    }
}

/// Failure of a whole project run.
#[derive(Debug, Error)]
pub enum RunError {
    /// The first failing (source, remote) pair; later pairs were not attempted.
    #[error("project {project}: transfer {source_path} -> {remote} failed: {source}")]
    TransferFailed {
        project: ProjectName,
        source_path: String,
        remote: RemoteTarget,
        #[source]
        source: TransferError,
    },
}

impl RunError {
    pub fn project(&self) -> &ProjectName {
        match self {
            RunError::TransferFailed { project, .. } => project,
        }
    }
}
