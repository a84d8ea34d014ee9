//! Project execution: every remote × source pair, fail-fast.

use std::time::{Duration, Instant};

use hermes_core::{Project, ProjectName};

use crate::client::{TransferClient, TransferRequest};
use crate::error::RunError;

/// Outcome of a successful project run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub project: ProjectName,
    /// Number of (source, remote) transfers performed.
    pub transfers: usize,
    pub duration: Duration,
}

/// Runs whole projects against a [`TransferClient`].
///
/// Remotes are visited in declared order and, within each remote, source
/// paths in declared order. The first failing transfer aborts the run;
/// transfers that already completed are left in place.
#[derive(Debug, Clone)]
pub struct ProjectRunner<C> {
    client: C,
}

impl<C: TransferClient> ProjectRunner<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn run(&self, project: &Project) -> Result<RunReport, RunError> {
        let started = Instant::now();
        if project.rclone_remotes.is_empty() {
            tracing::warn!(project = %project.name, "project has no remotes; nothing to transfer");
        }

        let mut transfers = 0usize;
        for remote in &project.rclone_remotes {
            for source in &project.source_paths {
                let request = TransferRequest {
                    source,
                    remote,
                    mode: project.mode,
                };
                tracing::info!(
                    project = %project.name,
                    source = %source,
                    remote = %remote,
                    mode = %project.mode,
                    "transfer started",
                );
                self.client
                    .transfer(&request)
                    .map_err(|source_err| RunError::TransferFailed {
                        project: project.name.clone(),
                        source_path: source.clone(),
                        remote: remote.clone(),
                        source: source_err,
                    })?;
                transfers += 1;
            }
        }

        Ok(RunReport {
            project: project.name.clone(),
            transfers,
            duration: started.elapsed(),
        })
    }
}
