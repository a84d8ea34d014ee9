//! Size-based rotation for the daemon's JSON log file.
//!
//! `hermes.log` → `hermes.log.1` → … → `hermes.log.7`; the oldest copy is
//! dropped once the cap is reached.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::logging::LogFile;

/// Rotate once the live file reaches 50 MiB.
pub const MAX_LOG_BYTES: u64 = 50 * 1024 * 1024;

/// Rotated copies kept beside the live file.
pub const MAX_ROTATED_FILES: usize = 7;

/// How often the rotation task checks the file size.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_LOG_BYTES,
            max_files: MAX_ROTATED_FILES,
        }
    }
}

impl RotationPolicy {
    /// Shift `<path>.N` up by one (dropping the last) and move the live file
    /// to `<path>.1`. The caller recreates the live file.
    ///
    /// Returns `false` if the file is under the threshold or missing.
    pub fn rotate(&self, path: &Path) -> io::Result<bool> {
        let size = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err),
        };
        if size < self.max_bytes || self.max_files == 0 {
            return Ok(false);
        }

        let oldest = numbered_path(path, self.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.max_files).rev() {
            let src = numbered_path(path, n);
            if src.exists() {
                fs::rename(&src, numbered_path(path, n + 1))?;
            }
        }
        fs::rename(path, numbered_path(path, 1))?;
        Ok(true)
    }
}

/// `<base>.<n>`, e.g. `hermes.log.2`.
pub fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("hermes.log");
    base.with_file_name(format!("{name}.{n}"))
}

/// Periodically rotate `log` until shutdown. Failures are logged and retried
/// on the next tick.
pub async fn rotation_task(log: LogFile, policy: RotationPolicy, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let file = log.clone();
                let rotated = tokio::task::spawn_blocking(move || file.rotate(&policy)).await;
                match rotated {
                    Ok(Ok(true)) => tracing::info!(path = %log.path().display(), "log file rotated"),
                    Ok(Ok(false)) => {}
                    Ok(Err(err)) => tracing::warn!(path = %log.path().display(), error = %err, "log rotation failed"),
                    Err(err) => tracing::warn!(error = %err, "log rotation task failed"),
                }
            }
        }
    }
}
