//! rclone invocation for a single (source, remote) pair.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use hermes_core::{RemoteTarget, TransferMode};

use crate::error::TransferError;

const RCLONE_BINARY: &str = "rclone";
const DEFAULT_PARALLELISM: u32 = 4;
const WAIT_POLL: Duration = Duration::from_millis(100);

/// One transfer: a local source path pushed to a remote bucket in `mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest<'a> {
    pub source: &'a str,
    pub remote: &'a RemoteTarget,
    pub mode: TransferMode,
}

/// Boundary to the external transfer tool. Implementations block until the
/// transfer has finished.
pub trait TransferClient: Send + Sync {
    fn transfer(&self, request: &TransferRequest<'_>) -> Result<(), TransferError>;
}

/// [`TransferClient`] that shells out to `rclone copy|sync`.
#[derive(Debug, Clone)]
pub struct RcloneClient {
    binary: PathBuf,
    transfers: u32,
    checkers: u32,
    timeout: Option<Duration>,
}

impl Default for RcloneClient {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(RCLONE_BINARY),
            transfers: DEFAULT_PARALLELISM,
            checkers: DEFAULT_PARALLELISM,
            timeout: None,
        }
    }
}

impl RcloneClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific rclone executable instead of resolving `rclone` on `PATH`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Kill the tool and fail the transfer once it has run for `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments passed to rclone for `request`.
    pub fn args(&self, request: &TransferRequest<'_>) -> Vec<String> {
        vec![
            request.mode.as_str().to_string(),
            request.source.to_string(),
            request.remote.destination(),
            format!("--transfers={}", self.transfers),
            format!("--checkers={}", self.checkers),
        ]
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, TransferError> {
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(|source| self.wait_err(source));
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(|source| self.wait_err(source))? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                child.kill().map_err(|source| self.wait_err(source))?;
                let _ = child.wait();
                return Err(TransferError::Timeout { after: timeout });
            }
            thread::sleep(WAIT_POLL);
        }
    }

    fn wait_err(&self, source: std::io::Error) -> TransferError {
        TransferError::Wait {
            binary: self.binary.clone(),
            source,
        }
    }
}

impl TransferClient for RcloneClient {
    fn transfer(&self, request: &TransferRequest<'_>) -> Result<(), TransferError> {
        let args = self.args(request);
        tracing::debug!(binary = %self.binary.display(), args = ?args, "invoking rclone");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TransferError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        // Drain stderr on its own thread so a chatty rclone never blocks on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        let status = self.wait(&mut child);
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        let status = status?;
        if status.success() {
            Ok(())
        } else {
            Err(TransferError::Exit {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}
