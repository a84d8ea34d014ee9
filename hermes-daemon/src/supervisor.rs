//! Out-of-process lifecycle control for the backup daemon.
//!
//! The supervisor never talks to the daemon directly. It reads the PID file
//! the daemon maintains and sends signals: SIGTERM to stop, SIGKILL once the
//! grace period runs out, SIGHUP to reload.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use thiserror::Error;

use crate::paths::{STOP_GRACE, STOP_POLL};
use crate::pid::{process_alive, PidError, PidStore};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("backup binary not found: {0}")]
    BinaryNotFound(PathBuf),

    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("backup server already running (pid={0})")]
    AlreadyRunning(u32),

    #[error("pid file {path} is corrupt: {content:?}")]
    PidFileCorrupt { path: PathBuf, content: String },

    #[error("backup server (pid={0}) did not exit in time")]
    StopTimeout(u32),

    #[error("backup server is not running")]
    NotRunning,

    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: Signal,
        #[source]
        source: Errno,
    },

    #[error(transparent)]
    Pid(PidError),
}

impl From<PidError> for SupervisorError {
    fn from(err: PidError) -> Self {
        match err {
            PidError::Corrupt { path, content } => SupervisorError::PidFileCorrupt { path, content },
            PidError::AlreadyRunning { pid } => SupervisorError::AlreadyRunning(pid),
            other => SupervisorError::Pid(other),
        }
    }
}

/// OS operations the supervisor depends on.
pub trait ProcessControl: Send + Sync {
    /// Zero-signal liveness probe.
    fn probe(&self, pid: u32) -> Result<bool, SupervisorError>;
    fn terminate(&self, pid: u32) -> Result<(), SupervisorError>;
    fn kill(&self, pid: u32) -> Result<(), SupervisorError>;
    fn hangup(&self, pid: u32) -> Result<(), SupervisorError>;
    /// Launch `<binary> --config <config> --pid-file <pid_file>` detached;
    /// returns the child pid.
    fn spawn(&self, binary: &Path, config: &Path, pid_file: &Path) -> Result<u32, SupervisorError>;
}

/// [`ProcessControl`] backed by `kill(2)` and `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessControl;

impl SystemProcessControl {
    fn signal(pid: u32, signal: Signal) -> Result<(), SupervisorError> {
        let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
            pid,
            signal,
            source: Errno::EINVAL,
        })?;
        match kill(Pid::from_raw(raw), signal) {
            Ok(()) => Ok(()),
            // Already gone counts as delivered.
            Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(SupervisorError::Signal { pid, signal, source }),
        }
    }
}

impl ProcessControl for SystemProcessControl {
    fn probe(&self, pid: u32) -> Result<bool, SupervisorError> {
        Ok(process_alive(pid)?)
    }

    fn terminate(&self, pid: u32) -> Result<(), SupervisorError> {
        Self::signal(pid, Signal::SIGTERM)
    }

    fn kill(&self, pid: u32) -> Result<(), SupervisorError> {
        Self::signal(pid, Signal::SIGKILL)
    }

    fn hangup(&self, pid: u32) -> Result<(), SupervisorError> {
        Self::signal(pid, Signal::SIGHUP)
    }

    fn spawn(&self, binary: &Path, config: &Path, pid_file: &Path) -> Result<u32, SupervisorError> {
        use std::os::unix::process::CommandExt;

        let child = Command::new(binary)
            .arg("--config")
            .arg(config)
            .arg("--pid-file")
            .arg(pid_file)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            // Own process group: a Ctrl-C aimed at the CLI must not reach the daemon.
            .process_group(0)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                binary: binary.to_path_buf(),
                source,
            })?;
        Ok(child.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// The daemon as launched by [`ProcessSupervisor::start`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessHandle {
    pub pid: u32,
    pub binary: PathBuf,
    pub config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    AlreadyStopped,
    Graceful { pid: u32 },
    /// The grace period elapsed and the daemon was killed.
    Forced { pid: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "pid", rename_all = "lowercase")]
pub enum DaemonStatus {
    Stopped,
    Running(u32),
    /// PID file names a process that no longer exists.
    Stale(u32),
}

/// Starts, stops and restarts the daemon.
pub struct ProcessSupervisor<P = SystemProcessControl> {
    binary: PathBuf,
    config: PathBuf,
    pid_store: PidStore,
    control: P,
    grace: Duration,
    poll: Duration,
    state: SupervisorState,
}

impl ProcessSupervisor<SystemProcessControl> {
    pub fn new(binary: impl Into<PathBuf>, config: impl Into<PathBuf>, pid_store: PidStore) -> Self {
        Self::with_control(binary, config, pid_store, SystemProcessControl)
    }
}

impl<P: ProcessControl> ProcessSupervisor<P> {
    pub fn with_control(
        binary: impl Into<PathBuf>,
        config: impl Into<PathBuf>,
        pid_store: PidStore,
        control: P,
    ) -> Self {
        Self {
            binary: binary.into(),
            config: config.into(),
            pid_store,
            control,
            grace: STOP_GRACE,
            poll: STOP_POLL,
            state: SupervisorState::Stopped,
        }
    }

    /// Override the stop grace deadline and PID file poll interval.
    pub fn with_timing(mut self, grace: Duration, poll: Duration) -> Self {
        self.grace = grace;
        self.poll = poll;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn pid_store(&self) -> &PidStore {
        &self.pid_store
    }

    pub fn control(&self) -> &P {
        &self.control
    }

    pub fn status(&self) -> Result<DaemonStatus, SupervisorError> {
        match self.pid_store.read()? {
            None => Ok(DaemonStatus::Stopped),
            Some(pid) if self.control.probe(pid)? => Ok(DaemonStatus::Running(pid)),
            Some(pid) => Ok(DaemonStatus::Stale(pid)),
        }
    }

    /// Launch the daemon unless a live one is already recorded. The daemon
    /// is told which PID file to own and writes it itself; nothing is
    /// written here.
    pub fn start(&mut self) -> Result<ProcessHandle, SupervisorError> {
        if !self.binary.is_file() {
            return Err(SupervisorError::BinaryNotFound(self.binary.clone()));
        }
        if !self.config.exists() {
            return Err(SupervisorError::ConfigNotFound(self.config.clone()));
        }
        match self.status()? {
            DaemonStatus::Running(pid) => {
                self.state = SupervisorState::Running;
                return Err(SupervisorError::AlreadyRunning(pid));
            }
            DaemonStatus::Stale(pid) => {
                tracing::warn!(pid, file = %self.pid_store.path().display(), "ignoring stale pid file");
            }
            DaemonStatus::Stopped => {}
        }

        self.state = SupervisorState::Starting;
        let pid = match self.control.spawn(&self.binary, &self.config, self.pid_store.path()) {
            Ok(pid) => pid,
            Err(err) => {
                self.state = SupervisorState::Stopped;
                return Err(err);
            }
        };
        self.state = SupervisorState::Running;
        tracing::info!(pid, binary = %self.binary.display(), config = %self.config.display(), "backup server started");
        Ok(ProcessHandle {
            pid,
            binary: self.binary.clone(),
            config: self.config.clone(),
        })
    }

    /// Graceful stop; kills the daemon if it outlives the grace period.
    pub fn stop(&mut self) -> Result<StopOutcome, SupervisorError> {
        match self.stop_inner()? {
            Ok(outcome) => Ok(outcome),
            Err(pid) => {
                tracing::warn!(pid, grace_ms = self.grace.as_millis() as u64, "backup server did not exit in time; killing");
                self.control.kill(pid)?;
                self.pid_store.remove()?;
                self.state = SupervisorState::Stopped;
                Ok(StopOutcome::Forced { pid })
            }
        }
    }

    /// Stop then start. A grace timeout fails with `StopTimeout` and leaves
    /// the old daemon alone; no new instance is spawned.
    pub fn restart(&mut self) -> Result<ProcessHandle, SupervisorError> {
        match self.stop_inner()? {
            Ok(outcome) => tracing::debug!(?outcome, "restart: stop phase complete"),
            Err(pid) => {
                self.state = SupervisorState::Running;
                return Err(SupervisorError::StopTimeout(pid));
            }
        }
        self.start()
    }

    /// Ask the running daemon to reload its configuration.
    pub fn reload(&self) -> Result<u32, SupervisorError> {
        match self.status()? {
            DaemonStatus::Running(pid) => {
                self.control.hangup(pid)?;
                tracing::info!(pid, "reload requested");
                Ok(pid)
            }
            DaemonStatus::Stopped | DaemonStatus::Stale(_) => Err(SupervisorError::NotRunning),
        }
    }

    /// `Ok(Err(pid))` means the grace period elapsed with `pid` still alive.
    fn stop_inner(&mut self) -> Result<Result<StopOutcome, u32>, SupervisorError> {
        let pid = match self.status()? {
            DaemonStatus::Stopped => {
                self.state = SupervisorState::Stopped;
                return Ok(Ok(StopOutcome::AlreadyStopped));
            }
            DaemonStatus::Stale(pid) => {
                tracing::warn!(pid, "removing stale pid file");
                self.pid_store.remove()?;
                self.state = SupervisorState::Stopped;
                return Ok(Ok(StopOutcome::AlreadyStopped));
            }
            DaemonStatus::Running(pid) => pid,
        };

        self.state = SupervisorState::Stopping;
        tracing::info!(pid, "stopping backup server");
        self.control.terminate(pid)?;

        let deadline = Instant::now() + self.grace;
        loop {
            if self.pid_store.read()?.is_none() {
                break;
            }
            if !self.control.probe(pid)? {
                // Exited without its own cleanup.
                self.pid_store.remove()?;
                break;
            }
            if Instant::now() >= deadline {
                return Ok(Err(pid));
            }
            thread::sleep(self.poll);
        }

        self.state = SupervisorState::Stopped;
        tracing::info!(pid, "backup server stopped");
        Ok(Ok(StopOutcome::Graceful { pid }))
    }
}
