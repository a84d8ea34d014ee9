//! Single-process liveness record.
//!
//! The PID file holds the daemon's decimal process id. The daemon is the
//! writer of record: it acquires the file right after installing its signal
//! handlers and removes it on its own clean-shutdown path. Supervisors only
//! read it.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PidError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file exists but does not hold a decimal pid.
    #[error("pid file {path} is corrupt: {content:?}")]
    Corrupt { path: PathBuf, content: String },

    /// Another live process already holds the pid file.
    #[error("daemon already running with pid {pid}")]
    AlreadyRunning { pid: u32 },

    #[error("failed to probe process {pid}: {source}")]
    Probe { pid: u32, source: Errno },
}

fn io_err(path: &Path, source: io::Error) -> PidError {
    PidError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads, writes and removes the PID file at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidStore {
    path: PathBuf,
}

impl PidStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no daemon is recorded (file absent or empty),
    /// `Err(Corrupt)` when the content is not a pid.
    pub fn read(&self) -> Result<Option<u32>, PidError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&self.path, err)),
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match trimmed.parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(PidError::Corrupt {
                path: self.path.clone(),
                content: trimmed.to_string(),
            }),
        }
    }

    /// Unconditionally record `pid`, replacing any previous content.
    pub fn write(&self, pid: u32) -> Result<(), PidError> {
        self.ensure_parent()?;
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        self.write_with(options, pid)
    }

    pub fn remove(&self) -> Result<(), PidError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&self.path, err)),
        }
    }

    /// Atomically claim the PID file for `pid` using the system liveness probe.
    pub fn acquire(&self, pid: u32) -> Result<(), PidError> {
        self.acquire_with(pid, process_alive)
    }

    /// Exclusive create-only write of `pid`.
    ///
    /// If the file already exists and names a live process other than `pid`,
    /// fails with `AlreadyRunning`. A stale or empty file is removed and the
    /// create retried once; losing that retry to a concurrent starter also
    /// reports `AlreadyRunning`.
    pub fn acquire_with(
        &self,
        pid: u32,
        probe: impl Fn(u32) -> Result<bool, PidError>,
    ) -> Result<(), PidError> {
        self.ensure_parent()?;
        for attempt in 0..2 {
            match self.create_new(pid) {
                Ok(()) => {
                    tracing::info!(pid, file = %self.path.display(), "pid file acquired");
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(io_err(&self.path, err)),
            }

            match self.read()? {
                Some(existing) if existing != pid && probe(existing)? => {
                    return Err(PidError::AlreadyRunning { pid: existing });
                }
                Some(existing) if attempt == 0 => {
                    tracing::warn!(pid = existing, file = %self.path.display(), "removing stale pid file");
                }
                None if attempt == 0 => {}
                Some(existing) => return Err(PidError::AlreadyRunning { pid: existing }),
                None => {
                    return Err(io_err(
                        &self.path,
                        io::Error::new(io::ErrorKind::AlreadyExists, "pid file recreated concurrently"),
                    ))
                }
            }
            self.remove()?;
        }
        Err(io_err(
            &self.path,
            io::Error::new(io::ErrorKind::AlreadyExists, "pid file recreated concurrently"),
        ))
    }

    fn create_new(&self, pid: u32) -> io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        writeln!(file, "{pid}")?;
        file.sync_all()
    }

    fn write_with(&self, mut options: OpenOptions, pid: u32) -> Result<(), PidError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(|e| io_err(&self.path, e))?;
        writeln!(file, "{pid}").map_err(|e| io_err(&self.path, e))?;
        file.sync_all().map_err(|e| io_err(&self.path, e))
    }

    fn ensure_parent(&self) -> Result<(), PidError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                fs::create_dir_all(parent).map_err(|e| io_err(parent, e))
            }
            _ => Ok(()),
        }
    }
}

/// Removes the PID file when dropped. Held by the daemon for its lifetime;
/// a forced exit skips the drop and leaves a stale file behind, which the
/// next start treats as "not running".
#[derive(Debug)]
pub struct PidFileGuard {
    store: PidStore,
}

impl PidFileGuard {
    pub fn acquire(store: PidStore, pid: u32) -> Result<Self, PidError> {
        store.acquire(pid)?;
        Ok(Self { store })
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        match self.store.remove() {
            Ok(()) => tracing::info!(file = %self.store.path().display(), "pid file removed"),
            Err(err) => tracing::error!(error = %err, "failed to remove pid file"),
        }
    }
}

/// Zero-signal liveness probe. A process owned by another user still counts
/// as alive.
pub fn process_alive(pid: u32) -> Result<bool, PidError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    if raw <= 0 {
        return Ok(false);
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => Ok(true),
        Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(PidError::Probe { pid, source }),
    }
}
