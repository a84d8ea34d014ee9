//! Subscriber setup for the daemon: human-readable lines on stdout plus JSON
//! lines in the configured log file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use hermes_core::Logging;

use crate::error::{io_err, DaemonError};
use crate::log_rotation::RotationPolicy;

/// Shared handle to the open log file. Cloning shares the descriptor, so a
/// rotation performed through any clone is seen by the subscriber.
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl LogFile {
    /// Open `path` for appending, creating missing parent directories.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Swap the descriptor for a fresh open of `path`.
    pub fn reopen(&self) -> io::Result<()> {
        let mut guard = self.lock();
        *guard = open_append(&self.path)?;
        Ok(())
    }

    /// Rotate under the writer lock so no line lands in the renamed file
    /// after the switch.
    pub fn rotate(&self, policy: &RotationPolicy) -> io::Result<bool> {
        let mut guard = self.lock();
        guard.flush()?;
        if !policy.rotate(&self.path)? {
            return Ok(false);
        }
        *guard = open_append(&self.path)?;
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writer handed out per event; holds the file lock for one line.
pub struct LogFileWriter<'a> {
    guard: MutexGuard<'a, File>,
}

impl Write for LogFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter { guard: self.lock() }
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` when the config asks for it.
pub fn env_filter(config: &Logging) -> EnvFilter {
    let level = if config.debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Returns the file handle when a log path is
/// configured so the runtime can rotate it.
pub fn init(config: &Logging) -> Result<Option<LogFile>, DaemonError> {
    let log_file = if config.path.trim().is_empty() {
        None
    } else {
        Some(LogFile::open(&config.path).map_err(|e| io_err(&config.path, e))?)
    };

    let file_layer = log_file.clone().map(|file| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_current_span(false)
            .with_writer(file)
    });

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| DaemonError::Logging(e.to_string()))?;

    Ok(log_file)
}
