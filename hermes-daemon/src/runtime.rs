//! Daemon runtime: PID file ownership, the scheduler, log rotation and the
//! signal-driven control loop (SIGTERM/SIGINT stop, SIGHUP reload).

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};

use hermes_core::Config;
use hermes_transfer::{ProjectRunner, RcloneClient};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::{rotation_task, RotationPolicy};
use crate::logging::{self, LogFile};
use crate::pid::{PidFileGuard, PidStore};
use crate::scheduler::{ProjectExecutor, Schedule, Scheduler, SystemClock};

/// Requests delivered to a running daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Stop firing, drain in-flight runs, exit.
    Shutdown,
    /// Reopen the log file, re-read the configuration and reschedule.
    Reload,
}

#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub config_path: PathBuf,
    pub pid_file: PathBuf,
}

/// Production executor: rclone with the configured per-transfer timeout.
pub fn rclone_runner(config: &Config) -> ProjectRunner<RcloneClient> {
    let timeout = config
        .defaults
        .transfer_timeout_secs
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);
    ProjectRunner::new(RcloneClient::new().with_timeout(timeout))
}

/// Load config, set up logging, and run the daemon on a fresh multi-threaded
/// runtime until a shutdown signal. Config errors are fatal before anything
/// else happens.
pub fn start_blocking(options: DaemonOptions) -> Result<(), DaemonError> {
    let config = Config::load(&options.config_path)?;
    let log_file = logging::init(&config.logging)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(options, config, log_file))
}

/// Install signal handlers, then serve until SIGINT/SIGTERM.
pub async fn run(options: DaemonOptions, config: Config, log_file: Option<LogFile>) -> Result<(), DaemonError> {
    let signals = SignalListener::install()?;
    let (control_tx, control_rx) = mpsc::channel(8);
    let listener = tokio::spawn(signals.forward(control_tx));

    let result = serve(
        &options.config_path,
        config,
        PidStore::new(&options.pid_file),
        log_file,
        rclone_runner,
        control_rx,
    )
    .await;
    listener.abort();
    result
}

/// Daemon main loop.
///
/// Acquires the PID file, starts the scheduler and reacts to [`Control`]
/// messages until `Shutdown` (or the sender closes). `Reload` also reopens
/// the log file so an externally moved log is recreated. The PID file is
/// removed on every return path after acquisition.
pub async fn serve<E, F>(
    config_path: &Path,
    config: Config,
    pid_store: PidStore,
    log_file: Option<LogFile>,
    build_executor: F,
    mut control_rx: mpsc::Receiver<Control>,
) -> Result<(), DaemonError>
where
    E: ProjectExecutor,
    F: Fn(&Config) -> E,
{
    let schedule = Schedule::from_projects(&config.projects)?;
    let _pid_guard = PidFileGuard::acquire(pid_store, std::process::id())?;

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let reopen_target = log_file.clone();
    let rotation = log_file.map(|file| {
        tokio::spawn(rotation_task(file, RotationPolicy::default(), shutdown_tx.subscribe()))
    });

    let mut scheduler = Scheduler::new(build_executor(&config), SystemClock::new(config.defaults.timezone));
    scheduler.start_schedule(schedule)?;
    tracing::info!(
        pid = std::process::id(),
        projects = config.projects.len(),
        config = %config_path.display(),
        "Hermes backup server started",
    );

    while let Some(message) = control_rx.recv().await {
        match message {
            Control::Shutdown => break,
            Control::Reload => {
                if let Some(file) = &reopen_target {
                    if let Err(err) = file.reopen() {
                        tracing::warn!(error = %err, path = %file.path().display(), "log file reopen failed");
                    }
                }
                if let Err(err) = reload(config_path, &mut scheduler, &build_executor).await {
                    tracing::error!(error = %err, "config reload failed; keeping current schedule");
                }
            }
        }
    }

    scheduler.stop().await;
    let _ = shutdown_tx.send(());
    if let Some(handle) = rotation {
        if let Err(err) = handle.await {
            tracing::warn!(error = %err, "log rotation task join failure");
        }
    }
    tracing::info!("Hermes backup server stopped");
    Ok(())
}

/// Swap in a freshly loaded configuration. The running schedule is only
/// torn down once the new one has validated.
async fn reload<E, F>(config_path: &Path, scheduler: &mut Scheduler<E>, build_executor: &F) -> Result<(), DaemonError>
where
    E: ProjectExecutor,
    F: Fn(&Config) -> E,
{
    tracing::info!(config = %config_path.display(), "reloading configuration");
    let config = Config::load(config_path)?;
    let schedule = Schedule::from_projects(&config.projects)?;

    scheduler.stop().await;
    let history = scheduler.history().clone();
    *scheduler = Scheduler::new(build_executor(&config), SystemClock::new(config.defaults.timezone))
        .with_history(history);
    scheduler.start_schedule(schedule)?;
    tracing::info!(projects = config.projects.len(), "configuration reloaded");
    Ok(())
}

/// OS signal streams, registered before the PID file is written.
pub struct SignalListener {
    terminate: Signal,
    interrupt: Signal,
    hangup: Signal,
}

impl SignalListener {
    pub fn install() -> Result<Self, DaemonError> {
        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| DaemonError::Signal(format!("{name}: {e}")))
        };
        Ok(Self {
            terminate: install(SignalKind::terminate(), "SIGTERM")?,
            interrupt: install(SignalKind::interrupt(), "SIGINT")?,
            hangup: install(SignalKind::hangup(), "SIGHUP")?,
        })
    }

    /// Translate signals into [`Control`] messages. The first SIGINT/SIGTERM
    /// requests a graceful shutdown; a second one exits immediately with
    /// status 1, skipping all cleanup. Sends never block this loop, so a
    /// second signal is always seen.
    pub async fn forward(mut self, control_tx: mpsc::Sender<Control>) {
        let mut shutting_down = false;
        loop {
            let name = tokio::select! {
                _ = self.terminate.recv() => "SIGTERM",
                _ = self.interrupt.recv() => "SIGINT",
                _ = self.hangup.recv() => {
                    tracing::info!(signal = "SIGHUP", "reload signal received");
                    match control_tx.try_send(Control::Reload) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!("reload already pending; dropping SIGHUP");
                        }
                        Err(TrySendError::Closed(_)) => return,
                    }
                    continue;
                }
            };

            if shutting_down {
                tracing::warn!(signal = name, "second signal received, forcing exit");
                std::process::exit(1);
            }
            shutting_down = true;
            tracing::info!(signal = name, "shutdown signal received");
            match control_tx.try_send(Control::Shutdown) {
                Ok(()) => {}
                Err(TrySendError::Full(message)) => {
                    let tx = control_tx.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(message).await;
                    });
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }
    }
}
