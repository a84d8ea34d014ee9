//! Hermes backup daemon: cron scheduler, PID file, process supervisor and
//! the `hermes-backup` runtime.

pub mod cron;
mod error;
pub mod log_rotation;
pub mod logging;
pub mod paths;
pub mod pid;
mod runtime;
pub mod scheduler;
pub mod supervisor;

pub use cron::{CronExpr, CronField, CronParseError};
pub use error::DaemonError;
pub use logging::LogFile;
pub use pid::{PidError, PidFileGuard, PidStore};
pub use runtime::{rclone_runner, run, serve, start_blocking, Control, DaemonOptions, SignalListener};
pub use scheduler::{
    Clock, ProjectExecutor, RunHistory, RunOutcome, RunRecord, Schedule, Scheduler, SchedulerError,
    SystemClock,
};
pub use supervisor::{
    DaemonStatus, ProcessControl, ProcessHandle, ProcessSupervisor, StopOutcome, SupervisorError,
    SupervisorState, SystemProcessControl,
};
