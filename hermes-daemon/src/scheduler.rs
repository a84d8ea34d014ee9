//! Cron-driven dispatch of project runs.
//!
//! One task owns a min-heap of `(next_fire, entry)` pairs. It sleeps until
//! the nearest fire or a stop request, hands every due entry to tokio's
//! blocking pool, and re-arms it. Runs of different projects overlap freely;
//! runs of the same project never do. A fire that finds the previous run
//! still going is skipped.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Timelike};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

use hermes_core::{Project, ProjectName, Timezone};
use hermes_transfer::{ProjectRunner, RunError, RunReport, TransferClient};

use crate::cron::{CronExpr, CronParseError};

/// Upper bound on a single sleep so wall-clock jumps are noticed.
const MAX_SLEEP: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("project {project}: invalid cron expression: {source}")]
    InvalidCron {
        project: ProjectName,
        #[source]
        source: CronParseError,
    },

    #[error("scheduler is already running")]
    AlreadyStarted,
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Executes one project run to completion. Called on the blocking pool.
pub trait ProjectExecutor: Send + Sync + 'static {
    fn execute(&self, project: &Project) -> Result<RunReport, RunError>;
}

impl<C: TransferClient + 'static> ProjectExecutor for ProjectRunner<C> {
    fn execute(&self, project: &Project) -> Result<RunReport, RunError> {
        self.run(project)
    }
}

/// Wall clock that cron expressions are evaluated against.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    timezone: Timezone,
}

impl SystemClock {
    pub fn new(timezone: Timezone) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.timezone {
            Timezone::Local => chrono::Local::now().naive_local(),
            Timezone::Utc => chrono::Utc::now().naive_utc(),
        }
    }
}

// ---------------------------------------------------------------------------
// Single-flight guard
// ---------------------------------------------------------------------------

/// Per-project "run in progress" flag.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    /// `None` when a run already holds the flag.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases its [`SingleFlight`] when dropped, even if the run panicked.
#[derive(Debug)]
pub struct FlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Run history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Succeeded { transfers: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub project: ProjectName,
    pub started_at: NaiveDateTime,
    pub duration: Duration,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded { .. })
    }
}

/// Last run per project, shared between the dispatch loop and readers.
#[derive(Debug, Clone, Default)]
pub struct RunHistory {
    inner: Arc<Mutex<HashMap<ProjectName, RunRecord>>>,
}

impl RunHistory {
    pub fn record(&self, record: RunRecord) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.insert(record.project.clone(), record);
    }

    pub fn last_run(&self, project: &ProjectName) -> Option<RunRecord> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.get(project).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// One project bound to its parsed cron expression.
#[derive(Debug)]
pub struct ScheduleEntry {
    project: Arc<Project>,
    cron: CronExpr,
    flight: SingleFlight,
}

impl ScheduleEntry {
    pub fn new(project: Project) -> Result<Self, SchedulerError> {
        let cron = CronExpr::parse(&project.cron).map_err(|source| SchedulerError::InvalidCron {
            project: project.name.clone(),
            source,
        })?;
        Ok(Self {
            project: Arc::new(project),
            cron,
            flight: SingleFlight::default(),
        })
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn cron(&self) -> &CronExpr {
        &self.cron
    }
}

/// A validated set of entries. Building it checks every cron expression, so a
/// caller can validate a new configuration before touching a running
/// scheduler.
#[derive(Debug, Default)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn from_projects(projects: &[Project]) -> Result<Self, SchedulerError> {
        let entries = projects
            .iter()
            .cloned()
            .map(ScheduleEntry::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct LoopHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the dispatch loop. `start` arms one trigger per project; `stop`
/// prevents further fires and waits for in-flight runs to finish.
pub struct Scheduler<E> {
    executor: Arc<E>,
    clock: Arc<dyn Clock>,
    history: RunHistory,
    running: Option<LoopHandle>,
}

impl<E: ProjectExecutor> Scheduler<E> {
    pub fn new(executor: E, clock: impl Clock) -> Self {
        Self {
            executor: Arc::new(executor),
            clock: Arc::new(clock),
            history: RunHistory::default(),
            running: None,
        }
    }

    /// Continue an earlier scheduler's run history (used across reloads).
    pub fn with_history(mut self, history: RunHistory) -> Self {
        self.history = history;
        self
    }

    /// Parse every project's cron expression and start dispatching.
    /// Nothing is armed if any expression is invalid.
    pub fn start(&mut self, projects: &[Project]) -> Result<(), SchedulerError> {
        let schedule = Schedule::from_projects(projects)?;
        self.start_schedule(schedule)
    }

    /// Must be called from within a tokio runtime.
    pub fn start_schedule(&mut self, schedule: Schedule) -> Result<(), SchedulerError> {
        if self.running.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let dispatcher = Dispatcher {
            executor: Arc::clone(&self.executor),
            clock: Arc::clone(&self.clock),
            history: self.history.clone(),
        };
        tracing::info!(projects = schedule.len(), "scheduler started");
        let task = tokio::spawn(dispatcher.run_loop(schedule.entries, shutdown_rx));
        self.running = Some(LoopHandle { shutdown, task });
        Ok(())
    }

    /// Halt the trigger loop, then wait for in-flight runs. A no-op when the
    /// scheduler is not running.
    pub async fn stop(&mut self) {
        let Some(handle) = self.running.take() else {
            return;
        };
        let _ = handle.shutdown.send(());
        if let Err(err) = handle.task.await {
            tracing::error!(error = %err, "scheduler loop terminated abnormally");
        }
        tracing::info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

struct Dispatcher<E> {
    executor: Arc<E>,
    clock: Arc<dyn Clock>,
    history: RunHistory,
}

impl<E: ProjectExecutor> Dispatcher<E> {
    async fn run_loop(self, entries: Vec<ScheduleEntry>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut heap = BinaryHeap::new();
        let now = self.clock.now();
        for (index, entry) in entries.iter().enumerate() {
            self.arm(&mut heap, entry, index, &now);
        }

        let mut runs = JoinSet::new();
        loop {
            let wait = match heap.peek() {
                Some(Reverse((next, _))) => (*next - self.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_SLEEP),
                None => MAX_SLEEP,
            };

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!(error = %err, "backup run task failed");
                    }
                    continue;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let now = self.clock.now();
            while let Some(&Reverse((next, index))) = heap.peek() {
                if next > now {
                    break;
                }
                heap.pop();
                let entry = &entries[index];
                self.dispatch(entry, next, &mut runs);
                // Fires missed while the host slept collapse into this one.
                let from = if next < now { now } else { next };
                self.arm(&mut heap, entry, index, &from);
            }
        }

        if !runs.is_empty() {
            tracing::info!(in_flight = runs.len(), "waiting for in-flight backup runs");
        }
        while let Some(joined) = runs.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "backup run task failed");
            }
        }
    }

    fn arm(
        &self,
        heap: &mut BinaryHeap<Reverse<(NaiveDateTime, usize)>>,
        entry: &ScheduleEntry,
        index: usize,
        after: &NaiveDateTime,
    ) {
        match entry.cron.next_after(after) {
            Some(next) => {
                tracing::debug!(project = %entry.project.name, next = %next, "next fire armed");
                heap.push(Reverse((next, index)));
            }
            None => tracing::warn!(
                project = %entry.project.name,
                cron = %entry.cron,
                "cron expression never fires; project will not run",
            ),
        }
    }

    /// Hand one fire to the blocking pool. Returns `false` when it was
    /// skipped because the project's previous run is still executing.
    fn dispatch(&self, entry: &ScheduleEntry, fired_at: NaiveDateTime, runs: &mut JoinSet<()>) -> bool {
        let Some(guard) = entry.flight.try_acquire() else {
            tracing::warn!(
                project = %entry.project.name,
                fired_at = %fired_at,
                "previous run still in progress; skipping fire",
            );
            return false;
        };

        let executor = Arc::clone(&self.executor);
        let clock = Arc::clone(&self.clock);
        let history = self.history.clone();
        let project = Arc::clone(&entry.project);
        runs.spawn_blocking(move || {
            let _guard = guard;
            let started_at = clock.now().with_nanosecond(0).unwrap_or_else(|| clock.now());
            let started = Instant::now();
            tracing::info!(project = %project.name, "backup run started");

            let outcome = match executor.execute(&project) {
                Ok(report) => RunOutcome::Succeeded {
                    transfers: report.transfers,
                },
                Err(err) => RunOutcome::Failed {
                    error: err.to_string(),
                },
            };
            let record = RunRecord {
                project: project.name.clone(),
                started_at,
                duration: started.elapsed(),
                outcome,
            };
            log_record(&record);
            history.record(record);
        });
        true
    }
}

fn log_record(record: &RunRecord) {
    let duration_ms = record.duration.as_millis() as u64;
    match &record.outcome {
        RunOutcome::Succeeded { transfers } => tracing::info!(
            project = %record.project,
            started_at = %record.started_at,
            duration_ms,
            transfers,
            "backup run finished",
        ),
        RunOutcome::Failed { error } => tracing::error!(
            project = %record.project,
            started_at = %record.started_at,
            duration_ms,
            error = %error,
            "backup run failed",
        ),
    }
}
