//! Scheduler engine implementation.
//!
//! The scheduler is responsible for:
//! - Keeping one timer per registered job name
//! - Serializing invocations of the same job (overlapping ticks are dropped)
//! - Manual job triggers
//! - Pause and resume functionality
//! - Graceful shutdown
//! - Event emission
//!
//! Every job timer is its own task on the ambient tokio runtime. The engine
//! task owns the registration table and is driven by [`SchedulerCommand`]s
//! sent through a [`SchedulerHandle`].

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::core::job::{Job, JobContext, Trigger};
use crate::core::types::{JobName, RunId};
use crate::events::{Event, EventBus};

use super::handle::{COMMAND_CHANNEL_BUFFER, SchedulerHandle};
use super::types::{JobInfo, SchedulerCommand, SchedulerError, SchedulerState};

/// Default graceful shutdown timeout.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between checks for running jobs during shutdown.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

type RunningJobs = Arc<RwLock<HashMap<RunId, (JobName, JoinHandle<()>)>>>;

/// Main scheduler for recurring jobs.
pub struct Scheduler {
    /// Jobs registered before start.
    jobs: Vec<Job>,
    /// Event bus for emitting events.
    event_bus: Arc<EventBus>,
    /// Graceful shutdown timeout (default: 30 seconds).
    shutdown_timeout: Duration,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            event_bus: Arc::new(EventBus::new()),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Register a job to be armed when the scheduler starts.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register(&mut self, job: Job) {
        self.jobs.retain(|j| j.name() != job.name());
        self.jobs.push(job);
    }

    /// Jobs registered before start.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Start the scheduler and return a handle for controlling it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> Result<(SchedulerHandle, JoinHandle<()>), SchedulerError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulerError::RuntimeUnavailable(e.to_string()))?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(SchedulerState::Running));

        let handle = SchedulerHandle {
            command_tx,
            state: Arc::clone(&state),
        };

        let runner = Arc::new(Runner {
            event_bus: self.event_bus,
            state,
            running_jobs: Arc::new(RwLock::new(HashMap::new())),
            root: CancellationToken::new(),
        });
        let engine = Engine {
            runner,
            timers: HashMap::new(),
            busy: HashMap::new(),
            shutdown_timeout: self.shutdown_timeout,
        };

        let jobs = self.jobs;
        let scheduler_task = runtime.spawn(async move {
            engine.run(command_rx, jobs).await;
        });

        info!("Scheduler started");
        Ok((handle, scheduler_task))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between the engine, job timers and invocations.
struct Runner {
    event_bus: Arc<EventBus>,
    state: Arc<RwLock<SchedulerState>>,
    running_jobs: RunningJobs,
    /// Parent of every timer and invocation token.
    root: CancellationToken,
}

/// Clears a job's busy flag when the invocation ends, even by panic.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Runner {
    /// Start one invocation of `job` unless one is already in progress.
    async fn launch(
        &self,
        job: &Job,
        busy: &Arc<AtomicBool>,
        trigger: Trigger,
    ) -> Result<RunId, SchedulerError> {
        if busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::JobAlreadyRunning(job.name().to_string()));
        }
        let busy_guard = BusyGuard(Arc::clone(busy));

        let ctx = JobContext::new(job.name().clone(), trigger, self.root.child_token());
        let run_id = ctx.run_id.clone();
        let name = job.name().clone();

        self.event_bus
            .emit(Event::job_started(name.clone(), run_id.clone()))
            .await;

        let handler = Arc::clone(job.handler());
        let event_bus = Arc::clone(&self.event_bus);
        let span = info_span!("job", job = %name, run = %run_id, trigger = ?trigger);
        let completed_id = run_id.clone();

        let handle = tokio::spawn(
            async move {
                let _busy = busy_guard;
                let start = Instant::now();
                debug!("Job invocation started");

                let error = match handler.run(ctx).await {
                    Ok(()) => {
                        debug!(elapsed = ?start.elapsed(), "Job invocation completed");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "Job invocation failed");
                        Some(e.to_string())
                    }
                };

                event_bus
                    .emit(Event::job_completed(
                        name,
                        completed_id,
                        error,
                        start.elapsed(),
                    ))
                    .await;
            }
            .instrument(span),
        );

        let mut running = self.running_jobs.write().await;
        running.retain(|_, (_, handle)| !handle.is_finished());
        running.insert(run_id.clone(), (job.name().clone(), handle));

        Ok(run_id)
    }

    /// Timer loop for one job: wait for each occurrence and fire.
    async fn tick_loop(self: Arc<Self>, job: Job, busy: Arc<AtomicBool>, token: CancellationToken) {
        loop {
            let delay = match job.schedule().delay_after(Utc::now()) {
                Ok(delay) => delay,
                Err(e) => {
                    warn!(error = %e, "Schedule has no further occurrences, disarming job");
                    return;
                }
            };

            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            if *self.state.read().await != SchedulerState::Running {
                debug!("Scheduler not running, dropping tick");
                continue;
            }

            match self.launch(&job, &busy, Trigger::Scheduled).await {
                Ok(_) => {}
                Err(SchedulerError::JobAlreadyRunning(_)) => {
                    debug!("Previous invocation still running, dropping tick");
                    self.event_bus
                        .emit(Event::job_tick_skipped(job.name().clone()))
                        .await;
                }
                Err(e) => warn!(error = %e, "Failed to launch scheduled job"),
            }
        }
    }
}

/// An armed registration.
struct ArmedJob {
    job: Job,
    cancel: CancellationToken,
    timer: JoinHandle<()>,
}

impl ArmedJob {
    fn disarm(self) {
        self.cancel.cancel();
        self.timer.abort();
    }
}

/// Engine task state. Only the engine task touches the registration table.
struct Engine {
    runner: Arc<Runner>,
    timers: HashMap<JobName, ArmedJob>,
    /// Busy flags outlive registrations so a re-registered job still
    /// observes an invocation started under the previous registration.
    busy: HashMap<JobName, Arc<AtomicBool>>,
    shutdown_timeout: Duration,
}

impl Engine {
    /// Main scheduler loop.
    async fn run(mut self, mut command_rx: mpsc::Receiver<SchedulerCommand>, initial: Vec<Job>) {
        for job in initial {
            self.arm(job, false).await;
        }

        while let Some(command) = command_rx.recv().await {
            match command {
                SchedulerCommand::Register {
                    job,
                    run_immediately,
                    response,
                } => {
                    self.arm(job, run_immediately).await;
                    let _ = response.send(());
                }
                SchedulerCommand::Remove { name, response } => {
                    let removed = self.disarm(&name).await;
                    let _ = response.send(removed);
                }
                SchedulerCommand::Trigger { name, response } => {
                    let result = self.trigger(&name).await;
                    let _ = response.send(result);
                }
                SchedulerCommand::Jobs { response } => {
                    let _ = response.send(self.job_infos());
                }
                SchedulerCommand::Pause { response } => {
                    *self.runner.state.write().await = SchedulerState::Paused;
                    info!("Scheduler paused");
                    let _ = response.send(());
                }
                SchedulerCommand::Resume { response } => {
                    *self.runner.state.write().await = SchedulerState::Running;
                    info!("Scheduler resumed");
                    let _ = response.send(());
                }
                SchedulerCommand::Shutdown { response } => {
                    self.stop().await;
                    let _ = response.send(());
                    return;
                }
            }
        }

        // Every handle was dropped.
        debug!("Scheduler command channel closed");
        self.stop().await;
    }

    /// Install a timer for `job`, tearing down any previous one first.
    async fn arm(&mut self, job: Job, run_immediately: bool) {
        let name = job.name().clone();
        if let Some(previous) = self.timers.remove(&name) {
            debug!(job = %name, "Replacing existing registration");
            previous.disarm();
        }

        let busy = Arc::clone(self.busy.entry(name.clone()).or_default());
        let cancel = self.runner.root.child_token();
        let span = info_span!("job_timer", job = %name);
        let timer = tokio::spawn(
            Arc::clone(&self.runner)
                .tick_loop(job.clone(), Arc::clone(&busy), cancel.clone())
                .instrument(span),
        );

        info!(
            job = %name,
            schedule = %job.schedule().expression(),
            timezone = %job.schedule().timezone(),
            run_immediately,
            "Job registered"
        );
        self.runner
            .event_bus
            .emit(Event::job_registered(
                name.clone(),
                job.schedule().expression(),
            ))
            .await;

        if run_immediately {
            if let Err(e) = self.runner.launch(&job, &busy, Trigger::Immediate).await {
                debug!(job = %name, error = %e, "Immediate run not started");
            }
        }

        self.timers.insert(name, ArmedJob { job, cancel, timer });
    }

    /// Remove the timer for `name`. In-progress invocations finish on their own.
    async fn disarm(&mut self, name: &JobName) -> bool {
        let Some(armed) = self.timers.remove(name) else {
            return false;
        };
        armed.disarm();
        info!(job = %name, "Job removed");
        self.runner
            .event_bus
            .emit(Event::job_removed(name.clone()))
            .await;
        true
    }

    async fn trigger(&mut self, name: &JobName) -> Result<RunId, SchedulerError> {
        let job = self
            .timers
            .get(name)
            .map(|armed| armed.job.clone())
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_string()))?;
        let busy = Arc::clone(self.busy.entry(name.clone()).or_default());

        info!(job = %name, "Triggering job manually");
        self.runner.launch(&job, &busy, Trigger::Manual).await
    }

    fn job_infos(&self) -> Vec<JobInfo> {
        let mut infos: Vec<JobInfo> = self
            .timers
            .values()
            .map(|armed| {
                let schedule = armed.job.schedule();
                JobInfo {
                    name: armed.job.name().clone(),
                    schedule: schedule.expression().to_string(),
                    timezone: schedule.timezone().to_string(),
                    next_run: schedule.next().ok(),
                    running: self
                        .busy
                        .get(armed.job.name())
                        .is_some_and(|b| b.load(Ordering::SeqCst)),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Stop every timer, cancel invocations and wait for them to finish.
    async fn stop(&mut self) {
        *self.runner.state.write().await = SchedulerState::Stopped;

        for (_, armed) in self.timers.drain() {
            armed.disarm();
        }
        self.runner.root.cancel();

        self.await_running_jobs().await;
        info!("Scheduler stopped");
    }

    /// Wait for all running jobs to complete with a timeout.
    async fn await_running_jobs(&self) {
        let running_jobs = &self.runner.running_jobs;
        {
            let mut running = running_jobs.write().await;
            running.retain(|_, (_, handle)| !handle.is_finished());
            if running.is_empty() {
                debug!("No running jobs to wait for during shutdown");
                return;
            }
            info!(
                running = running.len(),
                timeout = ?self.shutdown_timeout,
                "Graceful shutdown: waiting for running jobs to complete"
            );
        }

        let start = tokio::time::Instant::now();
        let deadline = start + self.shutdown_timeout;

        loop {
            let mut running = running_jobs.write().await;
            running.retain(|_, (_, handle)| !handle.is_finished());
            let remaining = running.len();
            drop(running);

            if remaining == 0 {
                info!(elapsed = ?start.elapsed(), "All running jobs completed gracefully");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                let running = running_jobs.read().await;
                let names: Vec<&str> = running.values().map(|(name, _)| name.as_str()).collect();
                warn!(
                    timeout = ?self.shutdown_timeout,
                    remaining,
                    jobs = ?names,
                    "Graceful shutdown timeout exceeded with jobs still running"
                );
                break;
            }

            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }
}
