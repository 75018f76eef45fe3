//! Scheduler type definitions.
//!
//! This module contains error types, state enums, and command types for the scheduler.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::job::Job;
use crate::core::schedule::ScheduleError;
use crate::core::types::{JobName, RunId};

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler was started outside a tokio runtime.
    #[error("no async runtime available: {0}")]
    RuntimeUnavailable(String),

    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The job already has an invocation in progress.
    #[error("job already running: {0}")]
    JobAlreadyRunning(String),

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),

    /// A job schedule could not be built.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),
}

/// State of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler is stopped.
    Stopped,
    /// Scheduler is running.
    Running,
    /// Scheduler is paused.
    Paused,
}

/// Snapshot of one registered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub name: JobName,
    pub schedule: String,
    pub timezone: String,
    /// Next fire time, if the schedule has one.
    pub next_run: Option<DateTime<Utc>>,
    /// Whether an invocation is in progress.
    pub running: bool,
}

/// Commands that can be sent to the scheduler.
pub(crate) enum SchedulerCommand {
    /// Arm a job, replacing any registration under the same name.
    Register {
        job: Job,
        run_immediately: bool,
        response: oneshot::Sender<()>,
    },
    /// Disarm a job.
    Remove {
        name: JobName,
        response: oneshot::Sender<bool>,
    },
    /// Trigger a job manually.
    Trigger {
        name: JobName,
        response: oneshot::Sender<Result<RunId, SchedulerError>>,
    },
    /// List registered jobs.
    Jobs {
        response: oneshot::Sender<Vec<JobInfo>>,
    },
    /// Pause the scheduler.
    Pause { response: oneshot::Sender<()> },
    /// Resume the scheduler.
    Resume { response: oneshot::Sender<()> },
    /// Shutdown the scheduler.
    Shutdown { response: oneshot::Sender<()> },
}
