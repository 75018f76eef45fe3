//! Job definition: a named schedule bound to a handler.
//!
//! The scheduler stores jobs as opaque name/schedule/handler triples and
//! never looks at what a handler does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::schedule::Schedule;
use super::types::{JobName, RunId};

/// Errors returned by job handlers.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job's work failed.
    #[error("job failed: {0}")]
    Failed(String),

    /// The job observed cancellation and stopped early.
    #[error("job canceled")]
    Canceled,

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// How an invocation was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Regular tick of the job's schedule.
    Scheduled,
    /// Fired once at registration time.
    Immediate,
    /// Triggered by hand through the scheduler handle.
    Manual,
}

/// Context handed to a handler for one invocation.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Name of the job being run.
    pub job: JobName,
    /// Identifier of this invocation.
    pub run_id: RunId,
    /// What started this invocation.
    pub trigger: Trigger,
    /// When the invocation started.
    pub fired_at: DateTime<Utc>,
    /// Cancelled when the scheduler shuts down.
    pub cancel: CancellationToken,
}

impl JobContext {
    /// Create a context for a new invocation.
    pub fn new(job: JobName, trigger: Trigger, cancel: CancellationToken) -> Self {
        Self {
            job,
            run_id: RunId::new(),
            trigger,
            fired_at: Utc::now(),
            cancel,
        }
    }

    /// Whether the scheduler asked this invocation to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The work performed when a job fires.
///
/// Handlers should return promptly once `ctx.cancel` is cancelled.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Run one invocation of the job.
    async fn run(&self, ctx: JobContext) -> Result<(), JobError>;
}

/// A named recurring job.
#[derive(Clone)]
pub struct Job {
    name: JobName,
    schedule: Schedule,
    handler: Arc<dyn JobHandler>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("schedule", &self.schedule.expression())
            .field("timezone", &self.schedule.timezone())
            .finish()
    }
}

impl Job {
    /// Create a new job.
    pub fn new(name: impl Into<JobName>, schedule: Schedule, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            name: name.into(),
            schedule,
            handler,
        }
    }

    /// Get the job name.
    pub fn name(&self) -> &JobName {
        &self.name
    }

    /// Get the job schedule.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Get the job handler.
    pub fn handler(&self) -> &Arc<dyn JobHandler> {
        &self.handler
    }
}
