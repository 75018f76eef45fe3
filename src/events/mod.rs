//! Lifecycle events and event handling.
//!
//! The scheduler and the update orchestrator report what they do through an
//! [`EventBus`]. Handlers registered on the bus observe job invocations,
//! dropped ticks, handler failures and update runs.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::types::{JobName, ResourceId, RunId};
use crate::update::{ResourceStatus, ResourceType};

/// Lifecycle events emitted by the scheduler and the orchestrator.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job was armed under its name.
    JobRegistered {
        job: JobName,
        schedule: String,
        timestamp: Instant,
    },

    /// A job's timer was torn down.
    JobRemoved { job: JobName, timestamp: Instant },

    /// A job invocation started.
    JobStarted {
        job: JobName,
        run_id: RunId,
        timestamp: Instant,
    },

    /// A job invocation finished.
    JobCompleted {
        job: JobName,
        run_id: RunId,
        success: bool,
        error: Option<String>,
        duration: Duration,
        timestamp: Instant,
    },

    /// A tick was dropped because the previous invocation was still running.
    JobTickSkipped { job: JobName, timestamp: Instant },

    /// An update run started.
    UpdateRunStarted {
        run_id: RunId,
        targets: usize,
        dry_run: bool,
        timestamp: Instant,
    },

    /// A resource reached a terminal status within an update run.
    ResourceProcessed {
        run_id: RunId,
        resource_id: ResourceId,
        resource_type: ResourceType,
        status: ResourceStatus,
        timestamp: Instant,
    },

    /// An update run finished.
    UpdateRunCompleted {
        run_id: RunId,
        checked: usize,
        updated: usize,
        skipped: usize,
        failed: usize,
        duration: Duration,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::JobRegistered { timestamp, .. }
            | Event::JobRemoved { timestamp, .. }
            | Event::JobStarted { timestamp, .. }
            | Event::JobCompleted { timestamp, .. }
            | Event::JobTickSkipped { timestamp, .. }
            | Event::UpdateRunStarted { timestamp, .. }
            | Event::ResourceProcessed { timestamp, .. }
            | Event::UpdateRunCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Name of the job this event concerns, if any.
    pub fn job(&self) -> Option<&JobName> {
        match self {
            Event::JobRegistered { job, .. }
            | Event::JobRemoved { job, .. }
            | Event::JobStarted { job, .. }
            | Event::JobCompleted { job, .. }
            | Event::JobTickSkipped { job, .. } => Some(job),
            _ => None,
        }
    }

    /// Create a JobRegistered event.
    pub fn job_registered(job: JobName, schedule: impl Into<String>) -> Self {
        Event::JobRegistered {
            job,
            schedule: schedule.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a JobRemoved event.
    pub fn job_removed(job: JobName) -> Self {
        Event::JobRemoved {
            job,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobStarted event.
    pub fn job_started(job: JobName, run_id: RunId) -> Self {
        Event::JobStarted {
            job,
            run_id,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobCompleted event.
    pub fn job_completed(
        job: JobName,
        run_id: RunId,
        error: Option<String>,
        duration: Duration,
    ) -> Self {
        Event::JobCompleted {
            job,
            run_id,
            success: error.is_none(),
            error,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobTickSkipped event.
    pub fn job_tick_skipped(job: JobName) -> Self {
        Event::JobTickSkipped {
            job,
            timestamp: Instant::now(),
        }
    }

    /// Create an UpdateRunStarted event.
    pub fn update_run_started(run_id: RunId, targets: usize, dry_run: bool) -> Self {
        Event::UpdateRunStarted {
            run_id,
            targets,
            dry_run,
            timestamp: Instant::now(),
        }
    }

    /// Create a ResourceProcessed event.
    pub fn resource_processed(
        run_id: RunId,
        resource_id: ResourceId,
        resource_type: ResourceType,
        status: ResourceStatus,
    ) -> Self {
        Event::ResourceProcessed {
            run_id,
            resource_id,
            resource_type,
            status,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
