//! Scheduler handle for controlling the scheduler.
//!
//! This module provides the `SchedulerHandle` type that allows external control
//! of the scheduler through commands like register, trigger, pause, resume, and
//! shutdown, and the [`JobRegistry`] capability job adapters are written against.

use async_trait::async_trait;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};

use crate::core::job::Job;
use crate::core::types::{JobName, RunId};

use super::types::{JobInfo, SchedulerCommand, SchedulerError, SchedulerState};

/// Buffer size for the command channel between SchedulerHandle and Scheduler.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Registration capability used by job adapters.
///
/// Implemented by [`SchedulerHandle`]; tests substitute a recording double.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Install `job` under its name, replacing any existing registration.
    async fn register_job(&self, job: Job, run_immediately: bool) -> Result<(), SchedulerError>;

    /// Remove the job registered under `name`. No-op if absent.
    async fn remove_job(&self, name: &JobName) -> Result<(), SchedulerError>;
}

/// Handle for controlling the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) command_tx: mpsc::Sender<SchedulerCommand>,
    pub(crate) state: Arc<RwLock<SchedulerState>>,
}

impl SchedulerHandle {
    /// Helper to send a command that returns a result and wait for response.
    async fn send_result_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<Result<T, SchedulerError>>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
    {
        self.send_command(build_command, operation).await?
    }

    /// Helper to send a command and wait for its response value.
    async fn send_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError>
    where
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                SchedulerError::ChannelError(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::ChannelError(format!("failed to receive {} response", operation))
        })
    }

    /// Register a job, replacing any registration under the same name.
    ///
    /// With `run_immediately`, the handler also fires once right away.
    pub async fn register_job(&self, job: Job, run_immediately: bool) -> Result<(), SchedulerError> {
        self.send_command(
            |response| SchedulerCommand::Register {
                job,
                run_immediately,
                response,
            },
            "register",
        )
        .await
    }

    /// Remove a job. Returns whether it was registered.
    pub async fn remove_job(&self, name: impl Into<JobName>) -> Result<bool, SchedulerError> {
        let name = name.into();
        self.send_command(|response| SchedulerCommand::Remove { name, response }, "remove")
            .await
    }

    /// Trigger a job manually.
    ///
    /// Fails with [`SchedulerError::JobAlreadyRunning`] if an invocation is in progress.
    pub async fn trigger(&self, name: impl Into<JobName>) -> Result<RunId, SchedulerError> {
        let name = name.into();
        self.send_result_command(
            |response| SchedulerCommand::Trigger { name, response },
            "trigger",
        )
        .await
    }

    /// List registered jobs, sorted by name.
    pub async fn jobs(&self) -> Result<Vec<JobInfo>, SchedulerError> {
        self.send_command(|response| SchedulerCommand::Jobs { response }, "jobs")
            .await
    }

    /// Pause the scheduler.
    ///
    /// While paused, ticks are dropped, but manual triggers still work.
    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.send_command(|response| SchedulerCommand::Pause { response }, "pause")
            .await
    }

    /// Resume the scheduler after being paused.
    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.send_command(|response| SchedulerCommand::Resume { response }, "resume")
            .await
    }

    /// Shutdown the scheduler.
    ///
    /// Stops every timer, cancels running invocations and waits for them
    /// up to the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.send_command(
            |response| SchedulerCommand::Shutdown { response },
            "shutdown",
        )
        .await
    }

    /// Get the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Check if the scheduler is running.
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == SchedulerState::Running
    }

    /// Check if the scheduler is paused.
    pub async fn is_paused(&self) -> bool {
        *self.state.read().await == SchedulerState::Paused
    }
}

#[async_trait]
impl JobRegistry for SchedulerHandle {
    async fn register_job(&self, job: Job, run_immediately: bool) -> Result<(), SchedulerError> {
        SchedulerHandle::register_job(self, job, run_immediately).await
    }

    async fn remove_job(&self, name: &JobName) -> Result<(), SchedulerError> {
        SchedulerHandle::remove_job(self, name.clone()).await.map(|_| ())
    }
}
