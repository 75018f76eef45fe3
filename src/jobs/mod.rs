//! Built-in background jobs.
//!
//! Each job reads its enablement flag and schedule from the settings
//! provider, resolves the schedule, and registers a handler through the
//! [`JobRegistry`] capability. Handlers re-check the enablement flag every
//! time they fire, so a job disabled between ticks does no work.

mod gitops;
mod update;

pub use gitops::{GitOpsSyncJob, RepositorySync, SyncReport};
pub use update::{AutoUpdateJob, ImagePollingJob};

use std::sync::Arc;
use tracing::info;

use crate::core::job::{Job, JobHandler};
use crate::core::resolver;
use crate::core::schedule::{Schedule, ScheduleError};
use crate::core::types::JobName;
use crate::scheduler::{JobRegistry, SchedulerError};
use crate::settings::{SettingsProvider, keys};
use crate::update::UpdateOrchestrator;

/// Where a job reads its configuration from, and its defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Registration name.
    pub name: &'static str,
    /// Boolean setting that enables the job.
    pub enabled_key: &'static str,
    /// Enablement when the setting is absent.
    pub enabled_default: bool,
    /// Setting holding the schedule.
    pub schedule_key: &'static str,
    /// Schedule used when the setting is empty or invalid.
    pub default_schedule: &'static str,
}

/// GitOps repository sync, every minute by default.
pub const GITOPS_SYNC: JobSettings = JobSettings {
    name: "gitops-sync",
    enabled_key: keys::GITOPS_SYNC_ENABLED,
    enabled_default: true,
    schedule_key: keys::GITOPS_SYNC_INTERVAL,
    default_schedule: "0 */1 * * * *",
};

/// Automatic updates, daily at midnight by default. Opt-in.
pub const AUTO_UPDATE: JobSettings = JobSettings {
    name: "auto-update",
    enabled_key: keys::AUTO_UPDATE,
    enabled_default: false,
    schedule_key: keys::AUTO_UPDATE_INTERVAL,
    default_schedule: "0 0 0 * * *",
};

/// Image update polling, hourly by default.
pub const IMAGE_POLLING: JobSettings = JobSettings {
    name: "image-polling",
    enabled_key: keys::POLLING_ENABLED,
    enabled_default: true,
    schedule_key: keys::POLLING_INTERVAL,
    default_schedule: "0 0 * * * *",
};

/// Every built-in job.
pub const BUILTIN_JOBS: [JobSettings; 3] = [GITOPS_SYNC, AUTO_UPDATE, IMAGE_POLLING];

impl JobSettings {
    /// Registration name as a [`JobName`].
    pub fn job_name(&self) -> JobName {
        JobName::new(self.name)
    }

    /// Whether the job is currently enabled.
    pub fn is_enabled(&self, settings: &dyn SettingsProvider) -> bool {
        settings.get_bool(self.enabled_key, self.enabled_default)
    }

    /// Resolve the job's effective schedule, migrating legacy values.
    pub fn schedule(
        &self,
        settings: &dyn SettingsProvider,
        timezone: &str,
    ) -> Result<Schedule, ScheduleError> {
        resolver::resolve_schedule(settings, self.schedule_key, self.default_schedule, timezone)
    }
}

/// Register or remove a job according to the current settings.
///
/// Returns whether the job is now registered. A disabled job is removed so
/// a stale timer from an earlier configuration cannot keep firing.
pub async fn schedule_job(
    registry: &dyn JobRegistry,
    settings: &dyn SettingsProvider,
    job: &JobSettings,
    handler: Arc<dyn JobHandler>,
    timezone: &str,
    run_immediately: bool,
) -> Result<bool, SchedulerError> {
    let name = job.job_name();
    if !job.is_enabled(settings) {
        info!(job = %name, "Job disabled, removing registration");
        registry.remove_job(&name).await?;
        return Ok(false);
    }

    let schedule = job.schedule(settings, timezone)?;
    info!(job = %name, schedule = %schedule.expression(), "Scheduling job");
    registry
        .register_job(Job::new(name, schedule, handler), run_immediately)
        .await?;
    Ok(true)
}

/// Services the built-in jobs delegate to.
#[derive(Clone)]
pub struct JobServices {
    pub settings: Arc<dyn SettingsProvider>,
    pub orchestrator: Arc<UpdateOrchestrator>,
    pub repository_sync: Arc<dyn RepositorySync>,
    /// Timezone applied to every resolved schedule.
    pub timezone: String,
}

/// (Re)apply every built-in job against the current settings.
///
/// Safe to call again whenever settings change; each job ends up with
/// exactly one registration or none.
pub async fn schedule_builtin_jobs(
    registry: &dyn JobRegistry,
    services: &JobServices,
    run_immediately: bool,
) -> Result<Vec<(JobName, bool)>, SchedulerError> {
    let handlers: [(JobSettings, Arc<dyn JobHandler>); 3] = [
        (
            GITOPS_SYNC,
            Arc::new(GitOpsSyncJob::new(
                Arc::clone(&services.settings),
                Arc::clone(&services.repository_sync),
            )),
        ),
        (
            AUTO_UPDATE,
            Arc::new(AutoUpdateJob::new(
                Arc::clone(&services.settings),
                Arc::clone(&services.orchestrator),
            )),
        ),
        (
            IMAGE_POLLING,
            Arc::new(ImagePollingJob::new(
                Arc::clone(&services.settings),
                Arc::clone(&services.orchestrator),
            )),
        ),
    ];

    let mut outcome = Vec::with_capacity(handlers.len());
    for (job, handler) in handlers {
        let scheduled = schedule_job(
            registry,
            services.settings.as_ref(),
            &job,
            handler,
            &services.timezone,
            run_immediately,
        )
        .await?;
        outcome.push((job.job_name(), scheduled));
    }
    Ok(outcome)
}
