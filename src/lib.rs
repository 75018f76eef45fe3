//! harbormaster - background work for a container management dashboard.
//!
//! - [`scheduler`]: recurring jobs, one timer per name, no overlapping runs
//! - [`core::resolver`]: settings values to validated cron expressions
//! - [`update`]: concurrent check/update runs across containers, images and projects
//! - [`jobs`]: the built-in GitOps sync, auto-update and image polling jobs

pub mod config;
pub mod core;
pub mod events;
pub mod jobs;
pub mod scheduler;
pub mod settings;
pub mod testing;
pub mod update;

pub use config::{AppConfig, ConfigError, YamlLoader};
pub use core::job::{Job, JobContext, JobError, JobHandler, Trigger};
pub use core::resolver::{resolve, resolve_schedule, resolve_setting};
pub use core::schedule::{Schedule, ScheduleError};
pub use core::types::{JobName, ResourceId, RunId};
pub use events::{Event, EventBus, EventHandler};
pub use jobs::{JobServices, JobSettings, RepositorySync, SyncReport, schedule_builtin_jobs, schedule_job};
pub use scheduler::{JobInfo, JobRegistry, Scheduler, SchedulerError, SchedulerHandle, SchedulerState};
pub use settings::{InMemorySettings, SettingsProvider};
pub use update::{
    ProviderError, Resource, ResourceProvider, ResourceResult, ResourceStatus, ResourceType,
    UpdateCheck, UpdateError, UpdateOrchestrator, UpdateRequest, UpdateResult, UpdaterStatus,
};
