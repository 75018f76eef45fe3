//! Update orchestration for managed resources.
//!
//! The [`UpdateOrchestrator`] checks containers, images and projects for
//! newer image references and applies updates through pluggable
//! [`ResourceProvider`]s, with a bounded worker pool and an in-flight
//! registry preventing two runs from touching the same resource.

mod orchestrator;
mod provider;
mod registry;
mod types;

pub use orchestrator::{
    DEFAULT_MAX_WORKERS, REASON_CANCELED, REASON_IN_PROGRESS, UpdateError, UpdateOrchestrator,
};
pub use provider::{ProviderError, ResourceProvider, UpdateCheck};
pub use registry::{InFlightGuard, InFlightRegistry};
pub use types::{
    Resource, ResourceResult, ResourceStatus, ResourceType, StatusBucket, UpdateRequest,
    UpdateResult, UpdaterStatus,
};
