//! Scheduler engine for recurring jobs.
//!
//! This module provides the engine that keeps one timer per registered job,
//! serializes invocations of the same job and exposes a [`SchedulerHandle`]
//! for registration and control.

mod engine;
mod handle;
mod types;

pub use engine::{DEFAULT_SHUTDOWN_TIMEOUT, Scheduler};
pub use handle::{JobRegistry, SchedulerHandle};
pub use types::{JobInfo, SchedulerError, SchedulerState};
