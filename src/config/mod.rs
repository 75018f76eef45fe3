//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the scheduler, the
//! update orchestrator and the initial settings values.

mod error;
mod types;
mod yaml;

pub use error::ConfigError;
pub use types::{AppConfig, SchedulerConfig, UpdaterConfig};
pub use yaml::YamlLoader;
