//! Configuration types.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::scheduler::{DEFAULT_SHUTDOWN_TIMEOUT, Scheduler};
use crate::settings::InMemorySettings;
use crate::update::{DEFAULT_MAX_WORKERS, UpdateOrchestrator};

use super::error::ConfigError;

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// IANA timezone applied to every resolved job schedule.
    pub timezone: String,
    pub scheduler: SchedulerConfig,
    pub updater: UpdaterConfig,
    /// Initial settings values, keyed by setting name.
    pub settings: BTreeMap<String, serde_yaml::Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            scheduler: SchedulerConfig::default(),
            updater: UpdaterConfig::default(),
            settings: BTreeMap::new(),
        }
    }
}

/// Scheduler section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// How long shutdown waits for running jobs.
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT.as_secs(),
        }
    }
}

/// Update orchestrator section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Worker pool size per run.
    pub max_workers: usize,
    /// Optional limit on the duration of one run.
    pub run_timeout_secs: Option<u64>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            run_timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Check value ranges and the timezone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidConfig(format!("unknown timezone: {}", self.timezone)))?;

        if self.scheduler.shutdown_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "scheduler.shutdown_timeout_secs must be greater than zero".into(),
            ));
        }

        if self.updater.max_workers == 0 {
            return Err(ConfigError::InvalidConfig(
                "updater.max_workers must be greater than zero".into(),
            ));
        }

        if self.updater.run_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "updater.run_timeout_secs cannot be zero".into(),
            ));
        }

        for (key, value) in &self.settings {
            setting_to_string(key, value)?;
        }

        Ok(())
    }

    /// Settings values as strings, as stored by the settings provider.
    ///
    /// Null values are treated as unset.
    pub fn settings_values(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut values = BTreeMap::new();
        for (key, value) in &self.settings {
            if let Some(value) = setting_to_string(key, value)? {
                values.insert(key.clone(), value);
            }
        }
        Ok(values)
    }

    /// Build a settings provider seeded with the configured values.
    pub fn settings_provider(&self) -> Result<InMemorySettings, ConfigError> {
        Ok(InMemorySettings::from_values(self.settings_values()?))
    }

    /// Shutdown timeout as a duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduler.shutdown_timeout_secs)
    }

    /// Build a scheduler with the configured options.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new().with_shutdown_timeout(self.shutdown_timeout())
    }

    /// Build an orchestrator (without providers) with the configured options.
    pub fn orchestrator(&self) -> UpdateOrchestrator {
        let orchestrator = UpdateOrchestrator::new().with_max_workers(self.updater.max_workers);
        match self.updater.run_timeout_secs {
            Some(secs) => orchestrator.with_run_timeout(Duration::from_secs(secs)),
            None => orchestrator,
        }
    }
}

fn setting_to_string(key: &str, value: &serde_yaml::Value) -> Result<Option<String>, ConfigError> {
    use serde_yaml::Value;

    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(ConfigError::InvalidConfig(format!(
            "setting '{}' must be a scalar value",
            key
        ))),
    }
}
