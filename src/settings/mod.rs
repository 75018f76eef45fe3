//! Settings access for background jobs.
//!
//! Jobs read their enablement flags and schedule strings through the
//! [`SettingsProvider`] trait. Lookups never fail: absent or unparsable
//! values resolve to the default supplied at the call site.

use std::collections::HashMap;
use std::sync::RwLock;

/// Setting keys read by the built-in jobs.
pub mod keys {
    /// Enables the GitOps repository sync job.
    pub const GITOPS_SYNC_ENABLED: &str = "gitopsSyncEnabled";
    /// Schedule of the GitOps repository sync job.
    pub const GITOPS_SYNC_INTERVAL: &str = "gitopsSyncInterval";
    /// Enables automatic updates of containers and projects.
    pub const AUTO_UPDATE: &str = "autoUpdate";
    /// Schedule of the auto-update job.
    pub const AUTO_UPDATE_INTERVAL: &str = "autoUpdateInterval";
    /// Enables image update polling.
    pub const POLLING_ENABLED: &str = "pollingEnabled";
    /// Schedule of the image polling job.
    pub const POLLING_INTERVAL: &str = "pollingInterval";
}

/// Typed read/write access to persisted settings.
pub trait SettingsProvider: Send + Sync {
    /// Read a boolean setting, falling back to `default` when unset or invalid.
    fn get_bool(&self, key: &str, default: bool) -> bool;

    /// Read a string setting, falling back to `default` when unset.
    fn get_string(&self, key: &str, default: &str) -> String;

    /// Store a string setting.
    fn set_string(&self, key: &str, value: &str);
}

/// Thread-safe in-memory settings store.
///
/// Values are not persisted across restarts.
#[derive(Debug, Default)]
pub struct InMemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySettings {
    /// Create an empty settings store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given values.
    pub fn from_values<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Builder-style setter.
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.write().insert(key.into(), value.into());
        self
    }

    /// Get the raw stored value, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, String>> {
        self.values.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        self.values.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsProvider for InMemorySettings {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.read().get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => false,
            Some(v) => {
                tracing::warn!(key, value = %v, "Invalid boolean setting, using default");
                default
            }
            None => default,
        }
    }

    fn get_string(&self, key: &str, default: &str) -> String {
        self.read()
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set_string(&self, key: &str, value: &str) {
        self.write().insert(key.to_string(), value.to_string());
    }
}
