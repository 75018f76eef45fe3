//! YAML configuration parsing.

use std::path::Path;

use super::error::ConfigError;
use super::types::AppConfig;

/// Loads and validates configuration files.
pub struct YamlLoader;

impl YamlLoader {
    /// Load configuration from a file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let config: AppConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn parse_str(yaml: &str) -> Result<AppConfig, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(AppConfig::default());
        }
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
}
