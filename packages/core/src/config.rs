//! Configuration
//!
//! Plain serde structs with defaults and a `validate()` pass. A full configuration can
//! be loaded from a JSON file; missing fields fall back to their defaults.

use crate::error::ConfigError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of rows a statement returns when it has no `take`
pub const DEFAULT_TAKE: u64 = 1000;

/// Settings shared by every memory entity driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DriverConfig {
    /// Run the background retention sweep
    pub retention_enabled: bool,

    /// Keys not accessed for this long are evicted by the sweep
    pub retention_ttl_secs: u64,

    /// Interval between sweeps
    pub retention_interval_secs: u64,

    /// Buffered messages per subscription consumer before publishes are dropped for it
    pub consumer_capacity: usize,

    /// Records kept per object by series content drivers; the oldest are evicted first
    pub history_limit: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            retention_enabled: false,
            retention_ttl_secs: 300,
            retention_interval_secs: 10,
            consumer_capacity: 1024,
            history_limit: 1000,
        }
    }
}

impl DriverConfig {
    pub fn retention_ttl(&self) -> Duration {
        Duration::from_secs(self.retention_ttl_secs)
    }

    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consumer_capacity == 0 {
            return Err(ConfigError::invalid_value("consumerCapacity", "must be greater than 0"));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::invalid_value("historyLimit", "must be greater than 0"));
        }
        if self.retention_enabled && self.retention_interval_secs == 0 {
            return Err(ConfigError::invalid_value(
                "retentionIntervalSecs",
                "must be greater than 0 when retention is enabled",
            ));
        }
        Ok(())
    }
}

/// Query engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub default_take: u64,

    /// Upper bound on per-content-type fetches running at once
    pub max_concurrent_fetches: usize,

    /// Use secondary indexes for conditions when one exists
    pub index_lookup: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_take: DEFAULT_TAKE,
            max_concurrent_fetches: 8,
            index_lookup: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_take == 0 {
            return Err(ConfigError::invalid_value("defaultTake", "must be greater than 0"));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::invalid_value(
                "maxConcurrentFetches",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrakHoundConfig {
    pub driver: DriverConfig,
    pub engine: EngineConfig,
}

impl TrakHoundConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.driver.validate()?;
        self.engine.validate()
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: TrakHoundConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrakHoundConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.driver.retention_ttl(), Duration::from_secs(300));
        assert_eq!(config.driver.retention_interval(), Duration::from_secs(10));
        assert_eq!(config.engine.default_take, 1000);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = TrakHoundConfig::default();
        config.engine.default_take = 0;
        assert!(config.validate().is_err());

        let driver = DriverConfig {
            retention_enabled: true,
            retention_interval_secs: 0,
            ..Default::default()
        };
        assert!(driver.validate().is_err());

        let driver = DriverConfig {
            history_limit: 0,
            ..Default::default()
        };
        assert!(driver.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrakHoundConfig =
            serde_json::from_str(r#"{"driver": {"retentionTtlSecs": 60}}"#).unwrap();
        assert_eq!(config.driver.retention_ttl_secs, 60);
        assert_eq!(config.driver.retention_interval_secs, 10);
        assert_eq!(config.driver.history_limit, 1000);
        assert!(config.engine.index_lookup);
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"engine": {{"defaultTake": 25}}}}"#).unwrap();

        let config = TrakHoundConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.engine.default_take, 25);

        let missing = TrakHoundConfig::from_json_file("/nonexistent/trakhound.json");
        assert!(missing.is_err());
    }
}
