//! Mapper configuration structures.
//!
//! Loads and saves configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_FETCH_SIZE, DEFAULT_MAX_HANDLES_PER_TABLE, MAX_FETCH_SIZE,
};
use crate::error::{WidecolError, WidecolResult};

/// Top-level mapper configuration.
///
/// # Example
///
/// ```rust
/// use widecol_common::config::MapperConfig;
///
/// let config = MapperConfig::from_toml_str("fetch_size = 25").unwrap();
/// assert_eq!(config.fetch_size, 25);
/// assert_eq!(config.pool.max_handles_per_table, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Rows fetched per cursor batch.
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    /// Table handle pool settings.
    #[serde(default)]
    pub pool: PoolSettings,
}

/// Table handle pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Maximum handles checked out per table at once.
    #[serde(default = "default_max_handles")]
    pub max_handles_per_table: usize,

    /// How long `acquire` waits for a free handle, in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_fetch_size() -> usize {
    DEFAULT_FETCH_SIZE
}

fn default_max_handles() -> usize {
    DEFAULT_MAX_HANDLES_PER_TABLE
}

fn default_acquire_timeout_ms() -> u64 {
    DEFAULT_ACQUIRE_TIMEOUT_MS
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            fetch_size: default_fetch_size(),
            pool: PoolSettings::default(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_handles_per_table: default_max_handles(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl PoolSettings {
    /// Returns the acquire timeout as a duration.
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl MapperConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cursor fetch size.
    pub fn fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// Sets the maximum handles per table.
    pub fn max_handles_per_table(mut self, max: usize) -> Self {
        self.pool.max_handles_per_table = max;
        self
    }

    /// Sets the handle acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool.acquire_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> WidecolResult<()> {
        if self.fetch_size == 0 || self.fetch_size > MAX_FETCH_SIZE {
            return Err(WidecolError::InvalidConfig {
                message: format!("fetch_size must be between 1 and {}", MAX_FETCH_SIZE),
            });
        }
        if self.pool.max_handles_per_table == 0 {
            return Err(WidecolError::InvalidConfig {
                message: "pool.max_handles_per_table must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> WidecolResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| WidecolError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> WidecolResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| WidecolError::InvalidConfig {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// Converts configuration to TOML string.
    pub fn to_toml(&self) -> WidecolResult<String> {
        toml::to_string_pretty(self).map_err(|e| WidecolError::InvalidConfig {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MapperConfig::default();
        assert_eq!(config.fetch_size, DEFAULT_FETCH_SIZE);
        assert_eq!(config.pool.acquire_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = MapperConfig::new()
            .fetch_size(10)
            .max_handles_per_table(2)
            .acquire_timeout(Duration::from_millis(50));

        assert_eq!(config.fetch_size, 10);
        assert_eq!(config.pool.max_handles_per_table, 2);
        assert_eq!(config.pool.acquire_timeout_ms, 50);
    }

    #[test]
    fn test_invalid_config() {
        assert!(MapperConfig::new().fetch_size(0).validate().is_err());
        assert!(MapperConfig::new().max_handles_per_table(0).validate().is_err());
        assert!(MapperConfig::from_toml_str("fetch_size = 0").is_err());
        assert!(MapperConfig::from_toml_str("fetch_size = \"many\"").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let toml = r#"
            fetch_size = 500

            [pool]
            max_handles_per_table = 4
        "#;
        let config = MapperConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.fetch_size, 500);
        assert_eq!(config.pool.max_handles_per_table, 4);
        assert_eq!(config.pool.acquire_timeout_ms, DEFAULT_ACQUIRE_TIMEOUT_MS);

        let rendered = config.to_toml().unwrap();
        assert_eq!(MapperConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widecol.toml");
        std::fs::write(&path, "fetch_size = 7\n").unwrap();

        let config = MapperConfig::from_file(&path).unwrap();
        assert_eq!(config.fetch_size, 7);

        assert!(MapperConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
