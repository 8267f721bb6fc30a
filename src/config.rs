//! Tunables for the download and merge pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse configuration file '{0}'")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Invalid configuration value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

/// Pipeline settings. Every field has a default, so a JSON file only needs
/// to list the values it overrides.
///
/// # Examples
///
/// ```
/// use merra2_clearsky::PipelineConfig;
///
/// let config: PipelineConfig = serde_json::from_str(r#"{"concurrency": 2}"#).unwrap();
/// assert_eq!(config.concurrency, 2);
/// assert_eq!(config.chunk_size, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Downloads in flight at once.
    pub concurrency: usize,
    /// Targets per chunk. Chunks run one after another.
    pub chunk_size: usize,
    /// Attempts per target before it is given up for this pass.
    pub max_attempts: u32,
    pub attempt_timeout_secs: u64,
    /// Base pause between attempts; attempt `n` waits `n` times this.
    pub retry_delay_ms: u64,
    pub chunk_timeout_secs: u64,
    pub delete_retry_delay_ms: u64,
    /// `None` retries deletions until they succeed.
    pub delete_max_attempts: Option<u32>,
    /// `None` runs global passes until a pass comes back clean.
    pub max_passes: Option<u32>,
    pub time_tolerance_minutes: i64,
    /// Deflate level for consolidated files, 0-9.
    pub compression_level: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            chunk_size: 20,
            max_attempts: 5,
            attempt_timeout_secs: 600,
            retry_delay_ms: 1_000,
            chunk_timeout_secs: 7200,
            delete_retry_delay_ms: 20_000,
            delete_max_attempts: None,
            max_passes: None,
            time_tolerance_minutes: 30,
            compression_level: 4,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: PipelineConfig = serde_json::from_slice(&bytes)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "chunk_size",
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if !(0..=9).contains(&self.compression_level) {
            return Err(ConfigError::Invalid {
                field: "compression_level",
                message: format!("{} is outside 0-9", self.compression_level),
            });
        }
        if self.time_tolerance_minutes < 0 {
            return Err(ConfigError::Invalid {
                field: "time_tolerance_minutes",
                message: "must not be negative".to_string(),
            });
        }
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn delete_retry_delay(&self) -> Duration {
        Duration::from_millis(self.delete_retry_delay_ms)
    }

    pub fn time_tolerance(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.time_tolerance_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"max_passes": 3, "delete_retry_delay_ms": 10}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_passes, Some(3));
        assert_eq!(config.delete_retry_delay(), Duration::from_millis(10));
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.time_tolerance(), chrono::Duration::minutes(30));
    }

    #[test]
    fn rejects_zero_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"concurrency": 0}"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(ConfigError::Invalid { field: "concurrency", .. })
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = PipelineConfig::from_json_file(Path::new("/nonexistent/pipeline.json"));
        assert!(matches!(result, Err(ConfigError::Read(..))));
    }
}
