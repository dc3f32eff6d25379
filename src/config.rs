//! Diad Configuration
//!
//! This module provides configuration structures for the election-day
//! service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;

/// Main Diad configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiadConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Election event rules
    #[serde(default)]
    pub events: EventsConfig,

    /// Finalization job configuration
    #[serde(default)]
    pub finalization: FinalizationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Data directory for the SQLite store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Campaign timezone as minutes east of UTC (-300 = UTC-5)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// What activation does when the campaign already has an active event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationPolicy {
    /// Deactivate the sibling event in the same transaction
    #[default]
    DeactivateOthers,
    /// Refuse with `AnotherEventActive`
    Reject,
}

/// Election event rules
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventsConfig {
    #[serde(default)]
    pub activation_policy: ActivationPolicy,
}

/// Finalization job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizationConfig {
    /// Voters processed per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Number of worker tasks consuming the job queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded job queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Attempts per job, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base retry backoff in milliseconds (doubled per attempt)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Seconds a finished job's status stays queryable
    #[serde(default = "default_status_retention_secs")]
    pub status_retention_secs: u64,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/diad")
}

fn default_utc_offset_minutes() -> i32 {
    -300
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_status_retention_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for FinalizationConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            status_retention_secs: default_status_retention_secs(),
        }
    }
}

impl FinalizationConfig {
    /// Base retry backoff as Duration
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Finished job status retention as Duration
    pub fn status_retention(&self) -> Duration {
        Duration::from_secs(self.status_retention_secs)
    }
}

impl DiadConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: DiadConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.api.enabled && self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        if self.finalization.chunk_size == 0 {
            return Err(crate::Error::Config("finalization.chunk_size must be at least 1".into()));
        }

        if self.finalization.workers == 0 {
            return Err(crate::Error::Config("finalization.workers must be at least 1".into()));
        }

        if self.finalization.queue_capacity == 0 {
            return Err(crate::Error::Config("finalization.queue_capacity must be at least 1".into()));
        }

        if self.finalization.max_attempts == 0 {
            return Err(crate::Error::Config("finalization.max_attempts must be at least 1".into()));
        }

        self.utc_offset()?;
        Ok(())
    }

    /// Get the configured campaign timezone
    pub fn utc_offset(&self) -> crate::Result<FixedOffset> {
        FixedOffset::east_opt(self.server.utc_offset_minutes * 60).ok_or_else(|| {
            crate::Error::Config(format!(
                "server.utc_offset_minutes out of range: {}",
                self.server.utc_offset_minutes
            ))
        })
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &PathBuf {
        &self.server.data_dir
    }

    /// Get the SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.server.data_dir.join("diad.db")
    }
}
