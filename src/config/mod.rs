//! # Enrichment Configuration
//!
//! Typed configuration for the pipeline, loaded from
//! `config/enrichment-config.yaml` with per-environment overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use contact_enrichment::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let batch_size = manager.config().batching.batch_size;
//! let time_limit = manager.config().execution.batch_time_limit();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::system;

/// Root configuration structure mirroring enrichment-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Database connection and pooling configuration
    pub database: DatabaseConfig,

    /// How input is partitioned into batches
    pub batching: BatchingConfig,

    /// Enrichment provider endpoint settings
    pub enrichment: ProviderConfig,

    /// Batch execution limits
    pub execution: ExecutionConfig,

    /// Retry policy for the orchestration step
    pub backoff: BackoffConfig,

    /// Reconciliation of contacts orphaned by dead workers
    pub staleness: StalenessConfig,

    /// Where uploads are staged
    pub staging: StagingConfig,

    /// Lifecycle event channel
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; when absent the in-memory store is used
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_seconds: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub batch_size: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: system::DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL; `validate-email` and `company-info` are appended to it
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/enrich".to_string(),
            request_timeout_ms: 5_000,
            user_agent: format!("contact-enrichment/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on batch workers running at once
    pub max_concurrent_batches: usize,
    /// Hard limit for one batch execution; exceeding it fails the batch
    pub batch_time_limit_seconds: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_batches: 8,
            batch_time_limit_seconds: 300,
        }
    }
}

impl ExecutionConfig {
    pub fn batch_time_limit(&self) -> Duration {
        Duration::from_secs(self.batch_time_limit_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_enabled: bool,
    pub jitter_max_percentage: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 600_000,
            jitter_enabled: true,
            jitter_max_percentage: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StalenessConfig {
    pub enabled: bool,
    pub detection_interval_seconds: u64,
    /// How long a contact or batch may stay IN_PROGRESS before it is swept
    pub lease_seconds: u64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detection_interval_seconds: 300,
            lease_seconds: 900,
        }
    }
}

impl StalenessConfig {
    pub fn detection_interval(&self) -> Duration {
        Duration::from_secs(self.detection_interval_seconds)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StagingConfig {
    pub upload_root: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("uploads"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

impl EnrichmentConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.batching.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "batching.batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        if self.enrichment.base_url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "enrichment.base_url",
                "enrichment provider configuration",
            ));
        }

        if self.enrichment.request_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "enrichment.request_timeout_ms",
                "0",
                "request timeout must be greater than 0",
            ));
        }

        if self.execution.max_concurrent_batches == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.max_concurrent_batches",
                "0",
                "at least one batch must be allowed to run",
            ));
        }

        if self.execution.batch_time_limit_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution.batch_time_limit_seconds",
                "0",
                "batch time limit must be greater than 0",
            ));
        }

        if self.backoff.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.backoff_multiplier",
                self.backoff.backoff_multiplier.to_string(),
                "multiplier must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter_max_percentage) {
            return Err(ConfigurationError::invalid_value(
                "backoff.jitter_max_percentage",
                self.backoff.jitter_max_percentage.to_string(),
                "jitter must be between 0.0 and 1.0",
            ));
        }

        if self.staleness.enabled
            && self.staleness.lease_seconds <= self.execution.batch_time_limit_seconds
        {
            return Err(ConfigurationError::invalid_value(
                "staleness.lease_seconds",
                self.staleness.lease_seconds.to_string(),
                "lease must exceed execution.batch_time_limit_seconds or live workers get swept",
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "0",
                "event channel capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EnrichmentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batching.batch_size, 2);
        assert_eq!(config.backoff.max_retries, 3);
        assert_eq!(config.execution.batch_time_limit(), Duration::from_secs(300));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = EnrichmentConfig::default();
        config.batching.batch_size = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batching.batch_size"));
    }

    #[test]
    fn test_lease_must_outlive_time_limit() {
        let mut config = EnrichmentConfig::default();
        config.staleness.lease_seconds = 60;
        config.execution.batch_time_limit_seconds = 120;
        assert!(config.validate().is_err());

        config.staleness.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: EnrichmentConfig = serde_yaml::from_str(
            r#"
batching:
  batch_size: 50
enrichment:
  base_url: "http://provider.internal/api/enrich"
"#,
        )
        .unwrap();

        assert_eq!(config.batching.batch_size, 50);
        assert_eq!(config.enrichment.base_url, "http://provider.internal/api/enrich");
        assert_eq!(config.enrichment.request_timeout_ms, 5_000);
        assert_eq!(config.execution.max_concurrent_batches, 8);
    }
}
