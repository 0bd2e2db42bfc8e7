//! # Queue Metrics Configuration
//!
//! Typed configuration for the metrics engine. Every field has a default, so an empty
//! file (or no file at all) yields a working in-process setup. Values are layered by
//! [`ConfigLoader`]: base TOML file, environment-specific TOML file, then
//! `QUEUE_METRICS__SECTION__FIELD` environment variables.
//!
//! ```rust,no_run
//! use queue_metrics::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load()?;
//! let raw_ttl = config.storage.ttl.raw_ttl();
//! let threshold = config.worker_heartbeat.stale_threshold_seconds;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration structure mirroring config/queue-metrics.toml
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueMetricsConfig {
    /// Global gate checked first by every recorder
    pub enabled: bool,

    /// Backing store selection, key prefix and retention
    pub storage: StorageConfig,

    /// Worker liveness settings
    pub worker_heartbeat: WorkerHeartbeatConfig,

    /// Queue depth history and autoscaler threshold
    pub queue_depth: QueueDepthConfig,

    /// Capacity baseline learning
    pub baseline: BaselineConfig,
}

impl Default for QueueMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: StorageConfig::default(),
            worker_heartbeat: WorkerHeartbeatConfig::default(),
            queue_depth: QueueDepthConfig::default(),
            baseline: BaselineConfig::default(),
        }
    }
}

impl QueueMetricsConfig {
    /// Reject values that would make the engine misbehave silently
    pub fn validate(&self) -> ConfigResult<()> {
        if self.storage.prefix.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "storage.prefix",
                &self.storage.prefix,
                "key prefix must not be empty",
            ));
        }

        for (field, value) in [
            ("storage.ttl.raw", self.storage.ttl.raw),
            ("storage.ttl.aggregated", self.storage.ttl.aggregated),
            ("storage.ttl.baseline", self.storage.ttl.baseline),
        ] {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "TTL must be a positive number of seconds",
                ));
            }
        }

        if self.storage.max_samples == 0 {
            return Err(ConfigurationError::invalid_value(
                "storage.max_samples",
                self.storage.max_samples,
                "sample cap must be positive",
            ));
        }

        if self.storage.max_snapshots == 0 {
            return Err(ConfigurationError::invalid_value(
                "storage.max_snapshots",
                self.storage.max_snapshots,
                "snapshot cap must be positive",
            ));
        }

        if self.storage.driver != StorageDriverKind::Memory && self.storage.connection.is_empty()
        {
            return Err(ConfigurationError::missing_required_field(
                "storage.connection",
                format!("{} storage driver", self.storage.driver.as_str()),
            ));
        }

        let decay = self.baseline.decay_factor;
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(ConfigurationError::invalid_value(
                "baseline.decay_factor",
                decay,
                "decay factor must be in (0, 1]",
            ));
        }

        if self.baseline.target_sample_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "baseline.target_sample_size",
                self.baseline.target_sample_size,
                "target sample size must be positive",
            ));
        }

        if self.baseline.sliding_window_days == 0 {
            return Err(ConfigurationError::invalid_value(
                "baseline.sliding_window_days",
                self.baseline.sliding_window_days,
                "sliding window must cover at least one day",
            ));
        }

        if self.baseline.deviation.threshold <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "baseline.deviation.threshold",
                self.baseline.deviation.threshold,
                "deviation threshold must be positive",
            ));
        }

        if self.queue_depth.history_hours == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue_depth.history_hours",
                self.queue_depth.history_hours,
                "history window must be positive",
            ));
        }

        Ok(())
    }
}

/// Supported backing stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriverKind {
    /// Redis (or a protocol-compatible server such as Dragonfly)
    #[serde(alias = "dragonfly")]
    Redis,
    /// Relational table emulation on PostgreSQL
    #[serde(alias = "postgres")]
    Database,
    /// Process-local store, for tests and single-process deployments
    #[serde(alias = "in-memory")]
    Memory,
}

impl StorageDriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Database => "database",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub driver: StorageDriverKind,
    /// Connection URL for the selected driver (`redis://...` or `postgres://...`)
    pub connection: String,
    /// Namespace prepended to every key
    pub prefix: String,
    /// Table name prefix for the database driver
    pub table_prefix: String,
    /// Upper bound for a single store round trip
    pub operation_timeout_ms: u64,
    /// Samples kept per (job class, connection, queue) sorted set
    pub max_samples: usize,
    /// Points kept in each queue snapshot time series
    pub max_snapshots: usize,
    pub ttl: TtlConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: StorageDriverKind::Memory,
            connection: String::new(),
            prefix: "queue_metrics".to_string(),
            table_prefix: "queue_metrics_".to_string(),
            operation_timeout_ms: 2000,
            max_samples: 10_000,
            max_snapshots: 1000,
            ttl: TtlConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Retention per data class, in seconds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Raw samples and per-job tracking records
    pub raw: u64,
    /// Job aggregates, queue snapshots, heartbeats
    pub aggregated: u64,
    /// Capacity baselines
    pub baseline: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            raw: 3600,
            aggregated: 604_800,
            baseline: 2_592_000,
        }
    }
}

impl TtlConfig {
    pub fn raw_ttl(&self) -> Duration {
        Duration::from_secs(self.raw)
    }

    pub fn aggregated_ttl(&self) -> Duration {
        Duration::from_secs(self.aggregated)
    }

    pub fn baseline_ttl(&self) -> Duration {
        Duration::from_secs(self.baseline)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerHeartbeatConfig {
    pub stale_threshold_seconds: u64,
}

impl WorkerHeartbeatConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_seconds)
    }
}

impl Default for WorkerHeartbeatConfig {
    fn default() -> Self {
        Self {
            stale_threshold_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueDepthConfig {
    /// Depth above which a threshold-exceeded event is published
    pub threshold: u64,
    /// Retention of depth and throughput history
    pub history_hours: u64,
}

impl QueueDepthConfig {
    pub fn history_window(&self) -> Duration {
        Duration::from_secs(self.history_hours * 3600)
    }
}

impl Default for QueueDepthConfig {
    fn default() -> Self {
        Self {
            threshold: 100,
            history_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub sliding_window_days: u64,
    /// Weight of the newest window when blending into an existing baseline
    pub decay_factor: f64,
    /// Sample count at which confidence reaches 1.0
    pub target_sample_size: u64,
    pub intervals: BaselineIntervals,
    pub deviation: DeviationConfig,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            sliding_window_days: 7,
            decay_factor: 0.1,
            target_sample_size: 200,
            intervals: BaselineIntervals::default(),
            deviation: DeviationConfig::default(),
        }
    }
}

impl BaselineConfig {
    pub fn sliding_window(&self) -> Duration {
        Duration::from_secs(self.sliding_window_days * 86_400)
    }
}

/// Recalculation cadence per confidence tier, in minutes
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BaselineIntervals {
    pub no_baseline: u64,
    pub low_confidence: u64,
    pub medium_confidence: u64,
    pub high_confidence: u64,
    pub very_high_confidence: u64,
}

impl Default for BaselineIntervals {
    fn default() -> Self {
        Self {
            no_baseline: 1,
            low_confidence: 5,
            medium_confidence: 10,
            high_confidence: 30,
            very_high_confidence: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviationConfig {
    pub enabled: bool,
    /// Ratio between observed window and stored baseline that counts as significant
    pub threshold: f64,
    /// Recalculation cadence in minutes while a deviation is being tracked
    pub trigger_interval: u64,
}

impl Default for DeviationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 2.0,
            trigger_interval: 5,
        }
    }
}
