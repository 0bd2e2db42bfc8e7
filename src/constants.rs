//! # System Constants
//!
//! Fixed thresholds and window sizes shared by recorders, calculators and the
//! query facade. Everything tunable per deployment lives in [`crate::config`];
//! the values here are part of the metrics contract itself.

/// Key prefix used when no configuration is supplied
pub const DEFAULT_KEY_PREFIX: &str = "queue_metrics";

/// Longest exception text kept on a job aggregate
pub const MAX_EXCEPTION_LENGTH: usize = 1000;

/// Window used for "jobs per minute" throughput
pub const THROUGHPUT_WINDOW_SECONDS: i64 = 60;

/// Windows reported in [`crate::models::WindowStats`]: 5 minutes, 1 hour, 1 day
pub const STATS_WINDOWS_SECONDS: [i64; 3] = [300, 3600, 86_400];

/// Lifecycle event names published on the [`crate::events::EventPublisher`]
pub mod events {
    pub const METRICS_RECORDED: &str = "metrics.recorded";
    pub const QUEUE_DEPTH_THRESHOLD_EXCEEDED: &str = "queue.depth_threshold_exceeded";
    pub const BASELINE_RECALCULATED: &str = "baseline.recalculated";
}

/// Health score inputs and status cut-offs
pub mod health {
    pub const MAX_SCORE: f64 = 100.0;

    /// Depth above which the score starts dropping, one point per 10 jobs
    pub const DEPTH_THRESHOLD: u64 = 100;
    pub const DEPTH_PENALTY_DIVISOR: f64 = 10.0;
    pub const MAX_DEPTH_PENALTY: f64 = 30.0;

    /// Oldest job age above which the score drops, one point per minute
    pub const AGE_THRESHOLD_SECONDS: u64 = 300;
    pub const AGE_PENALTY_DIVISOR: f64 = 60.0;
    pub const MAX_AGE_PENALTY: f64 = 30.0;

    pub const MAX_FAILURE_PENALTY: f64 = 20.0;

    /// Flat penalty for a backlog with nobody working it
    pub const NO_WORKERS_PENALTY: f64 = 20.0;

    pub const HEALTHY_MIN_SCORE: f64 = 80.0;
    pub const WARNING_MIN_SCORE: f64 = 50.0;
}

/// Baseline reliability rules
pub mod baseline {
    pub const RELIABLE_MIN_SAMPLES: u64 = 50;
    pub const RELIABLE_MIN_CONFIDENCE: f64 = 0.7;
    pub const WANTED_SAMPLES: u64 = 100;

    /// Confidence tier boundaries for the recalculation schedule
    pub const LOW_CONFIDENCE_BELOW: f64 = 0.5;
    pub const MEDIUM_CONFIDENCE_BELOW: f64 = 0.7;
    pub const HIGH_CONFIDENCE_BELOW: f64 = 0.9;

    pub const MILLIS_PER_HOUR: f64 = 3_600_000.0;
}

/// Job class healthy when success rate and failure rate clear these
pub const HEALTHY_JOB_SUCCESS_RATE: f64 = 95.0;
pub const HEALTHY_JOB_FAILURE_RATE: f64 = 5.0;

/// Percentiles reported for every sample series
pub const P50: f64 = 0.50;
pub const P95: f64 = 0.95;
pub const P99: f64 = 0.99;
