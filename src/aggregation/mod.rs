//! # Aggregation
//!
//! Derived metrics computed from the raw counters and sample series, either on
//! demand or from a scheduler. Batch entry points (`calculate_all`) continue
//! past a failing subject and report it in a [`RunReport`]; only a failure to
//! enumerate the subjects aborts the run.

pub mod inspector;
pub mod job_metrics;
pub mod queue_metrics;
pub mod stats;
pub mod workers;

pub use inspector::{NullQueueInspector, QueueInspector};
#[cfg(feature = "redis-storage")]
pub use inspector::RedisListQueueInspector;
pub use job_metrics::JobMetricsCalculator;
pub use queue_metrics::{QueueMetricsCalculator, QueueTotals};
pub use workers::WorkerStatsAggregator;

use crate::error::QueueMetricsError;

/// A subject that failed during a batch run
#[derive(Debug, Clone, PartialEq)]
pub struct RunFailure {
    pub subject: String,
    pub error: QueueMetricsError,
}

/// Outcome of a batch calculation
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport<T> {
    pub succeeded: Vec<T>,
    pub failures: Vec<RunFailure>,
    /// Subjects left alone, e.g. baselines that were not due
    pub skipped: usize,
}

impl<T> Default for RunReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failures: Vec::new(),
            skipped: 0,
        }
    }
}

impl<T> RunReport<T> {
    pub fn record_failure(&mut self, subject: String, error: QueueMetricsError) {
        self.failures.push(RunFailure { subject, error });
    }

    /// Subjects calculated successfully
    pub fn processed(&self) -> usize {
        self.succeeded.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
