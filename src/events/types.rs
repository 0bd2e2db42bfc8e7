//! Notifications emitted by the engine for external consumers

use crate::constants::events;
use crate::models::{BaselineData, JobMetricsData, QueueDepthData};
use serde::{Deserialize, Serialize};

/// Anything an autoscaler or capacity planner may want to react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricsEvent {
    /// Fresh job-class metrics were calculated
    MetricsRecorded { metrics: Box<JobMetricsData> },

    /// A queue depth sample exceeded the configured threshold
    QueueDepthThresholdExceeded {
        depth: QueueDepthData,
        threshold: u64,
        /// Rounded to two decimals
        percentage_over: f64,
    },

    /// A baseline was recalculated
    BaselineRecalculated {
        connection: String,
        queue: String,
        baseline: BaselineData,
        significant_change: bool,
    },
}

impl MetricsEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MetricsRecorded { .. } => events::METRICS_RECORDED,
            Self::QueueDepthThresholdExceeded { .. } => events::QUEUE_DEPTH_THRESHOLD_EXCEEDED,
            Self::BaselineRecalculated { .. } => events::BASELINE_RECALCULATED,
        }
    }

    pub fn threshold_exceeded(depth: QueueDepthData, threshold: u64) -> Self {
        let percentage_over = percentage_over(depth.pending_jobs, threshold);
        Self::QueueDepthThresholdExceeded {
            depth,
            threshold,
            percentage_over,
        }
    }
}

/// `(depth - threshold) / threshold * 100`, rounded to 2 decimals
pub fn percentage_over(depth: u64, threshold: u64) -> f64 {
    if threshold == 0 {
        return 0.0;
    }
    let over = (depth as f64 - threshold as f64) / threshold as f64 * 100.0;
    (over * 100.0).round() / 100.0
}
