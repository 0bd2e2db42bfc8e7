//! Response shapes returned by [`super::MetricsQueryService`]

use crate::models::{BaselineData, JobMetricsData, QueueSnapshot, WorkerStats};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub total_workers: u64,
    pub active_workers: u64,
    pub busy_workers: u64,
    pub stale_workers: u64,
    pub by_queue: Vec<WorkerStats>,
}

impl WorkerSummary {
    pub fn from_rollups(by_queue: Vec<WorkerStats>) -> Self {
        let mut summary = Self::default();
        for stats in &by_queue {
            summary.total_workers += stats.total_workers;
            summary.active_workers += stats.active_workers;
            summary.busy_workers += stats.busy_workers;
            summary.stale_workers += stats.stale_workers;
        }
        summary.by_queue = by_queue;
        summary
    }
}

/// Everything the engine knows, in one response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub queues: Vec<QueueSnapshot>,
    pub jobs: Vec<JobMetricsData>,
    pub workers: WorkerSummary,
    pub baselines: Vec<BaselineData>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthCheckStatus,
    pub storage_driver: String,
    pub storage_reachable: bool,
    pub queues_discovered: usize,
    pub jobs_discovered: usize,
    pub workers_reporting: usize,
    /// Set when the store could not be queried
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheck {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthCheckStatus::Healthy
    }
}
