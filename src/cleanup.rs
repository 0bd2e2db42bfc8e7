//! Scheduled retention sweep
//!
//! Pattern scans are expensive on a shared keyspace; run this from a
//! scheduler, never per request.

use crate::config::QueueMetricsConfig;
use crate::error::QueueMetricsResult;
use crate::repositories::{
    BaselineRepository, JobMetricsRepository, QueueMetricsRepository, WorkerHeartbeatRepository,
};
use crate::storage::StorageProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Maximum idle age per data class; anything strictly older is removed
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupPolicy {
    pub job_metrics: Duration,
    pub queue_snapshots: Duration,
    pub workers: Duration,
    pub baselines: Duration,
}

impl CleanupPolicy {
    /// Same age for every data class
    pub fn uniform(older_than: Duration) -> Self {
        Self {
            job_metrics: older_than,
            queue_snapshots: older_than,
            workers: older_than,
            baselines: older_than,
        }
    }

    /// Aggregated TTL for job and queue data, raw TTL for heartbeats, baseline
    /// TTL for baselines
    pub fn from_config(config: &QueueMetricsConfig) -> Self {
        let ttl = &config.storage.ttl;
        Self {
            job_metrics: ttl.aggregated_ttl(),
            queue_snapshots: ttl.aggregated_ttl(),
            workers: ttl.raw_ttl(),
            baselines: ttl.baseline_ttl(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub job_metrics: u64,
    pub queue_snapshots: u64,
    pub workers: u64,
    pub baselines: u64,
    /// Entries past their TTL removed from backends without native expiry
    pub expired_entries: u64,
}

impl CleanupReport {
    pub fn total(&self) -> u64 {
        self.job_metrics + self.queue_snapshots + self.workers + self.baselines
    }
}

#[derive(Debug, Clone)]
pub struct CleanupService {
    storage: StorageProvider,
    jobs: JobMetricsRepository,
    queues: QueueMetricsRepository,
    workers: WorkerHeartbeatRepository,
    baselines: BaselineRepository,
}

impl CleanupService {
    pub fn new(
        storage: StorageProvider,
        jobs: JobMetricsRepository,
        queues: QueueMetricsRepository,
        workers: WorkerHeartbeatRepository,
        baselines: BaselineRepository,
    ) -> Self {
        Self {
            storage,
            jobs,
            queues,
            workers,
            baselines,
        }
    }

    pub async fn run(&self, policy: &CleanupPolicy) -> QueueMetricsResult<CleanupReport> {
        self.run_at(policy, Utc::now()).await
    }

    pub async fn run_at(&self, policy: &CleanupPolicy, now: DateTime<Utc>) -> QueueMetricsResult<CleanupReport> {
        // purge first so repository reads cannot drop expired entries uncounted
        let expired_entries = self.storage.purge_expired().await?;
        let report = CleanupReport {
            job_metrics: self.jobs.cleanup(policy.job_metrics, now).await?,
            queue_snapshots: self.queues.cleanup(policy.queue_snapshots, now).await?,
            workers: self.workers.cleanup(policy.workers, now).await?,
            baselines: self.baselines.cleanup(policy.baselines, now).await?,
            expired_entries,
        };

        info!(
            job_metrics = report.job_metrics,
            queue_snapshots = report.queue_snapshots,
            workers = report.workers,
            baselines = report.baselines,
            expired_entries = report.expired_entries,
            "Queue metrics cleanup complete"
        );
        Ok(report)
    }
}
