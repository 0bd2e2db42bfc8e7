//! Queue-level aggregation
//!
//! Totals are summed across job classes before dividing, so the queue's
//! average duration is weighted by each class's volume.

use super::inspector::QueueInspector;
use super::stats;
use super::workers::WorkerStatsAggregator;
use super::RunReport;
use crate::constants::THROUGHPUT_WINDOW_SECONDS;
use crate::error::QueueMetricsResult;
use crate::models::fields::truncate_to_seconds;
use crate::models::{JobIdentity, QueueDepthData, QueueIdentity, QueueSnapshot};
use crate::repositories::{DiscoveryRepository, JobMetricsRepository, QueueMetricsRepository};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sums across the job classes of one queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueTotals {
    pub job_classes: usize,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_duration_ms: f64,
    pub throughput_per_minute: f64,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl QueueTotals {
    pub fn avg_duration(&self) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            self.total_duration_ms / self.total_processed as f64
        }
    }

    pub fn failure_rate(&self) -> f64 {
        stats::failure_rate(self.total_processed, self.total_failed)
    }
}

#[derive(Debug, Clone)]
pub struct QueueMetricsCalculator {
    jobs: JobMetricsRepository,
    queues: QueueMetricsRepository,
    discovery: DiscoveryRepository,
    workers: WorkerStatsAggregator,
    inspector: Arc<dyn QueueInspector>,
}

impl QueueMetricsCalculator {
    pub fn new(
        jobs: JobMetricsRepository,
        queues: QueueMetricsRepository,
        discovery: DiscoveryRepository,
        workers: WorkerStatsAggregator,
        inspector: Arc<dyn QueueInspector>,
    ) -> Self {
        Self {
            jobs,
            queues,
            discovery,
            workers,
            inspector,
        }
    }

    pub async fn calculate(&self, queue: &QueueIdentity) -> QueueMetricsResult<QueueSnapshot> {
        self.calculate_at(queue, Utc::now()).await
    }

    /// Compute, store and return the snapshot for `queue` as of `now`
    pub async fn calculate_at(&self, queue: &QueueIdentity, now: DateTime<Utc>) -> QueueMetricsResult<QueueSnapshot> {
        let job_classes = self.discovery.list_jobs_for_queue(queue).await?;
        let depth = self.depth(queue, now).await;
        let worker_stats = self.workers.stats_for_queue(queue, now).await?;

        let mut snapshot = QueueSnapshot {
            depth: depth.total_jobs(),
            pending: depth.pending_jobs,
            scheduled: depth.delayed_jobs,
            reserved: depth.reserved_jobs,
            oldest_job_age: depth.oldest_pending_age_seconds(),
            active_workers: worker_stats.active_workers,
            utilization_rate: worker_stats.utilization_rate(),
            ..QueueSnapshot::empty(queue, now)
        };

        if job_classes.is_empty() {
            debug!(queue = %queue, "No job classes discovered; recording zero snapshot");
        } else {
            let totals = self.totals(&job_classes, now).await?;
            snapshot.avg_duration = totals.avg_duration();
            snapshot.failure_rate = totals.failure_rate();
            snapshot.throughput_per_minute = totals.throughput_per_minute;
        }

        let snapshot = snapshot.scored();
        self.queues.record_snapshot(&snapshot).await?;
        self.queues
            .record_throughput_history(queue, snapshot.throughput_per_minute, now)
            .await?;

        debug!(
            queue = %queue,
            health_score = snapshot.health_score,
            status = %snapshot.health_status,
            "Recorded queue snapshot"
        );
        Ok(snapshot)
    }

    /// Raw totals summed across `job_classes`
    pub async fn totals(&self, job_classes: &[JobIdentity], now: DateTime<Utc>) -> QueueMetricsResult<QueueTotals> {
        let since = now - Duration::seconds(THROUGHPUT_WINDOW_SECONDS);
        let mut totals = QueueTotals {
            job_classes: job_classes.len(),
            ..QueueTotals::default()
        };

        for job in job_classes {
            let aggregate = self.jobs.get_aggregate(job).await?;
            totals.total_processed += aggregate.total_processed;
            totals.total_failed += aggregate.total_failed;
            totals.total_duration_ms += aggregate.total_duration_ms;
            totals.last_processed_at = totals.last_processed_at.max(aggregate.last_processed_at);
            totals.throughput_per_minute += self.jobs.count_completions_since(job, since).await? as f64;
        }

        Ok(totals)
    }

    /// Queue-system depth; an unreachable queue backend reads as empty
    async fn depth(&self, queue: &QueueIdentity, now: DateTime<Utc>) -> QueueDepthData {
        match self.inspector.queue_depth(queue).await {
            Ok(depth) => depth,
            Err(error) => {
                warn!(queue = %queue, error = %error, "Queue inspection failed");
                QueueDepthData::empty(queue, truncate_to_seconds(now))
            }
        }
    }

    /// Calculate every discovered queue; a failing queue is reported and
    /// skipped
    pub async fn calculate_all(&self, now: DateTime<Utc>) -> QueueMetricsResult<RunReport<QueueSnapshot>> {
        let queues = self.discovery.list_queues().await?;
        let mut report = RunReport::default();

        for queue in queues {
            match self.calculate_at(&queue, now).await {
                Ok(snapshot) => report.succeeded.push(snapshot),
                Err(error) => {
                    warn!(queue = %queue, error = %error, "Queue metrics calculation failed");
                    report.record_failure(queue.to_string(), error);
                }
            }
        }

        info!(
            processed = report.processed(),
            failed = report.failures.len(),
            "Calculated queue metrics"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::NullQueueInspector;
    use crate::config::{QueueDepthConfig, StorageConfig};
    use crate::models::{HealthStatus, JobSample};
    use crate::repositories::WorkerHeartbeatRepository;
    use crate::storage::{KeyBuilder, StorageProvider};

    struct Fixture {
        calculator: QueueMetricsCalculator,
        jobs: JobMetricsRepository,
        queues: QueueMetricsRepository,
    }

    fn fixture() -> Fixture {
        let storage = StorageProvider::memory();
        let keys = KeyBuilder::new("test");
        let config = StorageConfig::default();
        let jobs = JobMetricsRepository::new(storage.clone(), keys.clone(), &config);
        let queues = QueueMetricsRepository::new(storage.clone(), keys.clone(), &config, &QueueDepthConfig::default());
        let discovery = DiscoveryRepository::new(storage.clone(), keys.clone());
        let workers = WorkerStatsAggregator::new(
            WorkerHeartbeatRepository::new(storage, keys, &config),
            std::time::Duration::from_secs(60),
        );
        Fixture {
            calculator: QueueMetricsCalculator::new(
                jobs.clone(),
                queues.clone(),
                discovery,
                workers,
                Arc::new(NullQueueInspector),
            ),
            jobs,
            queues,
        }
    }

    async fn complete(jobs: &JobMetricsRepository, job: &JobIdentity, count: usize, duration_ms: f64, at: DateTime<Utc>) {
        for i in 0..count {
            let sample = JobSample {
                job_id: format!("{}-{i}", job.job_class),
                job: job.clone(),
                duration_ms,
                memory_mb: 1.0,
                cpu_time_ms: 1.0,
                completed_at: at,
            };
            jobs.record_completion(&sample).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_weighted_average_across_job_classes() {
        let f = fixture();
        let now = Utc::now();
        let queue = QueueIdentity::new("redis", "default");
        complete(&f.jobs, &JobIdentity::new("redis", "default", "Fast"), 10, 100.0, now).await;
        complete(&f.jobs, &JobIdentity::new("redis", "default", "Slow"), 5, 200.0, now).await;

        let snapshot = f.calculator.calculate_at(&queue, now).await.unwrap();
        assert!((snapshot.avg_duration - 2000.0 / 15.0).abs() < 1e-9);
        assert_eq!(snapshot.failure_rate, 0.0);
        assert_eq!(snapshot.throughput_per_minute, 15.0);

        let stored = f.queues.get_latest_snapshot(&queue).await.unwrap().unwrap();
        assert_eq!(stored, snapshot);
    }

    #[tokio::test]
    async fn test_failure_rate_over_combined_totals() {
        let f = fixture();
        let now = Utc::now();
        let job = JobIdentity::new("redis", "emails", "SendEmail");
        complete(&f.jobs, &job, 7, 50.0, now).await;
        for i in 0..3 {
            f.jobs.record_failure(&format!("x{i}"), &job, "boom", now).await.unwrap();
        }

        let snapshot = f
            .calculator
            .calculate_at(&job.queue_identity(), now)
            .await
            .unwrap();
        assert_eq!(snapshot.failure_rate, 30.0);
    }

    #[tokio::test]
    async fn test_empty_queue_records_zero_snapshot() {
        let f = fixture();
        let queue = QueueIdentity::new("redis", "idle");
        let snapshot = f.calculator.calculate(&queue).await.unwrap();
        assert_eq!(snapshot.throughput_per_minute, 0.0);
        assert_eq!(snapshot.avg_duration, 0.0);
        assert_eq!(snapshot.failure_rate, 0.0);
        assert_eq!(snapshot.health_status, HealthStatus::Healthy);
        assert!(f.queues.get_latest_snapshot(&queue).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_calculate_all_counts_discovered_queues() {
        let f = fixture();
        let now = Utc::now();
        complete(&f.jobs, &JobIdentity::new("redis", "a", "Job"), 1, 10.0, now).await;
        complete(&f.jobs, &JobIdentity::new("redis", "b", "Job"), 1, 10.0, now).await;

        let report = f.calculator.calculate_all(now).await.unwrap();
        assert_eq!(report.processed(), 2);
        assert!(report.is_complete());
    }
}
