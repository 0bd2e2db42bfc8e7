//! Read-only projections for presentation layers
//!
//! Entities never observed come back as `None`; known entities without data
//! come back zero-valued.

use super::types::{HealthCheck, HealthCheckStatus, Overview, WorkerSummary};
use crate::aggregation::{JobMetricsCalculator, WorkerStatsAggregator};
use crate::error::{QueueMetricsError, QueueMetricsResult};
use crate::hooks::{HookContext, HookPipeline};
use crate::models::{
    BaselineData, JobIdentity, JobMetricsData, QueueIdentity, QueueSnapshot, QueueTrends,
    WorkerHeartbeat, WorkerStats,
};
use crate::repositories::{
    BaselineRepository, DiscoveryRepository, QueueMetricsRepository, WorkerHeartbeatRepository,
};
use crate::storage::StorageProvider;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct MetricsQueryService {
    storage: StorageProvider,
    discovery: DiscoveryRepository,
    queues: QueueMetricsRepository,
    workers: WorkerHeartbeatRepository,
    baselines: BaselineRepository,
    job_metrics: JobMetricsCalculator,
    worker_stats: WorkerStatsAggregator,
    hooks: HookPipeline,
}

impl MetricsQueryService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: StorageProvider,
        discovery: DiscoveryRepository,
        queues: QueueMetricsRepository,
        workers: WorkerHeartbeatRepository,
        baselines: BaselineRepository,
        job_metrics: JobMetricsCalculator,
        worker_stats: WorkerStatsAggregator,
        hooks: HookPipeline,
    ) -> Self {
        Self {
            storage,
            discovery,
            queues,
            workers,
            baselines,
            job_metrics,
            worker_stats,
            hooks,
        }
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    pub async fn get_job_metrics(&self, job: &JobIdentity) -> QueueMetricsResult<Option<JobMetricsData>> {
        if !self.discovery.is_job_known(job).await? {
            return Ok(None);
        }
        Ok(Some(self.job_metrics.calculate(job).await?))
    }

    /// [`Self::get_job_metrics`] as JSON, passed through the hook pipeline
    pub async fn job_metrics_payload(&self, job: &JobIdentity) -> QueueMetricsResult<Option<Value>> {
        let Some(metrics) = self.get_job_metrics(job).await? else {
            return Ok(None);
        };
        let payload = serde_json::to_value(&metrics)?;
        Ok(Some(self.hooks.run(HookContext::JobMetrics, payload)?))
    }

    /// Latest snapshot; zero-valued for a discovered queue that was never
    /// aggregated
    pub async fn get_queue_metrics(&self, queue: &QueueIdentity) -> QueueMetricsResult<Option<QueueSnapshot>> {
        if let Some(snapshot) = self.queues.get_latest_snapshot(queue).await? {
            return Ok(Some(snapshot));
        }
        if self.discovery.is_queue_known(queue).await? {
            return Ok(Some(QueueSnapshot::empty(queue, Utc::now())));
        }
        Ok(None)
    }

    /// Snapshots and history points recorded at or after `since`
    pub async fn get_queue_trends(&self, queue: &QueueIdentity, since: DateTime<Utc>) -> QueueMetricsResult<QueueTrends> {
        Ok(QueueTrends {
            connection: queue.connection.clone(),
            queue: queue.queue.clone(),
            snapshots: self.queues.get_snapshots_since(queue, since).await?,
            depth_history: self.queues.get_depth_history(queue, since).await?,
            throughput_history: self.queues.get_throughput_history(queue, since).await?,
        })
    }

    pub async fn get_all_queues(&self) -> QueueMetricsResult<Vec<QueueSnapshot>> {
        let now = Utc::now();
        let mut snapshots = Vec::new();
        for queue in self.discovery.list_queues().await? {
            let snapshot = self.queues.get_latest_snapshot(&queue).await?;
            snapshots.push(snapshot.unwrap_or_else(|| QueueSnapshot::empty(&queue, now)));
        }
        Ok(snapshots)
    }

    pub async fn get_all_jobs(&self) -> QueueMetricsResult<Vec<JobMetricsData>> {
        let now = Utc::now();
        let mut jobs = Vec::new();
        for job in self.discovery.list_jobs().await? {
            jobs.push(self.job_metrics.calculate_at(&job, now).await?);
        }
        Ok(jobs)
    }

    pub async fn get_active_workers(&self, queue: Option<&QueueIdentity>) -> QueueMetricsResult<Vec<WorkerHeartbeat>> {
        self.worker_stats.active_workers(queue, Utc::now()).await
    }

    pub async fn get_worker(&self, worker_id: &str) -> QueueMetricsResult<Option<WorkerHeartbeat>> {
        self.workers.get_worker(worker_id).await
    }

    pub async fn get_worker_stats(&self, queue: &QueueIdentity) -> QueueMetricsResult<WorkerStats> {
        self.worker_stats.stats_for_queue(queue, Utc::now()).await
    }

    pub async fn get_baseline(&self, queue: &QueueIdentity) -> QueueMetricsResult<Option<BaselineData>> {
        self.baselines.get_baseline(queue).await
    }

    pub async fn get_overview(&self) -> QueueMetricsResult<Overview> {
        let now = Utc::now();
        Ok(Overview {
            queues: self.get_all_queues().await?,
            jobs: self.get_all_jobs().await?,
            workers: WorkerSummary::from_rollups(self.worker_stats.stats_by_queue(now).await?),
            baselines: self.baselines.list_baselines().await?,
            generated_at: now,
        })
    }

    /// [`Self::get_overview`] as JSON, passed through the hook pipeline
    pub async fn overview_payload(&self) -> QueueMetricsResult<Value> {
        let payload = serde_json::to_value(self.get_overview().await?)?;
        Ok(self.hooks.run(HookContext::Overview, payload)?)
    }

    /// Store reachability plus discovery counts. Never fails; an unreachable
    /// store reports `degraded`.
    pub async fn health_check(&self) -> HealthCheck {
        let checked_at = Utc::now();
        let counts = self.counts().await;
        let reachable = matches!(self.storage.ping().await, Ok(true));

        let (queues, jobs, workers, error) = match counts {
            Ok((queues, jobs, workers)) => (queues, jobs, workers, None),
            Err(error) => {
                warn!(error = %error, "Health check could not read discovery data");
                (0, 0, 0, Some(error.to_string()))
            }
        };

        HealthCheck {
            status: if reachable && error.is_none() {
                HealthCheckStatus::Healthy
            } else {
                HealthCheckStatus::Degraded
            },
            storage_driver: self.storage.driver_name().to_string(),
            storage_reachable: reachable,
            queues_discovered: queues,
            jobs_discovered: jobs,
            workers_reporting: workers,
            error,
            checked_at,
        }
    }

    async fn counts(&self) -> Result<(usize, usize, usize), QueueMetricsError> {
        Ok((
            self.discovery.list_queues().await?.len(),
            self.discovery.list_jobs().await?.len(),
            self.workers.list_workers().await?.len(),
        ))
    }
}
