//! Worker liveness rollups

use crate::error::QueueMetricsResult;
use crate::models::{QueueIdentity, WorkerHeartbeat, WorkerStats};
use crate::repositories::WorkerHeartbeatRepository;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerStatsAggregator {
    workers: WorkerHeartbeatRepository,
    stale_threshold: Duration,
}

impl WorkerStatsAggregator {
    pub fn new(workers: WorkerHeartbeatRepository, stale_threshold: Duration) -> Self {
        Self {
            workers,
            stale_threshold,
        }
    }

    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    /// Non-stale workers in an active state, optionally limited to one queue
    pub async fn active_workers(
        &self,
        queue: Option<&QueueIdentity>,
        now: DateTime<Utc>,
    ) -> QueueMetricsResult<Vec<WorkerHeartbeat>> {
        Ok(self
            .workers
            .list_workers()
            .await?
            .into_iter()
            .filter(|worker| queue.is_none_or(|q| on_queue(worker, q)))
            .filter(|worker| worker.state.is_active() && !worker.is_stale_at(self.stale_threshold, now))
            .collect())
    }

    pub async fn stats_for_queue(&self, queue: &QueueIdentity, now: DateTime<Utc>) -> QueueMetricsResult<WorkerStats> {
        let workers: Vec<WorkerHeartbeat> = self
            .workers
            .list_workers()
            .await?
            .into_iter()
            .filter(|worker| on_queue(worker, queue))
            .collect();
        Ok(rollup(queue, &workers, self.stale_threshold, now))
    }

    /// One rollup per queue that has at least one worker record, sorted by
    /// queue. Workers not yet assigned to a queue are left out.
    pub async fn stats_by_queue(&self, now: DateTime<Utc>) -> QueueMetricsResult<Vec<WorkerStats>> {
        let mut grouped: BTreeMap<QueueIdentity, Vec<WorkerHeartbeat>> = BTreeMap::new();
        for worker in self.workers.list_workers().await? {
            if worker.queue.is_empty() {
                continue;
            }
            grouped
                .entry(QueueIdentity::new(&worker.connection, &worker.queue))
                .or_default()
                .push(worker);
        }

        Ok(grouped
            .iter()
            .map(|(queue, workers)| rollup(queue, workers, self.stale_threshold, now))
            .collect())
    }
}

fn on_queue(worker: &WorkerHeartbeat, queue: &QueueIdentity) -> bool {
    worker.connection == queue.connection && worker.queue == queue.queue
}

/// Stale workers count toward `total_workers` and `stale_workers` only
pub fn rollup(
    queue: &QueueIdentity,
    workers: &[WorkerHeartbeat],
    stale_threshold: Duration,
    now: DateTime<Utc>,
) -> WorkerStats {
    let mut stats = WorkerStats {
        connection: queue.connection.clone(),
        queue: queue.queue.clone(),
        total_workers: workers.len() as u64,
        ..WorkerStats::default()
    };
    let mut idle_percentages = Vec::new();

    for worker in workers {
        stats.jobs_processed += worker.jobs_processed;
        if worker.is_stale_at(stale_threshold, now) {
            stats.stale_workers += 1;
            continue;
        }
        if worker.state.is_active() {
            stats.active_workers += 1;
            idle_percentages.push(worker.idle_percentage());
        }
        match worker.state {
            crate::models::WorkerState::Busy => stats.busy_workers += 1,
            crate::models::WorkerState::Idle => stats.idle_workers += 1,
            _ => {}
        }
    }

    stats.avg_idle_percentage = super::stats::mean(&idle_percentages);
    stats
}
