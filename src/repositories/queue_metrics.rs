//! Queue snapshots and time series

use super::job_metrics::is_older_than;
use crate::config::{QueueDepthConfig, StorageConfig};
use crate::error::QueueMetricsResult;
use crate::models::{HistoryPoint, QueueIdentity, QueueSnapshot};
use crate::storage::{KeyBuilder, Pipeline, StorageProvider};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct QueueMetricsRepository {
    storage: StorageProvider,
    keys: KeyBuilder,
    aggregated_ttl: Duration,
    max_snapshots: usize,
    history_window: Duration,
}

impl QueueMetricsRepository {
    pub fn new(
        storage: StorageProvider,
        keys: KeyBuilder,
        config: &StorageConfig,
        queue_depth: &QueueDepthConfig,
    ) -> Self {
        Self {
            storage,
            keys,
            aggregated_ttl: config.ttl.aggregated_ttl(),
            max_snapshots: config.max_snapshots.max(1),
            history_window: queue_depth.history_window(),
        }
    }

    /// Replace the latest snapshot and append it to the trend series
    pub async fn record_snapshot(&self, snapshot: &QueueSnapshot) -> QueueMetricsResult<()> {
        let latest_key = self.keys.queue_snapshot(&snapshot.connection, &snapshot.queue);
        let series_key = self.keys.queue_snapshots(&snapshot.connection, &snapshot.queue);
        let member = serde_json::to_string(snapshot)?;
        let trim_stop = -(self.max_snapshots as isize) - 1;

        let pipeline = Pipeline::new()
            .delete(latest_key.clone())
            .set_hash(latest_key, snapshot.to_fields(), Some(self.aggregated_ttl))
            .add_to_sorted_set(
                series_key.clone(),
                member,
                snapshot.recorded_at.timestamp() as f64,
                Some(self.aggregated_ttl),
            )
            .trim_sorted_set_by_rank(series_key, 0, trim_stop);

        self.storage.pipeline(pipeline).await?;
        Ok(())
    }

    pub async fn get_latest_snapshot(&self, queue: &QueueIdentity) -> QueueMetricsResult<Option<QueueSnapshot>> {
        let key = self.keys.queue_snapshot(&queue.connection, &queue.queue);
        let fields = self.storage.get_hash(&key).await?;
        Ok(QueueSnapshot::from_fields(&key, queue, &fields))
    }

    /// Snapshots recorded at or after `since`, oldest first
    pub async fn get_snapshots_since(
        &self,
        queue: &QueueIdentity,
        since: DateTime<Utc>,
    ) -> QueueMetricsResult<Vec<QueueSnapshot>> {
        let key = self.keys.queue_snapshots(&queue.connection, &queue.queue);
        let members = self
            .storage
            .range_sorted_set_by_score(&key, since.timestamp() as f64, f64::INFINITY)
            .await?;

        Ok(members
            .into_iter()
            .filter_map(|(member, _)| match serde_json::from_str::<QueueSnapshot>(&member) {
                Ok(snapshot) => Some(snapshot),
                Err(error) => {
                    debug!(key = %key, error = %error, "Skipping malformed snapshot");
                    None
                }
            })
            .collect())
    }

    /// Append a depth reading and drop readings older than the history window
    pub async fn record_depth_history(
        &self,
        queue: &QueueIdentity,
        depth: u64,
        measured_at: DateTime<Utc>,
    ) -> QueueMetricsResult<()> {
        let key = self.keys.queue_depth_history(&queue.connection, &queue.queue);
        self.append_history(key, depth as f64, measured_at).await
    }

    pub async fn record_throughput_history(
        &self,
        queue: &QueueIdentity,
        jobs_per_minute: f64,
        measured_at: DateTime<Utc>,
    ) -> QueueMetricsResult<()> {
        let key = self.keys.throughput_history(&queue.connection, &queue.queue);
        self.append_history(key, jobs_per_minute, measured_at).await
    }

    async fn append_history(&self, key: String, value: f64, measured_at: DateTime<Utc>) -> QueueMetricsResult<()> {
        let timestamp = measured_at.timestamp();
        let cutoff = timestamp - self.history_window.as_secs() as i64;
        // one point per second; the timestamp prefix keeps equal values distinct
        let member = format!("{timestamp}:{value}");

        let pipeline = Pipeline::new()
            .add_to_sorted_set(key.clone(), member, timestamp as f64, Some(self.history_window))
            .remove_sorted_set_by_score(key, f64::NEG_INFINITY, (cutoff - 1) as f64);

        self.storage.pipeline(pipeline).await?;
        Ok(())
    }

    pub async fn get_depth_history(
        &self,
        queue: &QueueIdentity,
        since: DateTime<Utc>,
    ) -> QueueMetricsResult<Vec<HistoryPoint>> {
        let key = self.keys.queue_depth_history(&queue.connection, &queue.queue);
        self.read_history(&key, since).await
    }

    pub async fn get_throughput_history(
        &self,
        queue: &QueueIdentity,
        since: DateTime<Utc>,
    ) -> QueueMetricsResult<Vec<HistoryPoint>> {
        let key = self.keys.throughput_history(&queue.connection, &queue.queue);
        self.read_history(&key, since).await
    }

    async fn read_history(&self, key: &str, since: DateTime<Utc>) -> QueueMetricsResult<Vec<HistoryPoint>> {
        let members = self
            .storage
            .range_sorted_set_by_score(key, since.timestamp() as f64, f64::INFINITY)
            .await?;

        Ok(members
            .into_iter()
            .filter_map(|(member, score)| {
                let value = crate::models::job_metrics::parse_sample_member(&member)?;
                let timestamp = DateTime::from_timestamp(score as i64, 0)?;
                Some(HistoryPoint { timestamp, value })
            })
            .collect())
    }

    /// Delete snapshots (latest and series) last recorded more than
    /// `older_than` ago
    pub async fn cleanup(&self, older_than: Duration, now: DateTime<Utc>) -> QueueMetricsResult<u64> {
        let keys = self.storage.scan_keys(&self.keys.pattern("queue_snapshot")).await?;
        let mut deleted = 0;

        for key in keys {
            let Some((connection, queue)) = self.keys.parse_queue_key("queue_snapshot", &key) else {
                continue;
            };
            let identity = QueueIdentity::new(connection, queue);
            let Some(snapshot) = self.get_latest_snapshot(&identity).await? else {
                continue;
            };
            if snapshot.recorded_at == DateTime::UNIX_EPOCH
                || !is_older_than(snapshot.recorded_at, older_than, now)
            {
                continue;
            }

            self.storage
                .delete(&[
                    key.clone(),
                    self.keys.queue_snapshots(&identity.connection, &identity.queue),
                ])
                .await?;
            debug!(queue = %identity, "Removed stale queue snapshot");
            deleted += 1;
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(max_snapshots: usize) -> QueueMetricsRepository {
        let config = StorageConfig {
            max_snapshots,
            ..StorageConfig::default()
        };
        QueueMetricsRepository::new(
            StorageProvider::memory(),
            KeyBuilder::new("qm"),
            &config,
            &QueueDepthConfig::default(),
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn snapshot(queue: &QueueIdentity, depth: u64, secs: i64) -> QueueSnapshot {
        QueueSnapshot {
            depth,
            pending: depth,
            active_workers: 1,
            ..QueueSnapshot::empty(queue, at(secs))
        }
        .scored()
    }

    #[tokio::test]
    async fn test_latest_snapshot_is_replaced() {
        let repo = repo(10);
        let queue = QueueIdentity::new("redis", "default");
        repo.record_snapshot(&snapshot(&queue, 5, 0)).await.unwrap();
        repo.record_snapshot(&snapshot(&queue, 250, 60)).await.unwrap();

        let latest = repo.get_latest_snapshot(&queue).await.unwrap().unwrap();
        assert_eq!(latest, snapshot(&queue, 250, 60));

        let series = repo.get_snapshots_since(&queue, at(0)).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].depth, 5);
    }

    #[tokio::test]
    async fn test_snapshot_series_is_capped() {
        let repo = repo(3);
        let queue = QueueIdentity::new("redis", "default");
        for i in 0..5 {
            repo.record_snapshot(&snapshot(&queue, i, i as i64)).await.unwrap();
        }
        let depths: Vec<u64> = repo
            .get_snapshots_since(&queue, at(0))
            .await
            .unwrap()
            .iter()
            .map(|s| s.depth)
            .collect();
        assert_eq!(depths, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_depth_history_window() {
        let repo = repo(10);
        let queue = QueueIdentity::new("redis", "default");
        repo.record_depth_history(&queue, 10, at(0)).await.unwrap();
        repo.record_depth_history(&queue, 10, at(60)).await.unwrap();
        // 25 hours later the first two readings fall out of the 24h window
        repo.record_depth_history(&queue, 40, at(25 * 3600)).await.unwrap();

        let history = repo.get_depth_history(&queue, at(0)).await.unwrap();
        assert_eq!(
            history,
            vec![HistoryPoint {
                timestamp: at(25 * 3600),
                value: 40.0
            }]
        );
    }

    #[tokio::test]
    async fn test_cleanup_drops_old_snapshots() {
        let repo = repo(10);
        let old = QueueIdentity::new("redis", "old");
        let fresh = QueueIdentity::new("redis", "fresh");
        repo.record_snapshot(&snapshot(&old, 1, 0)).await.unwrap();
        repo.record_snapshot(&snapshot(&fresh, 1, 7000)).await.unwrap();

        assert_eq!(repo.cleanup(Duration::from_secs(3600), at(7200)).await.unwrap(), 1);
        assert!(repo.get_latest_snapshot(&old).await.unwrap().is_none());
        assert!(repo.get_latest_snapshot(&fresh).await.unwrap().is_some());
    }
}
