//! Stored queue baselines

use super::job_metrics::is_older_than;
use crate::config::StorageConfig;
use crate::error::QueueMetricsResult;
use crate::models::{BaselineData, QueueIdentity};
use crate::storage::{KeyBuilder, StorageProvider};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BaselineRepository {
    storage: StorageProvider,
    keys: KeyBuilder,
    ttl: Duration,
}

impl BaselineRepository {
    pub fn new(storage: StorageProvider, keys: KeyBuilder, config: &StorageConfig) -> Self {
        Self {
            storage,
            keys,
            ttl: config.ttl.baseline_ttl(),
        }
    }

    pub async fn store_baseline(&self, baseline: &BaselineData) -> QueueMetricsResult<()> {
        let key = self.keys.baseline(&baseline.connection, &baseline.queue);
        self.storage
            .set_hash(&key, &baseline.to_fields(), Some(self.ttl))
            .await?;
        Ok(())
    }

    pub async fn get_baseline(&self, queue: &QueueIdentity) -> QueueMetricsResult<Option<BaselineData>> {
        let key = self.keys.baseline(&queue.connection, &queue.queue);
        let fields = self.storage.get_hash(&key).await?;
        Ok(BaselineData::from_fields(&key, queue, &fields))
    }

    /// Whether a baseline exists that was calculated within `max_age`
    pub async fn has_recent_baseline(
        &self,
        queue: &QueueIdentity,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> QueueMetricsResult<bool> {
        Ok(self
            .get_baseline(queue)
            .await?
            .is_some_and(|baseline| !is_older_than(baseline.calculated_at, max_age, now)))
    }

    pub async fn delete_baseline(&self, queue: &QueueIdentity) -> QueueMetricsResult<bool> {
        let key = self.keys.baseline(&queue.connection, &queue.queue);
        Ok(self.storage.delete(&[key]).await? > 0)
    }

    /// Every stored baseline, sorted by queue
    pub async fn list_baselines(&self) -> QueueMetricsResult<Vec<BaselineData>> {
        let keys = self.storage.scan_keys(&self.keys.pattern("baseline")).await?;
        let mut baselines = Vec::new();
        for key in keys {
            let Some((connection, queue)) = self.keys.parse_queue_key("baseline", &key) else {
                continue;
            };
            if let Some(baseline) = self.get_baseline(&QueueIdentity::new(connection, queue)).await? {
                baselines.push(baseline);
            }
        }
        baselines.sort_by(|a, b| a.identity().cmp(&b.identity()));
        Ok(baselines)
    }

    /// Delete baselines calculated more than `older_than` ago
    pub async fn cleanup(&self, older_than: Duration, now: DateTime<Utc>) -> QueueMetricsResult<u64> {
        let mut deleted = 0;
        for baseline in self.list_baselines().await? {
            if !is_older_than(baseline.calculated_at, older_than, now) {
                continue;
            }
            if self.delete_baseline(&baseline.identity()).await? {
                debug!(queue = %baseline.identity(), "Removed stale baseline");
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> BaselineRepository {
        BaselineRepository::new(StorageProvider::memory(), KeyBuilder::new("qm"), &StorageConfig::default())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn baseline(queue: &str, secs: i64) -> BaselineData {
        BaselineData {
            connection: "redis".to_string(),
            queue: queue.to_string(),
            cpu_percent_per_job: 5.0,
            memory_mb_per_job: 64.0,
            avg_duration_ms: 250.0,
            sample_count: 80,
            confidence_score: 0.4,
            calculated_at: at(secs),
            significant_deviation: false,
        }
    }

    #[tokio::test]
    async fn test_store_and_fetch() {
        let repo = repo();
        let stored = baseline("default", 0);
        repo.store_baseline(&stored).await.unwrap();

        let queue = QueueIdentity::new("redis", "default");
        assert_eq!(repo.get_baseline(&queue).await.unwrap(), Some(stored));
        assert!(repo.has_recent_baseline(&queue, Duration::from_secs(60), at(30)).await.unwrap());
        assert!(!repo.has_recent_baseline(&queue, Duration::from_secs(60), at(61)).await.unwrap());
        assert!(repo
            .get_baseline(&QueueIdentity::new("redis", "other"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cleanup() {
        let repo = repo();
        repo.store_baseline(&baseline("old", 0)).await.unwrap();
        repo.store_baseline(&baseline("new", 1000)).await.unwrap();

        assert_eq!(repo.cleanup(Duration::from_secs(600), at(1200)).await.unwrap(), 1);
        let left: Vec<String> = repo
            .list_baselines()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.queue)
            .collect();
        assert_eq!(left, vec!["new".to_string()]);
    }
}
