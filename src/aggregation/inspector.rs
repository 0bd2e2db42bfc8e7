//! Queue backend inspection
//!
//! Pending/reserved/delayed counts come from the queue system itself, which
//! the engine only observes. One [`QueueInspector`] implementation exists per
//! supported queue backend.

use crate::error::QueueMetricsResult;
use crate::models::{QueueDepthData, QueueIdentity};
use async_trait::async_trait;
use chrono::Utc;

#[async_trait]
pub trait QueueInspector: Send + Sync + std::fmt::Debug {
    async fn queue_depth(&self, queue: &QueueIdentity) -> QueueMetricsResult<QueueDepthData>;

    async fn has_jobs(&self, queue: &QueueIdentity) -> QueueMetricsResult<bool> {
        Ok(!self.queue_depth(queue).await?.is_empty())
    }

    /// Queue names this backend knows about without any observed traffic
    async fn all_queues(&self) -> QueueMetricsResult<Vec<String>>;
}

/// Inspector for backends that expose nothing; every queue reads as empty
#[derive(Debug, Clone, Default)]
pub struct NullQueueInspector;

#[async_trait]
impl QueueInspector for NullQueueInspector {
    async fn queue_depth(&self, queue: &QueueIdentity) -> QueueMetricsResult<QueueDepthData> {
        Ok(QueueDepthData::empty(queue, Utc::now()))
    }

    async fn all_queues(&self) -> QueueMetricsResult<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(feature = "redis-storage")]
pub use self::redis_list::RedisListQueueInspector;

#[cfg(feature = "redis-storage")]
mod redis_list {
    use super::QueueInspector;
    use crate::error::QueueMetricsResult;
    use crate::models::{QueueDepthData, QueueIdentity};
    use crate::storage::errors::StorageResult;
    use crate::storage::providers::bounded;
    use crate::storage::providers::redis::classify;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    /// Reads list-based Redis queues laid out as
    /// `{prefix}:{queue}` (list of JSON payloads), `{prefix}:{queue}:reserved`
    /// and `{prefix}:{queue}:delayed` (sorted sets scored by availability time)
    #[derive(Clone)]
    pub struct RedisListQueueInspector {
        connection: redis::aio::ConnectionManager,
        prefix: String,
        known_queues: Vec<String>,
        timeout: Duration,
    }

    impl std::fmt::Debug for RedisListQueueInspector {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisListQueueInspector")
                .field("prefix", &self.prefix)
                .field("known_queues", &self.known_queues)
                .finish()
        }
    }

    impl RedisListQueueInspector {
        pub fn new(connection: redis::aio::ConnectionManager, prefix: impl Into<String>, timeout: Duration) -> Self {
            Self {
                connection,
                prefix: prefix.into(),
                known_queues: vec!["default".to_string()],
                timeout,
            }
        }

        /// Queue names reported by [`QueueInspector::all_queues`] besides `default`
        pub fn with_known_queues(mut self, queues: impl IntoIterator<Item = String>) -> Self {
            for queue in queues {
                if !queue.is_empty() && !self.known_queues.contains(&queue) {
                    self.known_queues.push(queue);
                }
            }
            self
        }

        async fn read(&self, queue: &str) -> StorageResult<(u64, u64, u64, Option<String>, Vec<(String, f64)>)> {
            let pending_key = format!("{}:{}", self.prefix, queue);
            let reserved_key = format!("{pending_key}:reserved");
            let delayed_key = format!("{pending_key}:delayed");
            let mut conn = self.connection.clone();

            bounded(self.timeout, "QUEUE_DEPTH", async move {
                redis::pipe()
                    .cmd("LLEN")
                    .arg(&pending_key)
                    .cmd("ZCARD")
                    .arg(&reserved_key)
                    .cmd("ZCARD")
                    .arg(&delayed_key)
                    .cmd("LINDEX")
                    .arg(&pending_key)
                    .arg(0)
                    .cmd("ZRANGE")
                    .arg(&delayed_key)
                    .arg(0)
                    .arg(0)
                    .arg("WITHSCORES")
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| classify("QUEUE_DEPTH", e))
            })
            .await
        }
    }

    /// `pushedAt` of a queued JSON payload, in unix seconds
    pub(super) fn pushed_at(payload: &str) -> Option<DateTime<Utc>> {
        let value: serde_json::Value = serde_json::from_str(payload).ok()?;
        let pushed = value.get("pushedAt")?;
        let seconds = pushed
            .as_f64()
            .or_else(|| pushed.as_str().and_then(|s| s.parse::<f64>().ok()))?;
        DateTime::from_timestamp(seconds.trunc() as i64, 0)
    }

    #[async_trait]
    impl QueueInspector for RedisListQueueInspector {
        async fn queue_depth(&self, queue: &QueueIdentity) -> QueueMetricsResult<QueueDepthData> {
            let (pending, reserved, delayed, head, oldest_delayed) = self.read(&queue.queue).await?;

            Ok(QueueDepthData {
                connection: queue.connection.clone(),
                queue: queue.queue.clone(),
                pending_jobs: pending,
                reserved_jobs: reserved,
                delayed_jobs: delayed,
                oldest_pending_job_at: head.as_deref().and_then(pushed_at),
                oldest_delayed_job_at: oldest_delayed
                    .first()
                    .and_then(|(_, score)| DateTime::from_timestamp(*score as i64, 0)),
                measured_at: Utc::now(),
            })
        }

        async fn all_queues(&self) -> QueueMetricsResult<Vec<String>> {
            Ok(self.known_queues.clone())
        }
    }
}
