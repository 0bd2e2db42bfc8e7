//! Job-class counters and sample series
//!
//! Every write is a single [`Pipeline`] built from server-side atomic
//! primitives (`HINCRBY`, `HINCRBYFLOAT`, `ZADD`), so concurrent workers never
//! read-modify-write at the client.

use super::discovery::DiscoveryRepository;
use crate::config::StorageConfig;
use crate::constants::MAX_EXCEPTION_LENGTH;
use crate::error::QueueMetricsResult;
use crate::models::job_metrics::{field, parse_sample_member, sample_member};
use crate::models::{JobIdentity, JobMetricsAggregate, JobSample, JobTracking};
use crate::storage::{KeyBuilder, Pipeline, StorageProvider};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// The three per-job sample series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSeries {
    Duration,
    Memory,
    Cpu,
}

impl SampleSeries {
    pub const ALL: [SampleSeries; 3] = [Self::Duration, Self::Memory, Self::Cpu];

    fn key(&self, keys: &KeyBuilder, job: &JobIdentity) -> String {
        match self {
            Self::Duration => keys.durations(&job.connection, &job.queue, &job.job_class),
            Self::Memory => keys.memory(&job.connection, &job.queue, &job.job_class),
            Self::Cpu => keys.cpu(&job.connection, &job.queue, &job.job_class),
        }
    }

    fn value(&self, sample: &JobSample) -> f64 {
        match self {
            Self::Duration => sample.duration_ms,
            Self::Memory => sample.memory_mb,
            Self::Cpu => sample.cpu_time_ms,
        }
    }
}

/// A stored sample value with its completion time (the sorted-set score)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    pub value: f64,
    pub completed_at: f64,
}

#[derive(Debug, Clone)]
pub struct JobMetricsRepository {
    storage: StorageProvider,
    keys: KeyBuilder,
    discovery: DiscoveryRepository,
    raw_ttl: Duration,
    aggregated_ttl: Duration,
    max_samples: usize,
}

impl JobMetricsRepository {
    pub fn new(storage: StorageProvider, keys: KeyBuilder, config: &StorageConfig) -> Self {
        let discovery = DiscoveryRepository::new(storage.clone(), keys.clone());
        Self {
            storage,
            keys,
            discovery,
            raw_ttl: config.ttl.raw_ttl(),
            aggregated_ttl: config.ttl.aggregated_ttl(),
            max_samples: config.max_samples.max(1),
        }
    }

    fn aggregate_key(&self, job: &JobIdentity) -> String {
        self.keys.job_metrics(&job.connection, &job.queue, &job.job_class)
    }

    fn exceptions_key(&self, job: &JobIdentity) -> String {
        self.keys.exceptions(&job.connection, &job.queue, &job.job_class)
    }

    /// Counter update shared by every recorder: bump `field`, refresh activity
    /// and TTL, and register the job class
    fn counter_batch(&self, job: &JobIdentity, counter: &str, at: DateTime<Utc>) -> Pipeline {
        let key = self.aggregate_key(job);
        let pipeline = Pipeline::new()
            .increment_hash_field(key.clone(), counter, 1_i64)
            .set_hash_field(key.clone(), field::LAST_ACTIVITY_AT, at.timestamp())
            .expire(key, self.aggregated_ttl);
        self.discovery.append_job(pipeline, job)
    }

    pub async fn record_start(
        &self,
        job_id: &str,
        job: &JobIdentity,
        started_at: DateTime<Utc>,
    ) -> QueueMetricsResult<()> {
        let tracking = JobTracking {
            job: job.clone(),
            started_at,
        };
        let pipeline = self
            .counter_batch(job, field::TOTAL_QUEUED, started_at)
            .set_hash(self.keys.job_tracking(job_id), tracking.to_fields(), Some(self.raw_ttl));

        self.storage.pipeline(pipeline).await?;
        Ok(())
    }

    pub async fn record_completion(&self, sample: &JobSample) -> QueueMetricsResult<()> {
        let job = &sample.job;
        let key = self.aggregate_key(job);
        let score = sample.completed_at.timestamp() as f64;
        // keep the newest `max_samples` members
        let trim_stop = -(self.max_samples as isize) - 1;

        let mut pipeline = self
            .counter_batch(job, field::TOTAL_PROCESSED, sample.completed_at)
            .increment_hash_field(key.clone(), field::TOTAL_DURATION_MS, sample.duration_ms)
            .increment_hash_field(key.clone(), field::TOTAL_MEMORY_MB, sample.memory_mb)
            .increment_hash_field(key.clone(), field::TOTAL_CPU_TIME_MS, sample.cpu_time_ms)
            .set_hash_field(key, field::LAST_PROCESSED_AT, sample.completed_at.timestamp());

        for series in SampleSeries::ALL {
            let series_key = series.key(&self.keys, job);
            pipeline = pipeline
                .add_to_sorted_set(
                    series_key.clone(),
                    sample_member(&sample.job_id, series.value(sample)),
                    score,
                    Some(self.raw_ttl),
                )
                .trim_sorted_set_by_rank(series_key, 0, trim_stop);
        }

        let pipeline = pipeline.delete(self.keys.job_tracking(&sample.job_id));
        self.storage.pipeline(pipeline).await?;
        Ok(())
    }

    pub async fn record_failure(
        &self,
        job_id: &str,
        job: &JobIdentity,
        exception: &str,
        failed_at: DateTime<Utc>,
    ) -> QueueMetricsResult<()> {
        let key = self.aggregate_key(job);
        let pipeline = self
            .counter_batch(job, field::TOTAL_FAILED, failed_at)
            .set_hash(
                key,
                vec![
                    (field::LAST_FAILED_AT.to_string(), failed_at.timestamp().to_string()),
                    (field::LAST_EXCEPTION.to_string(), truncate_exception(exception)),
                ],
                None,
            )
            .delete(self.keys.job_tracking(job_id));

        self.storage.pipeline(pipeline).await?;
        Ok(())
    }

    /// Diagnostic only; totals are untouched
    pub async fn record_timeout(&self, job: &JobIdentity, at: DateTime<Utc>) -> QueueMetricsResult<()> {
        self.storage
            .pipeline(self.counter_batch(job, field::TOTAL_TIMEOUTS, at))
            .await?;
        Ok(())
    }

    pub async fn record_exception(
        &self,
        job: &JobIdentity,
        exception_class: &str,
        at: DateTime<Utc>,
    ) -> QueueMetricsResult<()> {
        let exceptions_key = self.exceptions_key(job);
        let pipeline = self
            .counter_batch(job, field::TOTAL_EXCEPTIONS, at)
            .increment_hash_field(exceptions_key.clone(), exception_class, 1_i64)
            .expire(exceptions_key, self.aggregated_ttl);

        self.storage.pipeline(pipeline).await?;
        Ok(())
    }

    pub async fn record_retry_requested(
        &self,
        job: &JobIdentity,
        attempt: u32,
        at: DateTime<Utc>,
    ) -> QueueMetricsResult<()> {
        let pipeline = self
            .counter_batch(job, field::TOTAL_RETRIES, at)
            .set_hash_field(self.aggregate_key(job), field::LAST_RETRY_ATTEMPT, attempt);

        self.storage.pipeline(pipeline).await?;
        Ok(())
    }

    pub async fn get_tracking(&self, job_id: &str) -> QueueMetricsResult<Option<JobTracking>> {
        let key = self.keys.job_tracking(job_id);
        let fields = self.storage.get_hash(&key).await?;
        Ok(JobTracking::from_fields(&key, &fields))
    }

    /// Counters for `job`; all zero when nothing is stored
    pub async fn get_aggregate(&self, job: &JobIdentity) -> QueueMetricsResult<JobMetricsAggregate> {
        let key = self.aggregate_key(job);
        let fields = self.storage.get_hash(&key).await?;
        Ok(JobMetricsAggregate::from_fields(&key, &fields))
    }

    pub async fn get_exception_counts(&self, job: &JobIdentity) -> QueueMetricsResult<HashMap<String, u64>> {
        let fields = self.storage.get_hash(&self.exceptions_key(job)).await?;
        Ok(fields
            .into_iter()
            .filter_map(|(class, count)| {
                let count = count.parse::<f64>().ok()?;
                Some((class, count.max(0.0) as u64))
            })
            .collect())
    }

    /// Every retained sample of a series, oldest first
    pub async fn get_samples(&self, series: SampleSeries, job: &JobIdentity) -> QueueMetricsResult<Vec<TimedSample>> {
        let key = series.key(&self.keys, job);
        let members = self.storage.range_sorted_set_by_rank(&key, 0, -1).await?;
        Ok(decode_samples(&key, members))
    }

    /// Samples completed at or after `since`, oldest first
    pub async fn get_samples_since(
        &self,
        series: SampleSeries,
        job: &JobIdentity,
        since: DateTime<Utc>,
    ) -> QueueMetricsResult<Vec<TimedSample>> {
        let key = series.key(&self.keys, job);
        let members = self
            .storage
            .range_sorted_set_by_score(&key, since.timestamp() as f64, f64::INFINITY)
            .await?;
        Ok(decode_samples(&key, members))
    }

    /// Completions at or after `since`
    pub async fn count_completions_since(&self, job: &JobIdentity, since: DateTime<Utc>) -> QueueMetricsResult<u64> {
        let key = SampleSeries::Duration.key(&self.keys, job);
        Ok(self
            .storage
            .count_sorted_set_by_score(&key, since.timestamp() as f64, f64::INFINITY)
            .await?)
    }

    /// Delete aggregates idle for longer than `older_than`, with their samples
    /// and discovery entries. Aggregates without an activity timestamp are
    /// kept; discovery entries whose aggregate already expired are dropped
    /// without being counted.
    pub async fn cleanup(&self, older_than: Duration, now: DateTime<Utc>) -> QueueMetricsResult<u64> {
        let mut deleted = 0;

        for job in self.discovery.list_jobs().await? {
            let key = self.aggregate_key(&job);
            let fields = self.storage.get_hash(&key).await?;

            if !fields.is_empty() {
                let Some(last_activity) = last_activity(&key, &fields) else {
                    continue;
                };
                if !is_older_than(last_activity, older_than, now) {
                    continue;
                }
            }

            let mut doomed: Vec<String> = SampleSeries::ALL
                .iter()
                .map(|series| series.key(&self.keys, &job))
                .collect();
            doomed.push(self.exceptions_key(&job));
            doomed.push(key.clone());
            self.storage.delete(&doomed).await?;
            self.discovery.forget_job(&job).await?;
            self.discovery.forget_queue_if_unused(&job.queue_identity()).await?;

            if fields.is_empty() {
                debug!(job = %job, "Forgot job class with expired metrics");
            } else {
                debug!(key = %key, "Removed idle job metrics");
                deleted += 1;
            }
        }

        Ok(deleted)
    }
}

fn last_activity(key: &str, fields: &HashMap<String, String>) -> Option<DateTime<Utc>> {
    let reader = crate::models::fields::FieldReader::new(key, fields);
    reader
        .timestamp(field::LAST_ACTIVITY_AT)
        .or_else(|| reader.timestamp(field::LAST_PROCESSED_AT))
        .or_else(|| reader.timestamp(field::LAST_FAILED_AT))
}

/// Age comparison used by every cleanup: strictly older than the cutoff
pub(crate) fn is_older_than(at: DateTime<Utc>, older_than: Duration, now: DateTime<Utc>) -> bool {
    (now - at).num_seconds() > older_than.as_secs() as i64
}

fn decode_samples(key: &str, members: Vec<(String, f64)>) -> Vec<TimedSample> {
    members
        .into_iter()
        .filter_map(|(member, score)| match parse_sample_member(&member) {
            Some(value) => Some(TimedSample {
                value,
                completed_at: score,
            }),
            None => {
                debug!(key = %key, member = %member, "Skipping malformed sample");
                None
            }
        })
        .collect()
}

fn truncate_exception(exception: &str) -> String {
    exception.chars().take(MAX_EXCEPTION_LENGTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(max_samples: usize) -> JobMetricsRepository {
        let config = StorageConfig {
            max_samples,
            ..StorageConfig::default()
        };
        JobMetricsRepository::new(StorageProvider::memory(), KeyBuilder::new("qm"), &config)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn sample(job_id: &str, duration_ms: f64, secs: i64) -> JobSample {
        JobSample {
            job_id: job_id.to_string(),
            job: JobIdentity::new("redis", "default", "SendEmail"),
            duration_ms,
            memory_mb: 32.0,
            cpu_time_ms: duration_ms / 2.0,
            completed_at: at(secs),
        }
    }

    #[tokio::test]
    async fn test_completion_updates_counters_and_samples() {
        let repo = repo(100);
        let job = JobIdentity::new("redis", "default", "SendEmail");
        repo.record_start("j1", &job, at(0)).await.unwrap();
        assert!(repo.get_tracking("j1").await.unwrap().is_some());

        repo.record_completion(&sample("j1", 120.0, 1)).await.unwrap();
        repo.record_completion(&sample("j2", 80.0, 2)).await.unwrap();

        let aggregate = repo.get_aggregate(&job).await.unwrap();
        assert_eq!(aggregate.total_queued, 1);
        assert_eq!(aggregate.total_processed, 2);
        assert_eq!(aggregate.total_duration_ms, 200.0);
        assert_eq!(aggregate.last_processed_at, Some(at(2)));
        assert!(repo.get_tracking("j1").await.unwrap().is_none());

        let durations = repo.get_samples(SampleSeries::Duration, &job).await.unwrap();
        let values: Vec<f64> = durations.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![120.0, 80.0]);
    }

    #[tokio::test]
    async fn test_equal_values_from_different_jobs_are_kept() {
        let repo = repo(100);
        let job = JobIdentity::new("redis", "default", "SendEmail");
        for i in 0..5 {
            repo.record_completion(&sample(&format!("j{i}"), 100.0, i)).await.unwrap();
        }
        assert_eq!(repo.get_samples(SampleSeries::Duration, &job).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_samples_trimmed_to_most_recent() {
        let repo = repo(3);
        let job = JobIdentity::new("redis", "default", "SendEmail");
        for i in 0..6 {
            repo.record_completion(&sample(&format!("j{i}"), i as f64, i)).await.unwrap();
        }

        let values: Vec<f64> = repo
            .get_samples(SampleSeries::Duration, &job)
            .await
            .unwrap()
            .iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);
        assert_eq!(repo.get_aggregate(&job).await.unwrap().total_processed, 6);
    }

    #[tokio::test]
    async fn test_failure_truncates_exception() {
        let repo = repo(100);
        let job = JobIdentity::new("redis", "default", "SendEmail");
        let long = "x".repeat(MAX_EXCEPTION_LENGTH + 500);
        repo.record_failure("j1", &job, &long, at(5)).await.unwrap();

        let aggregate = repo.get_aggregate(&job).await.unwrap();
        assert_eq!(aggregate.total_failed, 1);
        assert_eq!(aggregate.last_failed_at, Some(at(5)));
        assert_eq!(
            aggregate.last_exception.map(|e| e.len()),
            Some(MAX_EXCEPTION_LENGTH)
        );
    }

    #[tokio::test]
    async fn test_auxiliary_counters_leave_totals_alone() {
        let repo = repo(100);
        let job = JobIdentity::new("redis", "default", "SendEmail");
        repo.record_timeout(&job, at(0)).await.unwrap();
        repo.record_exception(&job, "RuntimeError", at(0)).await.unwrap();
        repo.record_exception(&job, "RuntimeError", at(1)).await.unwrap();
        repo.record_retry_requested(&job, 2, at(2)).await.unwrap();

        let aggregate = repo.get_aggregate(&job).await.unwrap();
        assert_eq!(aggregate.total_processed, 0);
        assert_eq!(aggregate.total_failed, 0);
        assert_eq!(aggregate.total_timeouts, 1);
        assert_eq!(aggregate.total_exceptions, 2);
        assert_eq!(aggregate.total_retries, 1);
        assert_eq!(aggregate.last_retry_attempt, Some(2));

        let counts = repo.get_exception_counts(&job).await.unwrap();
        assert_eq!(counts.get("RuntimeError"), Some(&2));
    }

    #[tokio::test]
    async fn test_cleanup_removes_idle_jobs() {
        let repo = repo(100);
        let old = JobIdentity::new("redis", "default", "Old");
        let fresh = JobIdentity::new("redis", "default", "Fresh");
        repo.record_completion(&JobSample {
            job: old.clone(),
            ..sample("a", 10.0, 0)
        })
        .await
        .unwrap();
        repo.record_completion(&JobSample {
            job: fresh.clone(),
            ..sample("b", 10.0, 3000)
        })
        .await
        .unwrap();

        let deleted = repo.cleanup(Duration::from_secs(3600), at(3700)).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.get_aggregate(&old).await.unwrap().total_processed, 0);
        assert!(repo.get_samples(SampleSeries::Duration, &old).await.unwrap().is_empty());
        assert_eq!(repo.get_aggregate(&fresh).await.unwrap().total_processed, 1);
        assert_eq!(repo.discovery.list_jobs().await.unwrap(), vec![fresh]);
    }

    #[tokio::test]
    async fn test_cleanup_handles_colons_in_queue_names() {
        let repo = repo(100);
        let job = JobIdentity::new("redis", "high:priority", "SendEmail");
        repo.record_completion(&JobSample {
            job: job.clone(),
            ..sample("a", 10.0, 0)
        })
        .await
        .unwrap();

        let deleted = repo.cleanup(Duration::from_secs(3600), at(3700)).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.get_aggregate(&job).await.unwrap().total_processed, 0);
        assert!(repo.discovery.list_jobs().await.unwrap().is_empty());
        assert!(repo.discovery.list_queues().await.unwrap().is_empty());
    }
}
