//! Per-job-class statistics

use super::stats::{self, Summary};
use super::RunReport;
use crate::constants::{STATS_WINDOWS_SECONDS, THROUGHPUT_WINDOW_SECONDS};
use crate::error::QueueMetricsResult;
use crate::events::{EventPublisher, MetricsEvent};
use crate::models::{
    AuxiliaryCounters, CpuStats, DurationStats, ExecutionStats, FailureInfo, JobIdentity,
    JobMetricsData, MemoryStats, ThroughputStats, WindowStats,
};
use crate::repositories::{DiscoveryRepository, JobMetricsRepository, SampleSeries};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct JobMetricsCalculator {
    jobs: JobMetricsRepository,
    discovery: DiscoveryRepository,
    publisher: EventPublisher,
}

impl JobMetricsCalculator {
    pub fn new(jobs: JobMetricsRepository, discovery: DiscoveryRepository, publisher: EventPublisher) -> Self {
        Self {
            jobs,
            discovery,
            publisher,
        }
    }

    pub async fn calculate(&self, job: &JobIdentity) -> QueueMetricsResult<JobMetricsData> {
        self.calculate_at(job, Utc::now()).await
    }

    /// Metrics for `job` as of `now`. A job class with no stored data yields
    /// zero-valued metrics.
    pub async fn calculate_at(&self, job: &JobIdentity, now: DateTime<Utc>) -> QueueMetricsResult<JobMetricsData> {
        let aggregate = self.jobs.get_aggregate(job).await?;
        let durations = self.jobs.get_samples(SampleSeries::Duration, job).await?;
        let memory = self.jobs.get_samples(SampleSeries::Memory, job).await?;
        let cpu = self.jobs.get_samples(SampleSeries::Cpu, job).await?;

        let duration_summary = Summary::of(durations.iter().map(|s| s.value));
        let memory_summary = Summary::of(memory.iter().map(|s| s.value));
        let cpu_summary = Summary::of(cpu.iter().map(|s| s.value));

        // counters survive sample trimming, so averages come from the sums
        let (avg_duration, avg_memory, avg_cpu) = if aggregate.total_processed > 0 {
            (
                aggregate.avg_duration_ms(),
                aggregate.avg_memory_mb(),
                aggregate.avg_cpu_time_ms(),
            )
        } else {
            (duration_summary.avg, memory_summary.avg, cpu_summary.avg)
        };

        let per_minute = self
            .jobs
            .count_completions_since(job, now - Duration::seconds(THROUGHPUT_WINDOW_SECONDS))
            .await?;
        let per_hour = self
            .jobs
            .count_completions_since(job, now - Duration::hours(1))
            .await?;

        let window_stats = STATS_WINDOWS_SECONDS
            .iter()
            .map(|&window_seconds| window_stats(&durations, window_seconds, now))
            .collect();

        let exceptions_by_class = self.jobs.get_exception_counts(job).await?;

        let failure_rate = stats::failure_rate(aggregate.total_processed, aggregate.total_failed);

        Ok(JobMetricsData {
            job_class: job.job_class.clone(),
            connection: job.connection.clone(),
            queue: job.queue.clone(),
            execution: ExecutionStats {
                total_queued: aggregate.total_queued,
                total_processed: aggregate.total_processed,
                total_failed: aggregate.total_failed,
                success_rate: aggregate.success_rate(),
            },
            duration: DurationStats {
                avg: avg_duration,
                min: duration_summary.min,
                max: duration_summary.max,
                p50: duration_summary.p50,
                p95: duration_summary.p95,
                p99: duration_summary.p99,
            },
            memory: MemoryStats {
                avg: avg_memory,
                peak: memory_summary.max,
                p95: memory_summary.p95,
                p99: memory_summary.p99,
            },
            cpu: CpuStats {
                avg: avg_cpu,
                p95: cpu_summary.p95,
                p99: cpu_summary.p99,
            },
            throughput: ThroughputStats {
                per_minute: per_minute as f64,
                per_hour: per_hour as f64,
            },
            failures: FailureInfo {
                count: aggregate.total_failed,
                rate: failure_rate,
                last_failed_at: aggregate.last_failed_at,
                last_exception: aggregate.last_exception.clone(),
            },
            auxiliary: AuxiliaryCounters {
                timeouts: aggregate.total_timeouts,
                exceptions: aggregate.total_exceptions,
                retries: aggregate.total_retries,
                last_retry_attempt: aggregate.last_retry_attempt,
                exceptions_by_class,
            },
            window_stats,
            calculated_at: now,
        })
    }

    /// Calculate every discovered job class, publishing a `MetricsRecorded`
    /// event for each. A failing job class is reported and skipped.
    pub async fn calculate_all(&self, now: DateTime<Utc>) -> QueueMetricsResult<RunReport<JobMetricsData>> {
        let jobs = self.discovery.list_jobs().await?;
        let mut report = RunReport::default();

        for job in jobs {
            match self.calculate_at(&job, now).await {
                Ok(metrics) => {
                    self.publisher.publish(MetricsEvent::MetricsRecorded {
                        metrics: Box::new(metrics.clone()),
                    });
                    report.succeeded.push(metrics);
                }
                Err(error) => {
                    warn!(job = %job, error = %error, "Job metrics calculation failed");
                    report.record_failure(job.to_string(), error);
                }
            }
        }

        info!(
            processed = report.processed(),
            failed = report.failures.len(),
            "Calculated job metrics"
        );
        Ok(report)
    }
}

fn window_stats(
    durations: &[crate::repositories::TimedSample],
    window_seconds: i64,
    now: DateTime<Utc>,
) -> WindowStats {
    let cutoff = (now.timestamp() - window_seconds) as f64;
    let in_window: Vec<f64> = durations
        .iter()
        .filter(|sample| sample.completed_at >= cutoff)
        .map(|sample| sample.value)
        .collect();
    let jobs_processed = in_window.len() as u64;

    debug!(window_seconds, jobs_processed, "Window stats");
    WindowStats {
        window_seconds,
        jobs_processed,
        avg_duration: stats::mean(&in_window),
        throughput: stats::per_minute(jobs_processed, window_seconds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::models::JobSample;
    use crate::storage::{KeyBuilder, StorageProvider};

    fn calculator() -> (JobMetricsCalculator, JobMetricsRepository, EventPublisher) {
        let storage = StorageProvider::memory();
        let keys = KeyBuilder::new("test");
        let jobs = JobMetricsRepository::new(storage.clone(), keys.clone(), &StorageConfig::default());
        let discovery = DiscoveryRepository::new(storage, keys);
        let publisher = EventPublisher::new(16);
        (
            JobMetricsCalculator::new(jobs.clone(), discovery, publisher.clone()),
            jobs,
            publisher,
        )
    }

    fn sample(job: &JobIdentity, id: usize, duration_ms: f64, at: DateTime<Utc>) -> JobSample {
        JobSample {
            job_id: format!("job-{id}"),
            job: job.clone(),
            duration_ms,
            memory_mb: 10.0 + id as f64,
            cpu_time_ms: duration_ms / 2.0,
            completed_at: at,
        }
    }

    #[tokio::test]
    async fn test_unknown_job_is_zero_valued() {
        let (calculator, _, _) = calculator();
        let job = JobIdentity::new("redis", "default", "Missing");
        let metrics = calculator.calculate(&job).await.unwrap();
        assert_eq!(metrics.execution, ExecutionStats::default());
        assert_eq!(metrics.duration, DurationStats::default());
        assert_eq!(metrics.failures.rate, 0.0);
        assert_eq!(metrics.window_stats.len(), 3);
        assert!(metrics.window_stats.iter().all(|w| w.jobs_processed == 0));
    }

    #[tokio::test]
    async fn test_averages_percentiles_and_windows() {
        let (calculator, jobs, _) = calculator();
        let job = JobIdentity::new("redis", "default", "SendEmail");
        let now = Utc::now();

        for i in 0..10 {
            // half recent, half twenty minutes old
            let at = if i < 5 { now - Duration::seconds(30) } else { now - Duration::minutes(20) };
            jobs.record_completion(&sample(&job, i, 100.0 * (i + 1) as f64, at))
                .await
                .unwrap();
        }
        for i in 0..3 {
            jobs.record_failure(&format!("f-{i}"), &job, "boom", now).await.unwrap();
        }

        let metrics = calculator.calculate_at(&job, now).await.unwrap();
        assert_eq!(metrics.execution.total_processed, 10);
        assert_eq!(metrics.execution.total_failed, 3);
        assert_eq!(metrics.duration.avg, 550.0);
        assert_eq!(metrics.duration.min, 100.0);
        assert_eq!(metrics.duration.max, 1000.0);
        assert_eq!(metrics.duration.p95, 1000.0);
        assert_eq!(metrics.duration.p50, 500.0);
        assert_eq!(metrics.throughput.per_minute, 5.0);
        assert_eq!(metrics.throughput.per_hour, 10.0);
        assert!((metrics.failures.rate - 300.0 / 13.0).abs() < 1e-9);
        assert_eq!(metrics.failures.last_exception.as_deref(), Some("boom"));

        let five_minutes = &metrics.window_stats[0];
        assert_eq!(five_minutes.label(), "5m");
        assert_eq!(five_minutes.jobs_processed, 5);
        assert_eq!(five_minutes.avg_duration, 300.0);
        assert_eq!(five_minutes.throughput, 1.0);
        assert_eq!(metrics.window_stats[1].jobs_processed, 10);
    }

    #[tokio::test]
    async fn test_calculate_all_publishes_per_job() {
        let (calculator, jobs, publisher) = calculator();
        let mut events = publisher.subscribe();
        let now = Utc::now();

        for class in ["A", "B"] {
            let job = JobIdentity::new("redis", "default", class);
            jobs.record_completion(&sample(&job, 1, 50.0, now)).await.unwrap();
        }

        let report = calculator.calculate_all(now).await.unwrap();
        assert_eq!(report.processed(), 2);
        assert!(report.failures.is_empty());

        for _ in 0..2 {
            let published = events.recv().await.unwrap();
            assert_eq!(published.event.name(), "metrics.recorded");
        }
    }
}
