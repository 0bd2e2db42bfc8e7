//! Exponentially blended capacity baselines
//!
//! A queue's first baseline is seeded from one window of samples. Later
//! windows are blended in as
//! `decay * window + (1 - decay) * previous`, and the sample count accumulates
//! up to the target sample size, so confidence never exceeds 1.0.

use super::schedule::RecalculationSchedule;
use crate::aggregation::{stats, RunReport};
use crate::config::BaselineConfig;
use crate::error::QueueMetricsResult;
use crate::events::{EventPublisher, MetricsEvent};
use crate::models::{confidence_for, BaselineData, QueueIdentity};
use crate::repositories::{BaselineRepository, DiscoveryRepository, JobMetricsRepository, SampleSeries};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Averages observed over one sliding window, across all job classes of a queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowObservation {
    pub sample_count: u64,
    pub cpu_percent_per_job: f64,
    pub memory_mb_per_job: f64,
    pub avg_duration_ms: f64,
}

impl WindowObservation {
    /// CPU share of wall time, from summed CPU and wall durations
    pub fn from_samples(durations: &[f64], memory: &[f64], cpu: &[f64]) -> Self {
        let total_duration: f64 = durations.iter().sum();
        let cpu_percent_per_job = if total_duration > 0.0 {
            cpu.iter().sum::<f64>() / total_duration * 100.0
        } else {
            0.0
        };

        Self {
            sample_count: durations.len() as u64,
            cpu_percent_per_job,
            memory_mb_per_job: stats::mean(memory),
            avg_duration_ms: stats::mean(durations),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

#[derive(Debug, Clone)]
pub struct BaselineCalculator {
    jobs: JobMetricsRepository,
    discovery: DiscoveryRepository,
    baselines: BaselineRepository,
    publisher: EventPublisher,
    schedule: RecalculationSchedule,
    config: BaselineConfig,
}

impl BaselineCalculator {
    pub fn new(
        jobs: JobMetricsRepository,
        discovery: DiscoveryRepository,
        baselines: BaselineRepository,
        publisher: EventPublisher,
        config: BaselineConfig,
    ) -> Self {
        Self {
            jobs,
            discovery,
            baselines,
            publisher,
            schedule: RecalculationSchedule::new(config.clone()),
            config,
        }
    }

    pub fn schedule(&self) -> &RecalculationSchedule {
        &self.schedule
    }

    /// Samples within the sliding window across every job class of `queue`
    pub async fn observe(&self, queue: &QueueIdentity, now: DateTime<Utc>) -> QueueMetricsResult<WindowObservation> {
        let window = chrono::Duration::from_std(self.config.sliding_window()).unwrap_or(chrono::Duration::days(7));
        let since = now - window;
        let mut durations = Vec::new();
        let mut memory = Vec::new();
        let mut cpu = Vec::new();

        for job in self.discovery.list_jobs_for_queue(queue).await? {
            for (series, target) in [
                (SampleSeries::Duration, &mut durations),
                (SampleSeries::Memory, &mut memory),
                (SampleSeries::Cpu, &mut cpu),
            ] {
                let samples = self.jobs.get_samples_since(series, &job, since).await?;
                target.extend(samples.into_iter().map(|s| s.value));
            }
        }

        Ok(WindowObservation::from_samples(&durations, &memory, &cpu))
    }

    /// Recalculate and store the baseline for `queue`. Returns `None` when the
    /// window holds no samples; any existing baseline is then left untouched.
    pub async fn calculate(&self, queue: &QueueIdentity, now: DateTime<Utc>) -> QueueMetricsResult<Option<BaselineData>> {
        let observation = self.observe(queue, now).await?;
        if observation.is_empty() {
            debug!(queue = %queue, "No samples in baseline window");
            return Ok(None);
        }

        let previous = self.baselines.get_baseline(queue).await?;
        let baseline = self.next_baseline(queue, previous.as_ref(), &observation, now);
        self.baselines.store_baseline(&baseline).await?;

        if baseline.significant_deviation {
            info!(
                queue = %queue,
                avg_duration_ms = observation.avg_duration_ms,
                "Baseline window deviates significantly"
            );
        }
        self.publisher.publish(MetricsEvent::BaselineRecalculated {
            connection: queue.connection.clone(),
            queue: queue.queue.clone(),
            baseline: baseline.clone(),
            significant_change: baseline.significant_deviation,
        });

        Ok(Some(baseline))
    }

    /// Seed from `observation`, or blend it into `previous`
    pub fn next_baseline(
        &self,
        queue: &QueueIdentity,
        previous: Option<&BaselineData>,
        observation: &WindowObservation,
        now: DateTime<Utc>,
    ) -> BaselineData {
        let target = self.config.target_sample_size;

        let Some(previous) = previous else {
            let sample_count = observation.sample_count;
            return BaselineData {
                connection: queue.connection.clone(),
                queue: queue.queue.clone(),
                cpu_percent_per_job: observation.cpu_percent_per_job,
                memory_mb_per_job: observation.memory_mb_per_job,
                avg_duration_ms: observation.avg_duration_ms,
                sample_count,
                confidence_score: confidence_for(sample_count, target),
                calculated_at: now,
                significant_deviation: false,
            };
        };

        let decay = self.config.decay_factor;
        let blend = |current: f64, old: f64| decay * current + (1.0 - decay) * old;
        let sample_count = (previous.sample_count + observation.sample_count).min(target.max(previous.sample_count));
        let significant_deviation =
            self.config.deviation.enabled && deviation_ratio(previous, observation) > self.config.deviation.threshold;

        BaselineData {
            connection: queue.connection.clone(),
            queue: queue.queue.clone(),
            cpu_percent_per_job: blend(observation.cpu_percent_per_job, previous.cpu_percent_per_job),
            memory_mb_per_job: blend(observation.memory_mb_per_job, previous.memory_mb_per_job),
            avg_duration_ms: blend(observation.avg_duration_ms, previous.avg_duration_ms),
            sample_count,
            confidence_score: confidence_for(sample_count, target).max(previous.confidence_score),
            calculated_at: now,
            significant_deviation,
        }
    }

    /// Recalculate every discovered queue that is due (all of them when
    /// `force` is set)
    pub async fn calculate_all(&self, force: bool, now: DateTime<Utc>) -> QueueMetricsResult<RunReport<BaselineData>> {
        let queues = self.discovery.list_queues().await?;
        let mut report = RunReport::default();

        for queue in queues {
            let result = async {
                if !force {
                    let existing = self.baselines.get_baseline(&queue).await?;
                    if !self.schedule.is_due(existing.as_ref(), now) {
                        return Ok(None);
                    }
                }
                self.calculate(&queue, now).await
            }
            .await;

            match result {
                Ok(Some(baseline)) => report.succeeded.push(baseline),
                Ok(None) => report.skipped += 1,
                Err(error) => {
                    warn!(queue = %queue, error = %error, "Baseline calculation failed");
                    report.record_failure(queue.to_string(), error);
                }
            }
        }

        info!(
            calculated = report.processed(),
            skipped = report.skipped,
            failed = report.failures.len(),
            "Recalculated baselines"
        );
        Ok(report)
    }
}

/// Largest relative change between the window and the stored baseline over
/// the metrics both sides measured, as a multiple (`2.0` = doubled or halved)
pub fn deviation_ratio(previous: &BaselineData, observation: &WindowObservation) -> f64 {
    [
        (previous.avg_duration_ms, observation.avg_duration_ms),
        (previous.memory_mb_per_job, observation.memory_mb_per_job),
        (previous.cpu_percent_per_job, observation.cpu_percent_per_job),
    ]
    .into_iter()
    .filter(|(old, new)| *old > 0.0 && *new > 0.0)
    .map(|(old, new)| (new / old).max(old / new))
    .fold(1.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::models::{JobIdentity, JobSample};
    use crate::storage::{KeyBuilder, StorageProvider};

    struct Fixture {
        calculator: BaselineCalculator,
        jobs: JobMetricsRepository,
        publisher: EventPublisher,
    }

    fn fixture() -> Fixture {
        let storage = StorageProvider::memory();
        let keys = KeyBuilder::new("test");
        let config = StorageConfig::default();
        let jobs = JobMetricsRepository::new(storage.clone(), keys.clone(), &config);
        let publisher = EventPublisher::new(16);
        let calculator = BaselineCalculator::new(
            jobs.clone(),
            DiscoveryRepository::new(storage.clone(), keys.clone()),
            BaselineRepository::new(storage, keys, &config),
            publisher.clone(),
            BaselineConfig::default(),
        );
        Fixture {
            calculator,
            jobs,
            publisher,
        }
    }

    async fn complete(jobs: &JobMetricsRepository, count: usize, duration_ms: f64, at: DateTime<Utc>) {
        let job = JobIdentity::new("redis", "default", "Report");
        for i in 0..count {
            jobs.record_completion(&JobSample {
                job_id: format!("{duration_ms}-{i}"),
                job: job.clone(),
                duration_ms,
                memory_mb: 32.0,
                cpu_time_ms: duration_ms / 4.0,
                completed_at: at,
            })
            .await
            .unwrap();
        }
    }

    fn observation(count: u64, duration: f64) -> WindowObservation {
        WindowObservation {
            sample_count: count,
            cpu_percent_per_job: 25.0,
            memory_mb_per_job: 32.0,
            avg_duration_ms: duration,
        }
    }

    #[test]
    fn test_blend_and_sample_cap() {
        let f = fixture();
        let queue = QueueIdentity::new("redis", "default");
        let now = Utc::now();

        let seeded = f.calculator.next_baseline(&queue, None, &observation(150, 100.0), now);
        assert_eq!(seeded.sample_count, 150);
        assert_eq!(seeded.confidence_score, 0.75);
        assert!(!seeded.significant_deviation);

        let blended = f.calculator.next_baseline(&queue, Some(&seeded), &observation(150, 200.0), now);
        assert!((blended.avg_duration_ms - 110.0).abs() < 1e-9);
        assert_eq!(blended.sample_count, 200);
        assert_eq!(blended.confidence_score, 1.0);
        // 2.0x is not more than the 2.0 threshold
        assert!(!blended.significant_deviation);

        let spiked = f.calculator.next_baseline(&queue, Some(&seeded), &observation(10, 250.0), now);
        assert!(spiked.significant_deviation);
    }

    #[test]
    fn test_window_observation() {
        let observation = WindowObservation::from_samples(&[100.0, 300.0], &[10.0, 30.0], &[50.0, 50.0]);
        assert_eq!(observation.sample_count, 2);
        assert_eq!(observation.avg_duration_ms, 200.0);
        assert_eq!(observation.memory_mb_per_job, 20.0);
        assert_eq!(observation.cpu_percent_per_job, 25.0);
        assert!(WindowObservation::from_samples(&[], &[], &[]).is_empty());
    }

    #[tokio::test]
    async fn test_calculate_seeds_and_publishes() {
        let f = fixture();
        let mut events = f.publisher.subscribe();
        let now = Utc::now();
        let queue = QueueIdentity::new("redis", "default");

        assert_eq!(f.calculator.calculate(&queue, now).await.unwrap(), None);

        complete(&f.jobs, 20, 120.0, now).await;
        let baseline = f.calculator.calculate(&queue, now).await.unwrap().unwrap();
        assert_eq!(baseline.sample_count, 20);
        assert_eq!(baseline.avg_duration_ms, 120.0);
        assert_eq!(baseline.cpu_percent_per_job, 25.0);
        assert_eq!(baseline.confidence_score, 0.1);

        let published = events.recv().await.unwrap();
        assert_eq!(published.event.name(), "baseline.recalculated");
    }

    #[tokio::test]
    async fn test_calculate_all_skips_fresh_baselines() {
        let f = fixture();
        let now = Utc::now();
        complete(&f.jobs, 5, 100.0, now).await;

        let first = f.calculator.calculate_all(false, now).await.unwrap();
        assert_eq!(first.processed(), 1);

        let second = f.calculator.calculate_all(false, now).await.unwrap();
        assert_eq!(second.processed(), 0);
        assert_eq!(second.skipped, 1);

        let forced = f.calculator.calculate_all(true, now).await.unwrap();
        assert_eq!(forced.processed(), 1);
    }
}
