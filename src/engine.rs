//! # Engine Wiring
//!
//! [`QueueMetrics`] owns one storage provider and builds every repository,
//! recorder, calculator and service on top of it. Collaborators that depend
//! on the host (queue inspection, worker identity, hooks) are injected through
//! [`QueueMetricsBuilder`].
//!
//! ```rust,no_run
//! use queue_metrics::config::QueueMetricsConfig;
//! use queue_metrics::QueueMetrics;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = QueueMetrics::from_config(QueueMetricsConfig::default()).await?;
//! let report = engine.aggregate().await?;
//! println!("{} queues aggregated", report.queues.processed());
//! # Ok(())
//! # }
//! ```

use crate::aggregation::{
    JobMetricsCalculator, NullQueueInspector, QueueInspector, QueueMetricsCalculator, RunReport,
    WorkerStatsAggregator,
};
use crate::baseline::BaselineCalculator;
use crate::cleanup::{CleanupPolicy, CleanupReport, CleanupService};
use crate::config::QueueMetricsConfig;
use crate::error::QueueMetricsResult;
use crate::events::{EventPublisher, PublishedEvent};
use crate::hooks::HookPipeline;
use crate::logging::log_batch_run;
use crate::models::{BaselineData, JobMetricsData, QueueSnapshot};
use crate::query::MetricsQueryService;
use crate::recorders::{JobLifecycleObserver, MetricsRecorder, WorkerIdentityProvider};
use crate::repositories::{
    BaselineRepository, DiscoveryRepository, JobMetricsRepository, QueueMetricsRepository,
    WorkerHeartbeatRepository,
};
use crate::storage::{KeyBuilder, StorageProvider};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Result of one aggregation pass over every discovered queue and job class
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationReport {
    pub queues: RunReport<QueueSnapshot>,
    pub jobs: RunReport<JobMetricsData>,
}

pub struct QueueMetricsBuilder {
    config: QueueMetricsConfig,
    inspector: Arc<dyn QueueInspector>,
    identity: Option<Arc<dyn WorkerIdentityProvider>>,
    hooks: HookPipeline,
    publisher: EventPublisher,
}

impl std::fmt::Debug for QueueMetricsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueMetricsBuilder")
            .field("inspector", &self.inspector)
            .field("identity", &self.identity)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl QueueMetricsBuilder {
    pub fn new(config: QueueMetricsConfig) -> Self {
        Self {
            config,
            inspector: Arc::new(NullQueueInspector),
            identity: None,
            hooks: HookPipeline::new(),
            publisher: EventPublisher::default(),
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn QueueInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn WorkerIdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_hooks(mut self, hooks: HookPipeline) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Validate the configuration and connect the configured backend
    pub async fn connect(self) -> QueueMetricsResult<QueueMetrics> {
        self.config.validate()?;
        let storage = StorageProvider::from_config(&self.config.storage).await?;
        Ok(self.build(storage))
    }

    pub fn build(self, storage: StorageProvider) -> QueueMetrics {
        let config = self.config;
        let keys = KeyBuilder::new(&config.storage.prefix);
        let publisher = self.publisher;

        let discovery = DiscoveryRepository::new(storage.clone(), keys.clone());
        let jobs = JobMetricsRepository::new(storage.clone(), keys.clone(), &config.storage);
        let queues =
            QueueMetricsRepository::new(storage.clone(), keys.clone(), &config.storage, &config.queue_depth);
        let workers = WorkerHeartbeatRepository::new(storage.clone(), keys.clone(), &config.storage);
        let baselines = BaselineRepository::new(storage.clone(), keys, &config.storage);

        let mut recorder = MetricsRecorder::new(
            config.enabled,
            config.queue_depth.threshold,
            jobs.clone(),
            queues.clone(),
            workers.clone(),
            publisher.clone(),
        );
        if let Some(identity) = self.identity {
            recorder = recorder.with_identity(identity);
        }

        let worker_stats =
            WorkerStatsAggregator::new(workers.clone(), config.worker_heartbeat.stale_threshold());
        let job_metrics = JobMetricsCalculator::new(jobs.clone(), discovery.clone(), publisher.clone());
        let queue_metrics = QueueMetricsCalculator::new(
            jobs.clone(),
            queues.clone(),
            discovery.clone(),
            worker_stats.clone(),
            self.inspector,
        );
        let baseline = BaselineCalculator::new(
            jobs.clone(),
            discovery.clone(),
            baselines.clone(),
            publisher.clone(),
            config.baseline.clone(),
        );
        let query = MetricsQueryService::new(
            storage.clone(),
            discovery,
            queues.clone(),
            workers.clone(),
            baselines.clone(),
            job_metrics.clone(),
            worker_stats,
            self.hooks,
        );
        let cleanup = CleanupService::new(storage.clone(), jobs, queues, workers, baselines);

        QueueMetrics {
            config,
            storage,
            publisher,
            recorder,
            job_metrics,
            queue_metrics,
            baseline,
            query,
            cleanup,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueMetrics {
    config: QueueMetricsConfig,
    storage: StorageProvider,
    publisher: EventPublisher,
    recorder: MetricsRecorder,
    job_metrics: JobMetricsCalculator,
    queue_metrics: QueueMetricsCalculator,
    baseline: BaselineCalculator,
    query: MetricsQueryService,
    cleanup: CleanupService,
}

impl QueueMetrics {
    pub fn builder(config: QueueMetricsConfig) -> QueueMetricsBuilder {
        QueueMetricsBuilder::new(config)
    }

    pub async fn from_config(config: QueueMetricsConfig) -> QueueMetricsResult<Self> {
        QueueMetricsBuilder::new(config).connect().await
    }

    /// Build on an existing provider, e.g. a shared in-memory store in tests
    pub fn with_provider(config: QueueMetricsConfig, storage: StorageProvider) -> Self {
        QueueMetricsBuilder::new(config).build(storage)
    }

    pub fn config(&self) -> &QueueMetricsConfig {
        &self.config
    }

    pub fn storage(&self) -> &StorageProvider {
        &self.storage
    }

    pub fn recorder(&self) -> &MetricsRecorder {
        &self.recorder
    }

    /// The recorder as an observer for the host's job lifecycle hooks
    pub fn observer(&self) -> Arc<dyn JobLifecycleObserver> {
        Arc::new(self.recorder.clone())
    }

    pub fn job_metrics(&self) -> &JobMetricsCalculator {
        &self.job_metrics
    }

    pub fn queue_metrics(&self) -> &QueueMetricsCalculator {
        &self.queue_metrics
    }

    pub fn baselines(&self) -> &BaselineCalculator {
        &self.baseline
    }

    pub fn query(&self) -> &MetricsQueryService {
        &self.query
    }

    pub fn cleanup_service(&self) -> &CleanupService {
        &self.cleanup
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.publisher.subscribe()
    }

    pub async fn aggregate(&self) -> QueueMetricsResult<AggregationReport> {
        self.aggregate_at(Utc::now()).await
    }

    /// Queue snapshots then job-class metrics for everything discovered
    pub async fn aggregate_at(&self, now: DateTime<Utc>) -> QueueMetricsResult<AggregationReport> {
        let started = Instant::now();
        let queues = self.queue_metrics.calculate_all(now).await?;
        let jobs = self.job_metrics.calculate_all(now).await?;

        log_batch_run(
            "aggregate",
            queues.processed() + jobs.processed(),
            queues.failures.len() + jobs.failures.len(),
            0,
            started.elapsed().as_millis(),
        );
        Ok(AggregationReport { queues, jobs })
    }

    pub async fn recalculate_baselines(&self, force: bool) -> QueueMetricsResult<RunReport<BaselineData>> {
        let started = Instant::now();
        let report = self.baseline.calculate_all(force, Utc::now()).await?;
        log_batch_run(
            "recalculate_baselines",
            report.processed(),
            report.failures.len(),
            report.skipped,
            started.elapsed().as_millis(),
        );
        Ok(report)
    }

    /// Sweep with the retention derived from the configured TTLs
    pub async fn cleanup(&self) -> QueueMetricsResult<CleanupReport> {
        self.cleanup.run(&CleanupPolicy::from_config(&self.config)).await
    }
}
