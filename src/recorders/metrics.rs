//! Hot-path recorder
//!
//! Every method is best-effort: the enabled gate is checked first, storage
//! errors are logged at `warn` and swallowed, and nothing is returned to the
//! job system that could fail or slow down real work.

use super::identity::{HostProcessIdentity, WorkerIdentityProvider};
use super::lifecycle::{
    JobCompleted, JobExceptionOccurred, JobFailed, JobLifecycleObserver, JobRetryRequested,
    JobStarted, JobTimedOut, WorkerHeartbeatReported, WorkerStateChanged,
};
use crate::error::QueueMetricsResult;
use crate::events::{EventPublisher, MetricsEvent};
use crate::models::{JobSample, QueueDepthData, QueueIdentity, WorkerHeartbeat};
use crate::repositories::{
    HeartbeatUpdate, JobMetricsRepository, QueueMetricsRepository, StateTransition,
    WorkerHeartbeatRepository, WorkerProcess,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    enabled: bool,
    depth_threshold: u64,
    jobs: JobMetricsRepository,
    queues: QueueMetricsRepository,
    workers: WorkerHeartbeatRepository,
    publisher: EventPublisher,
    identity: Arc<dyn WorkerIdentityProvider>,
}

impl MetricsRecorder {
    pub fn new(
        enabled: bool,
        depth_threshold: u64,
        jobs: JobMetricsRepository,
        queues: QueueMetricsRepository,
        workers: WorkerHeartbeatRepository,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            enabled,
            depth_threshold,
            jobs,
            queues,
            workers,
            publisher,
            identity: Arc::new(HostProcessIdentity::detect()),
        }
    }

    /// Replace the worker identity used for heartbeats and transitions
    pub fn with_identity(mut self, identity: Arc<dyn WorkerIdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn worker_id(&self) -> String {
        self.identity.identity().worker_id
    }

    pub async fn record_start(&self, event: &JobStarted) {
        if !self.enabled {
            return;
        }
        let result = self
            .jobs
            .record_start(&event.job_id, &event.job, event.started_at)
            .await;
        swallow("record_start", &event.job_id, result);
    }

    pub async fn record_completion(&self, event: &JobCompleted) {
        if !self.enabled {
            return;
        }
        let result = self.try_record_completion(event).await;
        swallow("record_completion", &event.job_id, result);
    }

    async fn try_record_completion(&self, event: &JobCompleted) -> QueueMetricsResult<()> {
        let duration_ms = match event.duration_ms {
            Some(duration) => duration,
            None => self
                .jobs
                .get_tracking(&event.job_id)
                .await?
                .map(|tracking| {
                    (event.completed_at - tracking.started_at).num_milliseconds().max(0) as f64
                })
                .unwrap_or(0.0),
        };

        let sample = JobSample {
            job_id: event.job_id.clone(),
            job: event.job.clone(),
            duration_ms: non_negative(duration_ms),
            memory_mb: non_negative(event.memory_mb),
            cpu_time_ms: non_negative(event.cpu_time_ms),
            completed_at: event.completed_at,
        };
        self.jobs.record_completion(&sample).await
    }

    pub async fn record_failure(&self, event: &JobFailed) {
        if !self.enabled {
            return;
        }
        let result = self
            .jobs
            .record_failure(&event.job_id, &event.job, &event.exception, event.failed_at)
            .await;
        swallow("record_failure", &event.job_id, result);
    }

    pub async fn record_timeout(&self, event: &JobTimedOut) {
        if !self.enabled {
            return;
        }
        let result = self.jobs.record_timeout(&event.job, event.at).await;
        swallow("record_timeout", &event.job_id, result);
    }

    pub async fn record_exception(&self, event: &JobExceptionOccurred) {
        if !self.enabled {
            return;
        }
        let result = self
            .jobs
            .record_exception(&event.job, &event.exception_class, event.at)
            .await;
        swallow("record_exception", &event.job_id, result);
    }

    pub async fn record_retry_requested(&self, event: &JobRetryRequested) {
        if !self.enabled {
            return;
        }
        let result = self
            .jobs
            .record_retry_requested(&event.job, event.attempt, event.at)
            .await;
        swallow("record_retry_requested", &event.job_id, result);
    }

    /// Append a depth reading; publishes a threshold event when `depth`
    /// exceeds the configured threshold
    pub async fn record_queue_depth(&self, queue: &QueueIdentity, depth: u64, measured_at: DateTime<Utc>) {
        if !self.enabled {
            return;
        }
        let result = self.queues.record_depth_history(queue, depth, measured_at).await;
        swallow("record_queue_depth", &queue.to_string(), result);

        if depth > self.depth_threshold {
            let reading = QueueDepthData {
                pending_jobs: depth,
                ..QueueDepthData::empty(queue, measured_at)
            };
            let event = MetricsEvent::threshold_exceeded(reading, self.depth_threshold);
            debug!(queue = %queue, depth, threshold = self.depth_threshold, "Queue depth threshold exceeded");
            self.publisher.publish(event);
        }
    }

    pub async fn record_throughput(&self, queue: &QueueIdentity, jobs_per_minute: f64, measured_at: DateTime<Utc>) {
        if !self.enabled {
            return;
        }
        let result = self
            .queues
            .record_throughput_history(queue, non_negative(jobs_per_minute), measured_at)
            .await;
        swallow("record_throughput", &queue.to_string(), result);
    }

    /// Heartbeat for this process's worker, or for `event.worker_id` when
    /// relayed; returns the stored record
    pub async fn record_worker_heartbeat(&self, event: &WorkerHeartbeatReported) -> Option<WorkerHeartbeat> {
        if !self.enabled {
            return None;
        }
        let (worker_id, process) = self.resolve_worker(event.worker_id.as_deref());
        let update = HeartbeatUpdate {
            worker_id,
            process,
            connection: event.queue.connection.clone(),
            queue: event.queue.queue.clone(),
            state: event.state,
            current_job_id: event.current_job_id.clone(),
            current_job_class: event.current_job_class.clone(),
            at: event.at,
        };
        let result = self.workers.record_heartbeat(&update).await;
        swallow_value("record_worker_heartbeat", &update.worker_id, result)
    }

    pub async fn transition_worker_state(&self, event: &WorkerStateChanged) -> Option<WorkerHeartbeat> {
        if !self.enabled {
            return None;
        }
        let (worker_id, process) = self.resolve_worker(event.worker_id.as_deref());
        if let Some(reason) = &event.reason {
            debug!(worker_id = %worker_id, state = %event.new_state, reason = %reason, "Worker state transition");
        }
        let transition = StateTransition {
            worker_id,
            process,
            queue: event.queue.clone(),
            state: event.new_state,
            at: event.at,
        };
        let result = self.workers.transition_state(&transition).await;
        swallow_value("transition_worker_state", &transition.worker_id, result)
    }

    /// Explicit ids other than our own carry no process details
    fn resolve_worker(&self, explicit: Option<&str>) -> (String, Option<WorkerProcess>) {
        let own = self.identity.identity();
        match explicit {
            Some(id) if id != own.worker_id => (id.to_string(), None),
            _ => {
                let process = WorkerProcess::from(&own);
                (own.worker_id, Some(process))
            }
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn swallow(operation: &str, subject: &str, result: QueueMetricsResult<()>) {
    swallow_value(operation, subject, result);
}

fn swallow_value<T>(operation: &str, subject: &str, result: QueueMetricsResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(
                operation = operation,
                subject = %subject,
                error = %error,
                "Failed to record queue metrics"
            );
            None
        }
    }
}

#[async_trait]
impl JobLifecycleObserver for MetricsRecorder {
    async fn on_job_start(&self, event: &JobStarted) {
        self.record_start(event).await;
    }

    async fn on_job_complete(&self, event: &JobCompleted) {
        self.record_completion(event).await;
    }

    async fn on_job_failed(&self, event: &JobFailed) {
        self.record_failure(event).await;
    }

    async fn on_job_timeout(&self, event: &JobTimedOut) {
        self.record_timeout(event).await;
    }

    async fn on_job_exception(&self, event: &JobExceptionOccurred) {
        self.record_exception(event).await;
    }

    async fn on_job_retry_requested(&self, event: &JobRetryRequested) {
        self.record_retry_requested(event).await;
    }

    async fn on_worker_heartbeat(&self, event: &WorkerHeartbeatReported) {
        self.record_worker_heartbeat(event).await;
    }

    async fn on_worker_state_change(&self, event: &WorkerStateChanged) {
        self.transition_worker_state(event).await;
    }
}
