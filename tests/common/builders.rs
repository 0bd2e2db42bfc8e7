//! Lifecycle event builders

use chrono::{DateTime, Utc};
use queue_metrics::models::fields::truncate_to_seconds;
use queue_metrics::models::{JobIdentity, QueueIdentity, WorkerState};
use queue_metrics::recorders::{
    JobCompleted, JobFailed, JobStarted, WorkerHeartbeatReported, WorkerStateChanged,
};
use std::sync::atomic::{AtomicUsize, Ordering};

static JOB_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// Current time at whole-second precision, matching what the store keeps
pub fn now_seconds() -> DateTime<Utc> {
    truncate_to_seconds(Utc::now())
}

pub fn next_job_id() -> String {
    format!("job-{}", JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

pub fn job(queue: &str, class: &str) -> JobIdentity {
    JobIdentity::new("redis", queue, class)
}

pub fn started(job: &JobIdentity, job_id: &str, at: DateTime<Utc>) -> JobStarted {
    JobStarted {
        job_id: job_id.to_string(),
        job: job.clone(),
        started_at: at,
    }
}

/// Builder for completion events with sensible defaults
pub struct CompletionBuilder {
    event: JobCompleted,
}

impl CompletionBuilder {
    pub fn new(job: &JobIdentity) -> Self {
        Self {
            event: JobCompleted {
                job_id: next_job_id(),
                job: job.clone(),
                duration_ms: Some(100.0),
                memory_mb: 16.0,
                cpu_time_ms: 40.0,
                completed_at: Utc::now(),
            },
        }
    }

    pub fn id(mut self, job_id: &str) -> Self {
        self.event.job_id = job_id.to_string();
        self
    }

    pub fn duration(mut self, duration_ms: f64) -> Self {
        self.event.duration_ms = Some(duration_ms);
        self
    }

    pub fn without_duration(mut self) -> Self {
        self.event.duration_ms = None;
        self
    }

    pub fn memory(mut self, memory_mb: f64) -> Self {
        self.event.memory_mb = memory_mb;
        self
    }

    pub fn cpu(mut self, cpu_time_ms: f64) -> Self {
        self.event.cpu_time_ms = cpu_time_ms;
        self
    }

    pub fn at(mut self, completed_at: DateTime<Utc>) -> Self {
        self.event.completed_at = completed_at;
        self
    }

    pub fn build(self) -> JobCompleted {
        self.event
    }
}

pub fn failed(job: &JobIdentity, exception: &str, at: DateTime<Utc>) -> JobFailed {
    JobFailed {
        job_id: next_job_id(),
        job: job.clone(),
        exception: exception.to_string(),
        failed_at: at,
    }
}

pub fn heartbeat(queue: &QueueIdentity, state: WorkerState, at: DateTime<Utc>) -> WorkerHeartbeatReported {
    WorkerHeartbeatReported {
        worker_id: None,
        queue: queue.clone(),
        state,
        current_job_id: None,
        current_job_class: None,
        at,
    }
}

pub fn state_change(state: WorkerState, at: DateTime<Utc>) -> WorkerStateChanged {
    WorkerStateChanged {
        worker_id: None,
        queue: None,
        new_state: state,
        reason: None,
        at,
    }
}
