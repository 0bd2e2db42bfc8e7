//! Lifecycle event intake
//!
//! The surrounding job system calls a [`LifecycleDispatcher`] (or any single
//! [`JobLifecycleObserver`]) from its own event hooks; the engine never binds
//! to a particular framework's event bus.

use crate::models::{JobIdentity, QueueIdentity, WorkerState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct JobStarted {
    pub job_id: String,
    pub job: JobIdentity,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobCompleted {
    pub job_id: String,
    pub job: JobIdentity,
    /// Derived from the start record when absent
    pub duration_ms: Option<f64>,
    pub memory_mb: f64,
    pub cpu_time_ms: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobFailed {
    pub job_id: String,
    pub job: JobIdentity,
    pub exception: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobTimedOut {
    pub job_id: String,
    pub job: JobIdentity,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobExceptionOccurred {
    pub job_id: String,
    pub job: JobIdentity,
    pub exception_class: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRetryRequested {
    pub job_id: String,
    pub job: JobIdentity,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

/// `worker_id` is `None` for the recording process's own worker; a collector
/// relaying reports for other workers sets it explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerHeartbeatReported {
    pub worker_id: Option<String>,
    pub queue: QueueIdentity,
    pub state: WorkerState,
    pub current_job_id: Option<String>,
    pub current_job_class: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStateChanged {
    pub worker_id: Option<String>,
    /// Assigned only when the worker has no record yet
    pub queue: Option<QueueIdentity>,
    pub new_state: WorkerState,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Receives job and worker lifecycle callbacks. Every method defaults to a
/// no-op so observers implement only what they need.
#[async_trait]
pub trait JobLifecycleObserver: Send + Sync {
    async fn on_job_start(&self, _event: &JobStarted) {}

    async fn on_job_complete(&self, _event: &JobCompleted) {}

    async fn on_job_failed(&self, _event: &JobFailed) {}

    async fn on_job_timeout(&self, _event: &JobTimedOut) {}

    async fn on_job_exception(&self, _event: &JobExceptionOccurred) {}

    async fn on_job_retry_requested(&self, _event: &JobRetryRequested) {}

    async fn on_worker_heartbeat(&self, _event: &WorkerHeartbeatReported) {}

    async fn on_worker_state_change(&self, _event: &WorkerStateChanged) {}
}

/// Forwards every callback to each registered observer in registration order
#[derive(Clone, Default)]
pub struct LifecycleDispatcher {
    observers: Vec<Arc<dyn JobLifecycleObserver>>,
}

impl std::fmt::Debug for LifecycleDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleDispatcher")
            .field("observers", &self.observers.len())
            .finish()
    }
}

macro_rules! forward {
    ($self:ident, $method:ident, $event:ident) => {
        for observer in &$self.observers {
            observer.$method($event).await;
        }
    };
}

impl LifecycleDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn JobLifecycleObserver>) {
        self.observers.push(observer);
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobLifecycleObserver>) -> Self {
        self.register(observer);
        self
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

#[async_trait]
impl JobLifecycleObserver for LifecycleDispatcher {
    async fn on_job_start(&self, event: &JobStarted) {
        forward!(self, on_job_start, event);
    }

    async fn on_job_complete(&self, event: &JobCompleted) {
        forward!(self, on_job_complete, event);
    }

    async fn on_job_failed(&self, event: &JobFailed) {
        forward!(self, on_job_failed, event);
    }

    async fn on_job_timeout(&self, event: &JobTimedOut) {
        forward!(self, on_job_timeout, event);
    }

    async fn on_job_exception(&self, event: &JobExceptionOccurred) {
        forward!(self, on_job_exception, event);
    }

    async fn on_job_retry_requested(&self, event: &JobRetryRequested) {
        forward!(self, on_job_retry_requested, event);
    }

    async fn on_worker_heartbeat(&self, event: &WorkerHeartbeatReported) {
        forward!(self, on_worker_heartbeat, event);
    }

    async fn on_worker_state_change(&self, event: &WorkerStateChanged) {
        forward!(self, on_worker_state_change, event);
    }
}
