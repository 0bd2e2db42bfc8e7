//! # Event Recorders
//!
//! Ingest job and worker lifecycle signals and turn each into one batched
//! store mutation.

pub mod identity;
pub mod lifecycle;
pub mod metrics;

pub use identity::{HostProcessIdentity, SupervisorIdentity, WorkerIdentityProvider};
pub use lifecycle::{
    JobCompleted, JobExceptionOccurred, JobFailed, JobLifecycleObserver, JobRetryRequested,
    JobStarted, JobTimedOut, LifecycleDispatcher, WorkerHeartbeatReported, WorkerStateChanged,
};
pub use metrics::MetricsRecorder;
