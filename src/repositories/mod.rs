//! # Repositories
//!
//! Typed reads and writes over the key scheme in [`crate::storage::KeyBuilder`].
//! Repositories hold no state of their own; every call goes to the store.

pub mod baseline;
pub mod discovery;
pub mod job_metrics;
pub mod queue_metrics;
pub mod worker_heartbeat;

pub use baseline::BaselineRepository;
pub use discovery::DiscoveryRepository;
pub use job_metrics::{JobMetricsRepository, SampleSeries, TimedSample};
pub use queue_metrics::QueueMetricsRepository;
pub use worker_heartbeat::{HeartbeatUpdate, StateTransition, WorkerHeartbeatRepository, WorkerProcess};
