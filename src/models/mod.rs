//! # Data Model
//!
//! Strongly-typed values built once at the storage boundary. Stored hashes are
//! parsed through [`fields::FieldReader`], so code above this layer never
//! re-validates primitive types.

pub mod baseline;
pub mod fields;
pub mod identity;
pub mod job_metrics;
pub mod queue;
pub mod worker;

pub use baseline::{confidence_for, BaselineData};
pub use identity::{JobIdentity, QueueIdentity};
pub use job_metrics::{
    AuxiliaryCounters, CpuStats, DurationStats, ExecutionStats, FailureInfo, JobMetricsAggregate,
    JobMetricsData, JobSample, JobTracking, MemoryStats, ThroughputStats, WindowStats,
};
pub use queue::{
    calculate_health_score, HealthStatus, HistoryPoint, QueueDepthData, QueueSnapshot, QueueTrends,
};
pub use worker::{WorkerHeartbeat, WorkerIdentity, WorkerState, WorkerStats};
