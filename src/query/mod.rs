//! # Query Facade
//!
//! Thin read side over the repositories and calculators, shaped for HTTP or
//! exporter layers that live outside this crate.

pub mod service;
pub mod types;

pub use service::MetricsQueryService;
pub use types::{HealthCheck, HealthCheckStatus, Overview, WorkerSummary};
