#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, HINCRBYFLOAT in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Queue Metrics
//!
//! Metrics aggregation and storage engine for background job queues.
//!
//! ## Overview
//!
//! Worker processes report job and worker lifecycle events; the engine turns
//! each into one batched write against a key/value + sorted-set store. A
//! scheduled pass then derives per-job-class statistics, per-queue snapshots
//! with a health score, worker rollups and per-queue capacity baselines. The
//! store is the only shared state, so any number of producers can record
//! concurrently.
//!
//! ## Module Organization
//!
//! - [`storage`] - Store abstraction with memory, Redis and PostgreSQL drivers
//! - [`models`] - Typed values parsed once at the storage boundary
//! - [`repositories`] - Key scheme and typed reads/writes
//! - [`recorders`] - Hot-path event intake, best-effort
//! - [`aggregation`] - Job, queue and worker statistics
//! - [`baseline`] - Capacity baselines and their recalculation schedule
//! - [`query`] - Read-only projections for presentation layers
//! - [`events`] - Notifications for autoscalers and capacity planners
//! - [`hooks`] - Payload transformers applied by the query facade
//! - [`cleanup`] - Retention sweep
//! - [`config`] - Configuration loading and validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use queue_metrics::config::QueueMetricsConfig;
//! use queue_metrics::models::JobIdentity;
//! use queue_metrics::recorders::JobCompleted;
//! use queue_metrics::QueueMetrics;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = QueueMetrics::from_config(QueueMetricsConfig::default()).await?;
//!
//! engine
//!     .recorder()
//!     .record_completion(&JobCompleted {
//!         job_id: "42".to_string(),
//!         job: JobIdentity::new("redis", "default", "SendInvoice"),
//!         duration_ms: Some(180.0),
//!         memory_mb: 24.0,
//!         cpu_time_ms: 95.0,
//!         completed_at: Utc::now(),
//!     })
//!     .await;
//!
//! engine.aggregate().await?;
//! let overview = engine.query().get_overview().await?;
//! println!("{} queues", overview.queues.len());
//! # Ok(())
//! # }
//! ```

pub mod aggregation;
pub mod baseline;
pub mod cleanup;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod events;
pub mod hooks;
pub mod logging;
pub mod models;
pub mod query;
pub mod recorders;
pub mod repositories;
pub mod storage;

pub use engine::{AggregationReport, QueueMetrics, QueueMetricsBuilder};
pub use error::{QueueMetricsError, QueueMetricsResult};
pub use logging::init_structured_logging;
