//! Shared fixtures for integration tests

#![allow(dead_code)]

pub mod builders;
pub mod strategies;

pub use builders::*;

use queue_metrics::config::QueueMetricsConfig;
use queue_metrics::recorders::HostProcessIdentity;
use queue_metrics::storage::StorageProvider;
use queue_metrics::QueueMetrics;
use std::sync::Arc;

/// Engine over a fresh in-memory store with a fixed worker identity
pub fn memory_engine() -> QueueMetrics {
    memory_engine_with(QueueMetricsConfig::default())
}

pub fn memory_engine_with(config: QueueMetricsConfig) -> QueueMetrics {
    QueueMetrics::builder(config)
        .with_identity(Arc::new(HostProcessIdentity::new("test-host", 4242)))
        .build(StorageProvider::memory())
}
