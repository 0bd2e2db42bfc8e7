//! Storage provider
//!
//! Uses enum dispatch for zero-cost abstraction over the concrete drivers. Every
//! component above the storage layer holds a `StorageProvider` and never names a
//! driver directly.

use super::command::{Increment, Pipeline, StorageCommand};
use super::errors::StorageResult;
use super::providers::MemoryStorageDriver;
use super::traits::StorageDriver;
use crate::config::{StorageConfig, StorageDriverKind};
use crate::error::QueueMetricsResult;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

#[cfg(feature = "database-storage")]
use super::providers::DatabaseStorageDriver;
#[cfg(feature = "redis-storage")]
use super::providers::RedisStorageDriver;

/// Backing store selected at construction time
#[derive(Debug, Clone)]
pub enum StorageProvider {
    /// Process-local keyspace
    Memory(MemoryStorageDriver),

    /// Redis cache provider (boxed to reduce enum size)
    #[cfg(feature = "redis-storage")]
    Redis(Box<RedisStorageDriver>),

    /// PostgreSQL table emulation (boxed to reduce enum size)
    #[cfg(feature = "database-storage")]
    Database(Box<DatabaseStorageDriver>),
}

macro_rules! dispatch {
    ($self:ident, $driver:ident => $call:expr) => {
        match $self {
            StorageProvider::Memory($driver) => $call,
            #[cfg(feature = "redis-storage")]
            StorageProvider::Redis($driver) => $call,
            #[cfg(feature = "database-storage")]
            StorageProvider::Database($driver) => $call,
        }
    };
}

impl StorageProvider {
    /// Connect the driver named by `storage.driver`
    ///
    /// Unlike a cache, the metrics store has no useful degraded mode, so a failed
    /// connection is an error rather than a silent fallback.
    pub async fn from_config(config: &StorageConfig) -> QueueMetricsResult<Self> {
        let provider = match config.driver {
            StorageDriverKind::Memory => Self::memory(),
            StorageDriverKind::Redis => Self::connect_redis(config).await?,
            StorageDriverKind::Database => Self::connect_database(config).await?,
        };

        info!(
            driver = provider.driver_name(),
            prefix = %config.prefix,
            "Queue metrics storage provider initialized"
        );
        Ok(provider)
    }

    pub fn memory() -> Self {
        Self::Memory(MemoryStorageDriver::new())
    }

    #[cfg(feature = "redis-storage")]
    async fn connect_redis(config: &StorageConfig) -> QueueMetricsResult<Self> {
        let driver = RedisStorageDriver::from_config(config).await?;
        Ok(Self::Redis(Box::new(driver)))
    }

    #[cfg(not(feature = "redis-storage"))]
    async fn connect_redis(_config: &StorageConfig) -> QueueMetricsResult<Self> {
        Err(crate::error::QueueMetricsError::InvalidConfiguration(
            "storage driver 'redis' requires the 'redis-storage' feature".to_string(),
        ))
    }

    #[cfg(feature = "database-storage")]
    async fn connect_database(config: &StorageConfig) -> QueueMetricsResult<Self> {
        let driver = DatabaseStorageDriver::from_config(config).await?;
        Ok(Self::Database(Box::new(driver)))
    }

    #[cfg(not(feature = "database-storage"))]
    async fn connect_database(_config: &StorageConfig) -> QueueMetricsResult<Self> {
        Err(crate::error::QueueMetricsError::InvalidConfiguration(
            "storage driver 'database' requires the 'database-storage' feature".to_string(),
        ))
    }

    pub fn driver_name(&self) -> &'static str {
        dispatch!(self, d => d.driver_name())
    }

    pub async fn set_scalar(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        dispatch!(self, d => d.set_scalar(key, value, ttl).await)
    }

    pub async fn get_scalar(&self, key: &str) -> StorageResult<Option<String>> {
        dispatch!(self, d => d.get_scalar(key).await)
    }

    pub async fn set_hash(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        dispatch!(self, d => d.set_hash(key, fields, ttl).await)
    }

    pub async fn get_hash(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        dispatch!(self, d => d.get_hash(key).await)
    }

    pub async fn get_hash_field(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        dispatch!(self, d => d.get_hash_field(key, field).await)
    }

    pub async fn increment_hash_field(
        &self,
        key: &str,
        field: &str,
        delta: impl Into<Increment>,
    ) -> StorageResult<()> {
        let delta = delta.into();
        dispatch!(self, d => d.increment_hash_field(key, field, delta).await)
    }

    pub async fn add_to_sorted_set(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        dispatch!(self, d => d.add_to_sorted_set(key, members, ttl).await)
    }

    pub async fn range_sorted_set_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StorageResult<Vec<(String, f64)>> {
        dispatch!(self, d => d.range_sorted_set_by_score(key, min, max).await)
    }

    pub async fn range_sorted_set_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StorageResult<Vec<(String, f64)>> {
        dispatch!(self, d => d.range_sorted_set_by_rank(key, start, stop).await)
    }

    pub async fn count_sorted_set_by_score(&self, key: &str, min: f64, max: f64) -> StorageResult<u64> {
        dispatch!(self, d => d.count_sorted_set_by_score(key, min, max).await)
    }

    pub async fn sorted_set_cardinality(&self, key: &str) -> StorageResult<u64> {
        dispatch!(self, d => d.sorted_set_cardinality(key).await)
    }

    pub async fn trim_sorted_set_by_rank(&self, key: &str, start: isize, stop: isize) -> StorageResult<u64> {
        dispatch!(self, d => d.trim_sorted_set_by_rank(key, start, stop).await)
    }

    pub async fn remove_sorted_set_by_score(&self, key: &str, min: f64, max: f64) -> StorageResult<u64> {
        dispatch!(self, d => d.remove_sorted_set_by_score(key, min, max).await)
    }

    pub async fn remove_from_sorted_set(&self, key: &str, member: &str) -> StorageResult<bool> {
        dispatch!(self, d => d.remove_from_sorted_set(key, member).await)
    }

    pub async fn add_to_set(&self, key: &str, members: &[String]) -> StorageResult<u64> {
        dispatch!(self, d => d.add_to_set(key, members).await)
    }

    pub async fn remove_from_set(&self, key: &str, members: &[String]) -> StorageResult<u64> {
        dispatch!(self, d => d.remove_from_set(key, members).await)
    }

    pub async fn set_members(&self, key: &str) -> StorageResult<Vec<String>> {
        dispatch!(self, d => d.set_members(key).await)
    }

    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        dispatch!(self, d => d.exists(key).await)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        dispatch!(self, d => d.expire(key, ttl).await)
    }

    pub async fn delete(&self, keys: &[String]) -> StorageResult<u64> {
        dispatch!(self, d => d.delete(keys).await)
    }

    pub async fn scan_keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        dispatch!(self, d => d.scan_keys(pattern).await)
    }

    /// Apply a batch of writes; see [`Pipeline`]
    pub async fn pipeline(&self, pipeline: Pipeline) -> StorageResult<()> {
        let commands: Vec<StorageCommand> = pipeline.into_commands();
        if commands.is_empty() {
            return Ok(());
        }
        dispatch!(self, d => d.pipeline(commands).await)
    }

    pub async fn ping(&self) -> StorageResult<bool> {
        dispatch!(self, d => d.ping().await)
    }

    /// Eagerly remove expired entries. Redis expires keys itself, so this is
    /// a no-op there.
    pub async fn purge_expired(&self) -> StorageResult<u64> {
        match self {
            Self::Memory(driver) => Ok(driver.purge_expired()),
            #[cfg(feature = "redis-storage")]
            Self::Redis(_) => Ok(0),
            #[cfg(feature = "database-storage")]
            Self::Database(driver) => driver.purge_expired().await,
        }
    }
}

impl From<MemoryStorageDriver> for StorageProvider {
    fn from(driver: MemoryStorageDriver) -> Self {
        Self::Memory(driver)
    }
}

#[cfg(feature = "redis-storage")]
impl From<RedisStorageDriver> for StorageProvider {
    fn from(driver: RedisStorageDriver) -> Self {
        Self::Redis(Box::new(driver))
    }
}

#[cfg(feature = "database-storage")]
impl From<DatabaseStorageDriver> for StorageProvider {
    fn from(driver: DatabaseStorageDriver) -> Self {
        Self::Database(Box::new(driver))
    }
}
