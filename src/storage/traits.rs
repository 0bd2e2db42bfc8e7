//! Storage driver trait definition

use super::command::{Increment, StorageCommand};
use super::errors::StorageResult;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

/// Key/value + sorted-set operations required by the metrics engine
///
/// Implemented by the concrete drivers (memory, Redis, database). Every write is
/// visible to subsequent reads through the same driver. Sorted-set ranks follow Redis
/// semantics: ascending by score, ties broken by member, negative indices count from
/// the end.
pub trait StorageDriver: Send + Sync {
    /// Store a scalar value, replacing any previous value and TTL
    fn set_scalar(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn get_scalar(&self, key: &str) -> impl Future<Output = StorageResult<Option<String>>> + Send;

    /// Merge fields into a hash, optionally refreshing its TTL
    fn set_hash(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// All fields of a hash; empty when the key does not exist
    fn get_hash(
        &self,
        key: &str,
    ) -> impl Future<Output = StorageResult<HashMap<String, String>>> + Send;

    fn get_hash_field(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = StorageResult<Option<String>>> + Send;

    /// Server-side atomic increment of a hash field
    fn increment_hash_field(
        &self,
        key: &str,
        field: &str,
        delta: Increment,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    fn add_to_sorted_set(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl: Option<Duration>,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Members with `min <= score <= max`, ascending
    fn range_sorted_set_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> impl Future<Output = StorageResult<Vec<(String, f64)>>> + Send;

    /// Members between ranks `start` and `stop` inclusive, ascending
    fn range_sorted_set_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> impl Future<Output = StorageResult<Vec<(String, f64)>>> + Send;

    fn count_sorted_set_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> impl Future<Output = StorageResult<u64>> + Send;

    fn sorted_set_cardinality(&self, key: &str) -> impl Future<Output = StorageResult<u64>> + Send;

    /// Remove members between ranks `start` and `stop`; returns removed count
    fn trim_sorted_set_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> impl Future<Output = StorageResult<u64>> + Send;

    fn remove_sorted_set_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> impl Future<Output = StorageResult<u64>> + Send;

    fn remove_from_sorted_set(
        &self,
        key: &str,
        member: &str,
    ) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Add members to a set; returns how many were new
    fn add_to_set(
        &self,
        key: &str,
        members: &[String],
    ) -> impl Future<Output = StorageResult<u64>> + Send;

    fn remove_from_set(
        &self,
        key: &str,
        members: &[String],
    ) -> impl Future<Output = StorageResult<u64>> + Send;

    fn set_members(&self, key: &str) -> impl Future<Output = StorageResult<Vec<String>>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Set a TTL on an existing key; returns false when the key does not exist
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = StorageResult<bool>> + Send;

    fn delete(&self, keys: &[String]) -> impl Future<Output = StorageResult<u64>> + Send;

    /// Keys matching a glob pattern (`*`, `?`)
    fn scan_keys(&self, pattern: &str) -> impl Future<Output = StorageResult<Vec<String>>> + Send;

    /// Apply a batch of writes in order
    fn pipeline(
        &self,
        commands: Vec<StorageCommand>,
    ) -> impl Future<Output = StorageResult<()>> + Send;

    /// Check if the backend is reachable
    fn ping(&self) -> impl Future<Output = StorageResult<bool>> + Send;

    /// Get the name of the storage driver
    fn driver_name(&self) -> &'static str;
}
