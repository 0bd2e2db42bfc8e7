//! Redis storage driver
//!
//! Uses `redis::aio::ConnectionManager` for async multiplexed connections with
//! automatic reconnection. Pattern scans use `SCAN` so they never block the server,
//! and pipelines are sent as a single `MULTI`/`EXEC` block. Requires the
//! `redis-storage` feature flag.

use super::{bounded, redact_url};
use crate::config::StorageConfig;
use crate::storage::command::{format_score_bound, Increment, StorageCommand};
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::traits::StorageDriver;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const SCAN_BATCH: usize = 100;

/// Redis-backed storage driver using ConnectionManager
#[derive(Clone)]
pub struct RedisStorageDriver {
    connection_manager: redis::aio::ConnectionManager,
    timeout: Duration,
}

impl std::fmt::Debug for RedisStorageDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStorageDriver")
            .field("connection_manager", &"ConnectionManager")
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub(crate) fn classify(operation: &str, error: redis::RedisError) -> StorageError {
    if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal() {
        StorageError::Unavailable(format!("Redis {operation} failed: {error}"))
    } else if error.is_timeout() {
        StorageError::Timeout(format!("Redis {operation} timed out: {error}"))
    } else {
        StorageError::Backend(format!("Redis {operation} failed: {error}"))
    }
}

/// Whole seconds for `EX`/`EXPIRE`; sub-second TTLs round up so they never delete
fn ttl_seconds(ttl: Duration) -> u64 {
    if ttl.is_zero() {
        0
    } else {
        ttl.as_secs().max(1)
    }
}

fn append_command(pipe: &mut redis::Pipeline, command: &StorageCommand) {
    match command {
        StorageCommand::SetScalar { key, value, ttl } => {
            pipe.cmd("SET").arg(key).arg(value);
            if let Some(ttl) = ttl {
                pipe.arg("EX").arg(ttl_seconds(*ttl));
            }
            pipe.ignore();
        }
        StorageCommand::SetHash { key, fields, ttl } => {
            if fields.is_empty() {
                return;
            }
            pipe.cmd("HSET").arg(key);
            for (field, value) in fields {
                pipe.arg(field).arg(value);
            }
            pipe.ignore();
            if let Some(ttl) = ttl {
                append_expire(pipe, key, *ttl);
            }
        }
        StorageCommand::IncrementHashField { key, field, delta } => {
            match delta {
                Increment::Int(d) => pipe.cmd("HINCRBY").arg(key).arg(field).arg(*d),
                Increment::Float(d) => pipe.cmd("HINCRBYFLOAT").arg(key).arg(field).arg(*d),
            };
            pipe.ignore();
        }
        StorageCommand::AddToSortedSet { key, members, ttl } => {
            if members.is_empty() {
                return;
            }
            pipe.cmd("ZADD").arg(key);
            for (member, score) in members {
                pipe.arg(*score).arg(member);
            }
            pipe.ignore();
            if let Some(ttl) = ttl {
                append_expire(pipe, key, *ttl);
            }
        }
        StorageCommand::TrimSortedSetByRank { key, start, stop } => {
            pipe.cmd("ZREMRANGEBYRANK")
                .arg(key)
                .arg(*start)
                .arg(*stop)
                .ignore();
        }
        StorageCommand::RemoveSortedSetByScore { key, min, max } => {
            pipe.cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg(format_score_bound(*min))
                .arg(format_score_bound(*max))
                .ignore();
        }
        StorageCommand::AddToSet { key, members } => {
            if !members.is_empty() {
                pipe.cmd("SADD").arg(key).arg(members).ignore();
            }
        }
        StorageCommand::RemoveFromSet { key, members } => {
            if !members.is_empty() {
                pipe.cmd("SREM").arg(key).arg(members).ignore();
            }
        }
        StorageCommand::Expire { key, ttl } => append_expire(pipe, key, *ttl),
        StorageCommand::Delete { keys } => {
            if !keys.is_empty() {
                pipe.cmd("DEL").arg(keys).ignore();
            }
        }
    }
}

fn append_expire(pipe: &mut redis::Pipeline, key: &str, ttl: Duration) {
    let seconds = ttl_seconds(ttl);
    if seconds == 0 {
        pipe.cmd("DEL").arg(key).ignore();
    } else {
        pipe.cmd("EXPIRE").arg(key).arg(seconds).ignore();
    }
}

impl RedisStorageDriver {
    /// Connect using `storage.connection` and `storage.operation_timeout_ms`
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        Self::connect(&config.connection, config.operation_timeout()).await
    }

    pub async fn connect(url: &str, timeout: Duration) -> StorageResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            StorageError::Unavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let connection_manager = bounded(timeout, "CONNECT", async {
            redis::aio::ConnectionManager::new(client)
                .await
                .map_err(|e| StorageError::Unavailable(format!("Failed to connect to Redis: {}", e)))
        })
        .await?;

        debug!(url = %redact_url(url), "Redis storage driver connected");

        Ok(Self {
            connection_manager,
            timeout,
        })
    }

    /// Shared multiplexed connection, for collaborators such as queue inspectors
    pub fn connection(&self) -> redis::aio::ConnectionManager {
        self.connection_manager.clone()
    }

    pub fn operation_timeout(&self) -> Duration {
        self.timeout
    }

    async fn query<T>(&self, operation: &'static str, cmd: redis::Cmd) -> StorageResult<T>
    where
        T: redis::FromRedisValue + Send,
    {
        let mut conn = self.connection_manager.clone();
        bounded(self.timeout, operation, async move {
            let value: T = cmd
                .query_async(&mut conn)
                .await
                .map_err(|e| classify(operation, e))?;
            Ok(value)
        })
        .await
    }
}

impl StorageDriver for RedisStorageDriver {
    async fn set_scalar(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl_seconds(ttl).max(1));
        }
        self.query::<()>("SET", cmd).await
    }

    async fn get_scalar(&self, key: &str) -> StorageResult<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.query("GET", cmd).await
    }

    async fn set_hash(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        self.pipeline(vec![StorageCommand::SetHash {
            key: key.to_string(),
            fields: fields.to_vec(),
            ttl,
        }])
        .await
    }

    async fn get_hash(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        let hash: HashMap<String, String> = self.query("HGETALL", cmd).await?;
        debug!(key = key, fields = hash.len(), "Redis HGETALL");
        Ok(hash)
    }

    async fn get_hash_field(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        let mut cmd = redis::cmd("HGET");
        cmd.arg(key).arg(field);
        self.query("HGET", cmd).await
    }

    async fn increment_hash_field(
        &self,
        key: &str,
        field: &str,
        delta: Increment,
    ) -> StorageResult<()> {
        match delta {
            Increment::Int(d) => {
                let mut cmd = redis::cmd("HINCRBY");
                cmd.arg(key).arg(field).arg(d);
                self.query::<i64>("HINCRBY", cmd).await.map(|_| ())
            }
            Increment::Float(d) => {
                let mut cmd = redis::cmd("HINCRBYFLOAT");
                cmd.arg(key).arg(field).arg(d);
                self.query::<f64>("HINCRBYFLOAT", cmd).await.map(|_| ())
            }
        }
    }

    async fn add_to_sorted_set(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        self.pipeline(vec![StorageCommand::AddToSortedSet {
            key: key.to_string(),
            members: members.to_vec(),
            ttl,
        }])
        .await
    }

    async fn range_sorted_set_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StorageResult<Vec<(String, f64)>> {
        let mut cmd = redis::cmd("ZRANGEBYSCORE");
        cmd.arg(key)
            .arg(format_score_bound(min))
            .arg(format_score_bound(max))
            .arg("WITHSCORES");
        self.query("ZRANGEBYSCORE", cmd).await
    }

    async fn range_sorted_set_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StorageResult<Vec<(String, f64)>> {
        let mut cmd = redis::cmd("ZRANGE");
        cmd.arg(key).arg(start).arg(stop).arg("WITHSCORES");
        self.query("ZRANGE", cmd).await
    }

    async fn count_sorted_set_by_score(&self, key: &str, min: f64, max: f64) -> StorageResult<u64> {
        let mut cmd = redis::cmd("ZCOUNT");
        cmd.arg(key)
            .arg(format_score_bound(min))
            .arg(format_score_bound(max));
        self.query("ZCOUNT", cmd).await
    }

    async fn sorted_set_cardinality(&self, key: &str) -> StorageResult<u64> {
        let mut cmd = redis::cmd("ZCARD");
        cmd.arg(key);
        self.query("ZCARD", cmd).await
    }

    async fn trim_sorted_set_by_rank(&self, key: &str, start: isize, stop: isize) -> StorageResult<u64> {
        let mut cmd = redis::cmd("ZREMRANGEBYRANK");
        cmd.arg(key).arg(start).arg(stop);
        self.query("ZREMRANGEBYRANK", cmd).await
    }

    async fn remove_sorted_set_by_score(&self, key: &str, min: f64, max: f64) -> StorageResult<u64> {
        let mut cmd = redis::cmd("ZREMRANGEBYSCORE");
        cmd.arg(key)
            .arg(format_score_bound(min))
            .arg(format_score_bound(max));
        self.query("ZREMRANGEBYSCORE", cmd).await
    }

    async fn remove_from_sorted_set(&self, key: &str, member: &str) -> StorageResult<bool> {
        let mut cmd = redis::cmd("ZREM");
        cmd.arg(key).arg(member);
        let removed: u64 = self.query("ZREM", cmd).await?;
        Ok(removed > 0)
    }

    async fn add_to_set(&self, key: &str, members: &[String]) -> StorageResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(members);
        self.query("SADD", cmd).await
    }

    async fn remove_from_set(&self, key: &str, members: &[String]) -> StorageResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("SREM");
        cmd.arg(key).arg(members);
        self.query("SREM", cmd).await
    }

    async fn set_members(&self, key: &str) -> StorageResult<Vec<String>> {
        let mut cmd = redis::cmd("SMEMBERS");
        cmd.arg(key);
        self.query("SMEMBERS", cmd).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        let count: u64 = self.query("EXISTS", cmd).await?;
        Ok(count > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        let seconds = ttl_seconds(ttl);
        if seconds == 0 {
            let deleted = self.delete(&[key.to_string()]).await?;
            return Ok(deleted > 0);
        }
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(seconds);
        let applied: u64 = self.query("EXPIRE", cmd).await?;
        Ok(applied > 0)
    }

    async fn delete(&self, keys: &[String]) -> StorageResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = redis::cmd("DEL");
        cmd.arg(keys);
        self.query("DEL", cmd).await
    }

    async fn scan_keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let mut found: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;

        // SCAN may return a key more than once; dedupe at the end
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next_cursor, keys): (u64, Vec<String>) = self.query("SCAN", cmd).await?;
            found.extend(keys);

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        found.sort();
        found.dedup();
        debug!(pattern = pattern, matched = found.len(), "Redis SCAN");
        Ok(found)
    }

    async fn pipeline(&self, commands: Vec<StorageCommand>) -> StorageResult<()> {
        if commands.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in &commands {
            append_command(&mut pipe, command);
        }

        let mut conn = self.connection_manager.clone();
        bounded(self.timeout, "MULTI/EXEC", async move {
            let _: () = pipe
                .query_async(&mut conn)
                .await
                .map_err(|e| classify("MULTI/EXEC", e))?;
            Ok(())
        })
        .await?;

        debug!(commands = commands.len(), "Redis pipeline applied");
        Ok(())
    }

    async fn ping(&self) -> StorageResult<bool> {
        let pong: String = self.query("PING", redis::cmd("PING")).await?;
        Ok(pong == "PONG")
    }

    fn driver_name(&self) -> &'static str {
        "redis"
    }
}
