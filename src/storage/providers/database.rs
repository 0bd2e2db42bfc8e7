//! PostgreSQL storage driver
//!
//! Emulates the key/value + sorted-set model over four tables:
//!
//! | table                     | holds                                  |
//! |---------------------------|----------------------------------------|
//! | `{prefix}keys`            | scalar values                          |
//! | `{prefix}hashes`          | hashes as a JSONB object of strings    |
//! | `{prefix}sets`            | one row per set member                 |
//! | `{prefix}sorted_sets`     | one row per member with a float score  |
//!
//! Every row carries a nullable `expires_at`; reads filter expired rows and
//! [`DatabaseStorageDriver::purge_expired`] deletes them. Ranks are emulated with
//! `ORDER BY score, member` plus `OFFSET`/`LIMIT`. Hash increments are single
//! `INSERT .. ON CONFLICT DO UPDATE` statements, so concurrent writers never lose
//! updates. Pipelines run inside one transaction.

use super::{bounded, redact_url};
use crate::config::StorageConfig;
use crate::storage::command::{resolve_rank_range, Increment, StorageCommand};
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::traits::StorageDriver;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info};

const LIVE: &str = "(expires_at IS NULL OR expires_at > NOW())";

fn classify(operation: &str, error: sqlx::Error) -> StorageError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => {
            StorageError::Unavailable(format!("Database {operation} failed: {error}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StorageError::Serialization(format!("Database {operation} decode failed: {error}"))
        }
        other => StorageError::Backend(format!("Database {operation} failed: {other}")),
    }
}

fn ttl_millis(ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|t| i64::try_from(t.as_millis()).unwrap_or(i64::MAX))
}

fn json_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Translate a glob pattern into a `LIKE` pattern with `\` as escape
fn glob_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => like.push('%'),
            '?' => like.push('_'),
            '%' | '_' | '\\' => {
                like.push('\\');
                like.push(c);
            }
            other => like.push(other),
        }
    }
    like
}

/// Fully qualified table names for one table prefix
#[derive(Debug, Clone)]
struct Tables {
    keys: String,
    hashes: String,
    sets: String,
    sorted_sets: String,
}

impl Tables {
    fn new(prefix: &str) -> StorageResult<Self> {
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StorageError::Backend(format!(
                "table prefix '{prefix}' must contain only ASCII letters, digits and underscores"
            )));
        }
        Ok(Self {
            keys: format!("{prefix}keys"),
            hashes: format!("{prefix}hashes"),
            sets: format!("{prefix}sets"),
            sorted_sets: format!("{prefix}sorted_sets"),
        })
    }

    fn all(&self) -> [&str; 4] {
        [&self.keys, &self.hashes, &self.sets, &self.sorted_sets]
    }

    fn schema(&self) -> Vec<String> {
        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, value TEXT NOT NULL, expires_at TIMESTAMPTZ)",
                self.keys
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, data JSONB NOT NULL DEFAULT '{{}}'::jsonb, expires_at TIMESTAMPTZ)",
                self.hashes
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT NOT NULL, member TEXT NOT NULL, expires_at TIMESTAMPTZ, PRIMARY KEY (key, member))",
                self.sets
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (key TEXT NOT NULL, member TEXT NOT NULL, score DOUBLE PRECISION NOT NULL, expires_at TIMESTAMPTZ, PRIMARY KEY (key, member))",
                self.sorted_sets
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_score_idx ON {0} (key, score, member)",
                self.sorted_sets
            ),
        ]
    }
}

// Statement helpers take `&mut PgConnection` so they run on a pooled connection or
// inside a pipeline transaction alike.

async fn purge_key(conn: &mut PgConnection, table: &str, key: &str) -> Result<(), sqlx::Error> {
    let sql = format!("DELETE FROM {table} WHERE key = $1 AND expires_at IS NOT NULL AND expires_at <= NOW()");
    sqlx::query(&sql).bind(key).execute(&mut *conn).await?;
    Ok(())
}

async fn set_scalar(
    conn: &mut PgConnection,
    t: &Tables,
    key: &str,
    value: &str,
    ttl: Option<Duration>,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO {} (key, value, expires_at) VALUES ($1, $2, NOW() + $3::bigint * INTERVAL '1 millisecond') \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        t.keys
    );
    sqlx::query(&sql)
        .bind(key)
        .bind(value)
        .bind(ttl_millis(ttl))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn set_hash(
    conn: &mut PgConnection,
    t: &Tables,
    key: &str,
    fields: &[(String, String)],
    ttl: Option<Duration>,
) -> Result<(), sqlx::Error> {
    if fields.is_empty() {
        return Ok(());
    }
    purge_key(conn, &t.hashes, key).await?;

    let data: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(f, v)| (f.clone(), serde_json::Value::String(v.clone())))
        .collect();

    let sql = format!(
        "INSERT INTO {0} (key, data, expires_at) VALUES ($1, $2, NOW() + $3::bigint * INTERVAL '1 millisecond') \
         ON CONFLICT (key) DO UPDATE SET data = {0}.data || EXCLUDED.data, \
         expires_at = COALESCE(EXCLUDED.expires_at, {0}.expires_at)",
        t.hashes
    );
    sqlx::query(&sql)
        .bind(key)
        .bind(serde_json::Value::Object(data))
        .bind(ttl_millis(ttl))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn increment_hash_field(
    conn: &mut PgConnection,
    t: &Tables,
    key: &str,
    field: &str,
    delta: Increment,
) -> Result<(), sqlx::Error> {
    purge_key(conn, &t.hashes, key).await?;

    let (cast, kind) = match delta {
        Increment::Int(_) => ("bigint", "int"),
        Increment::Float(_) => ("double precision", "float"),
    };
    let sql = format!(
        "INSERT INTO {0} (key, data) VALUES ($1, jsonb_build_object($2::text, ($3::{1})::text)) \
         ON CONFLICT (key) DO UPDATE SET data = jsonb_set({0}.data, ARRAY[$2::text], \
         to_jsonb((COALESCE(({0}.data->>$2)::{1}, 0) + $3::{1})::text))",
        t.hashes, cast
    );
    let statement = sqlx::query(&sql).bind(key).bind(field);
    let statement = match delta {
        Increment::Int(d) => statement.bind(d),
        Increment::Float(d) => statement.bind(d),
    };
    statement.execute(&mut *conn).await?;
    debug!(key = key, field = field, kind = kind, "Database hash increment");
    Ok(())
}

async fn add_to_sorted_set(
    conn: &mut PgConnection,
    t: &Tables,
    key: &str,
    members: &[(String, f64)],
    ttl: Option<Duration>,
) -> Result<(), sqlx::Error> {
    if members.is_empty() {
        return Ok(());
    }
    purge_key(conn, &t.sorted_sets, key).await?;

    let names: Vec<String> = members.iter().map(|(m, _)| m.clone()).collect();
    let scores: Vec<f64> = members.iter().map(|(_, s)| *s).collect();

    // New members inherit the key's current expiry
    let sql = format!(
        "INSERT INTO {0} (key, member, score, expires_at) \
         SELECT $1, m, s, (SELECT MAX(expires_at) FROM {0} WHERE key = $1) \
         FROM UNNEST($2::text[], $3::float8[]) AS t(m, s) \
         ON CONFLICT (key, member) DO UPDATE SET score = EXCLUDED.score",
        t.sorted_sets
    );
    sqlx::query(&sql)
        .bind(key)
        .bind(&names)
        .bind(&scores)
        .execute(&mut *conn)
        .await?;

    if let Some(ttl) = ttl {
        expire(conn, t, key, ttl).await?;
    }
    Ok(())
}

async fn sorted_set_len(conn: &mut PgConnection, t: &Tables, key: &str) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE key = $1 AND {LIVE}", t.sorted_sets);
    sqlx::query_scalar(&sql).bind(key).fetch_one(&mut *conn).await
}

async fn trim_sorted_set_by_rank(
    conn: &mut PgConnection,
    t: &Tables,
    key: &str,
    start: isize,
    stop: isize,
) -> Result<u64, sqlx::Error> {
    let len = sorted_set_len(conn, t, key).await?;
    let Some((offset, count)) = resolve_rank_range(len.max(0) as usize, start, stop) else {
        return Ok(0);
    };
    let sql = format!(
        "DELETE FROM {0} WHERE key = $1 AND member IN (\
         SELECT member FROM {0} WHERE key = $1 AND {LIVE} ORDER BY score, member OFFSET $2 LIMIT $3)",
        t.sorted_sets
    );
    let result = sqlx::query(&sql)
        .bind(key)
        .bind(offset as i64)
        .bind(count as i64)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn remove_sorted_set_by_score(
    conn: &mut PgConnection,
    t: &Tables,
    key: &str,
    min: f64,
    max: f64,
) -> Result<u64, sqlx::Error> {
    let sql = format!(
        "DELETE FROM {} WHERE key = $1 AND score >= $2 AND score <= $3",
        t.sorted_sets
    );
    let result = sqlx::query(&sql)
        .bind(key)
        .bind(min)
        .bind(max)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn add_to_set(
    conn: &mut PgConnection,
    t: &Tables,
    key: &str,
    members: &[String],
) -> Result<u64, sqlx::Error> {
    if members.is_empty() {
        return Ok(0);
    }
    purge_key(conn, &t.sets, key).await?;
    let sql = format!(
        "INSERT INTO {0} (key, member, expires_at) \
         SELECT $1, m, (SELECT MAX(expires_at) FROM {0} WHERE key = $1) FROM UNNEST($2::text[]) AS t(m) \
         ON CONFLICT (key, member) DO NOTHING",
        t.sets
    );
    let result = sqlx::query(&sql)
        .bind(key)
        .bind(members)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn remove_from_set(
    conn: &mut PgConnection,
    t: &Tables,
    key: &str,
    members: &[String],
) -> Result<u64, sqlx::Error> {
    if members.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM {} WHERE key = $1 AND member = ANY($2) AND {LIVE}",
        t.sets
    );
    let result = sqlx::query(&sql)
        .bind(key)
        .bind(members)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn expire(
    conn: &mut PgConnection,
    t: &Tables,
    key: &str,
    ttl: Duration,
) -> Result<bool, sqlx::Error> {
    if ttl.is_zero() {
        return Ok(delete(conn, t, &[key.to_string()]).await? > 0);
    }
    let mut touched = 0;
    for table in t.all() {
        let sql = format!(
            "UPDATE {table} SET expires_at = NOW() + $2::bigint * INTERVAL '1 millisecond' WHERE key = $1 AND {LIVE}"
        );
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(ttl_millis(Some(ttl)))
            .execute(&mut *conn)
            .await?;
        touched += result.rows_affected();
    }
    Ok(touched > 0)
}

async fn delete(conn: &mut PgConnection, t: &Tables, keys: &[String]) -> Result<u64, sqlx::Error> {
    if keys.is_empty() {
        return Ok(0);
    }
    let mut deleted: HashSet<String> = HashSet::new();
    for table in t.all() {
        let sql = format!("DELETE FROM {table} WHERE key = ANY($1) RETURNING key, {LIVE} AS live");
        let rows = sqlx::query(&sql).bind(keys).fetch_all(&mut *conn).await?;
        for row in rows {
            if row.try_get::<bool, _>("live")? {
                deleted.insert(row.try_get("key")?);
            }
        }
    }
    Ok(deleted.len() as u64)
}

async fn apply(conn: &mut PgConnection, t: &Tables, command: &StorageCommand) -> Result<(), sqlx::Error> {
    match command {
        StorageCommand::SetScalar { key, value, ttl } => set_scalar(conn, t, key, value, *ttl).await,
        StorageCommand::SetHash { key, fields, ttl } => set_hash(conn, t, key, fields, *ttl).await,
        StorageCommand::IncrementHashField { key, field, delta } => {
            increment_hash_field(conn, t, key, field, *delta).await
        }
        StorageCommand::AddToSortedSet { key, members, ttl } => {
            add_to_sorted_set(conn, t, key, members, *ttl).await
        }
        StorageCommand::TrimSortedSetByRank { key, start, stop } => {
            trim_sorted_set_by_rank(conn, t, key, *start, *stop).await.map(|_| ())
        }
        StorageCommand::RemoveSortedSetByScore { key, min, max } => {
            remove_sorted_set_by_score(conn, t, key, *min, *max).await.map(|_| ())
        }
        StorageCommand::AddToSet { key, members } => add_to_set(conn, t, key, members).await.map(|_| ()),
        StorageCommand::RemoveFromSet { key, members } => {
            remove_from_set(conn, t, key, members).await.map(|_| ())
        }
        StorageCommand::Expire { key, ttl } => expire(conn, t, key, *ttl).await.map(|_| ()),
        StorageCommand::Delete { keys } => delete(conn, t, keys).await.map(|_| ()),
    }
}

/// Acquire a pooled connection and run one statement helper under the operation timeout
macro_rules! run {
    ($driver:ident, $op:literal, |$conn:ident, $tables:ident| $body:expr) => {
        bounded($driver.timeout, $op, async {
            let mut pooled = $driver
                .pool
                .acquire()
                .await
                .map_err(|e| classify($op, e))?;
            let $conn: &mut PgConnection = &mut pooled;
            let $tables = &$driver.tables;
            $body.await.map_err(|e| classify($op, e))
        })
        .await
    };
}

/// PostgreSQL-backed storage driver
#[derive(Debug, Clone)]
pub struct DatabaseStorageDriver {
    pool: PgPool,
    tables: Tables,
    timeout: Duration,
}

impl DatabaseStorageDriver {
    /// Connect using `storage.connection`, create the schema if missing
    pub async fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        let timeout = config.operation_timeout();
        let pool = bounded(timeout, "CONNECT", async {
            PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(timeout)
                .connect(&config.connection)
                .await
                .map_err(|e| StorageError::Unavailable(format!("Failed to connect to database: {e}")))
        })
        .await?;

        debug!(url = %redact_url(&config.connection), "Database storage driver connected");

        let driver = Self::with_pool(pool, &config.table_prefix, timeout)?;
        driver.ensure_schema().await?;
        Ok(driver)
    }

    /// Wrap an existing pool; the schema is not touched
    pub fn with_pool(pool: PgPool, table_prefix: &str, timeout: Duration) -> StorageResult<Self> {
        Ok(Self {
            pool,
            tables: Tables::new(table_prefix)?,
            timeout,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the backing tables and index if they do not exist
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        for statement in self.tables.schema() {
            run!(self, "CREATE TABLE", |c, _t| sqlx::query(&statement).execute(&mut *c))?;
        }
        info!(tables = ?self.tables.all(), "Queue metrics storage schema ready");
        Ok(())
    }

    /// Delete every expired row; returns the number of rows removed
    pub async fn purge_expired(&self) -> StorageResult<u64> {
        let mut purged = 0;
        for table in self.tables.all() {
            let sql = format!(
                "DELETE FROM {table} WHERE expires_at IS NOT NULL AND expires_at <= NOW()"
            );
            let result = run!(self, "PURGE", |c, _t| sqlx::query(&sql).execute(&mut *c))?;
            purged += result.rows_affected();
        }
        debug!(purged = purged, "Purged expired storage rows");
        Ok(purged)
    }
}

impl StorageDriver for DatabaseStorageDriver {
    async fn set_scalar(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        run!(self, "SET", |c, t| set_scalar(c, t, key, value, ttl))
    }

    async fn get_scalar(&self, key: &str) -> StorageResult<Option<String>> {
        let sql = format!("SELECT value FROM {} WHERE key = $1 AND {LIVE}", self.tables.keys);
        run!(self, "GET", |c, _t| sqlx::query_scalar::<_, String>(&sql)
            .bind(key)
            .fetch_optional(&mut *c))
    }

    async fn set_hash(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        run!(self, "HSET", |c, t| set_hash(c, t, key, fields, ttl))
    }

    async fn get_hash(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        let sql = format!("SELECT data FROM {} WHERE key = $1 AND {LIVE}", self.tables.hashes);
        let data: Option<serde_json::Value> = run!(self, "HGETALL", |c, _t| {
            sqlx::query_scalar::<_, serde_json::Value>(&sql)
                .bind(key)
                .fetch_optional(&mut *c)
        })?;

        Ok(match data {
            Some(serde_json::Value::Object(map)) => map
                .iter()
                .map(|(field, value)| (field.clone(), json_to_string(value)))
                .collect(),
            _ => HashMap::new(),
        })
    }

    async fn get_hash_field(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        let sql = format!(
            "SELECT data->>$2 FROM {} WHERE key = $1 AND {LIVE}",
            self.tables.hashes
        );
        let value: Option<Option<String>> = run!(self, "HGET", |c, _t| {
            sqlx::query_scalar::<_, Option<String>>(&sql)
                .bind(key)
                .bind(field)
                .fetch_optional(&mut *c)
        })?;
        Ok(value.flatten())
    }

    async fn increment_hash_field(
        &self,
        key: &str,
        field: &str,
        delta: Increment,
    ) -> StorageResult<()> {
        run!(self, "HINCRBY", |c, t| increment_hash_field(c, t, key, field, delta))
    }

    async fn add_to_sorted_set(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        run!(self, "ZADD", |c, t| add_to_sorted_set(c, t, key, members, ttl))
    }

    async fn range_sorted_set_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StorageResult<Vec<(String, f64)>> {
        let sql = format!(
            "SELECT member, score FROM {} WHERE key = $1 AND score >= $2 AND score <= $3 AND {LIVE} \
             ORDER BY score, member",
            self.tables.sorted_sets
        );
        run!(self, "ZRANGEBYSCORE", |c, _t| {
            sqlx::query_as::<_, (String, f64)>(&sql)
                .bind(key)
                .bind(min)
                .bind(max)
                .fetch_all(&mut *c)
        })
    }

    async fn range_sorted_set_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StorageResult<Vec<(String, f64)>> {
        let sql = format!(
            "SELECT member, score FROM {} WHERE key = $1 AND {LIVE} ORDER BY score, member OFFSET $2 LIMIT $3",
            self.tables.sorted_sets
        );
        run!(self, "ZRANGE", |c, t| async {
            let len = sorted_set_len(c, t, key).await?;
            let Some((offset, count)) = resolve_rank_range(len.max(0) as usize, start, stop) else {
                return Ok(Vec::new());
            };
            sqlx::query_as::<_, (String, f64)>(&sql)
                .bind(key)
                .bind(offset as i64)
                .bind(count as i64)
                .fetch_all(&mut *c)
                .await
        })
    }

    async fn count_sorted_set_by_score(&self, key: &str, min: f64, max: f64) -> StorageResult<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE key = $1 AND score >= $2 AND score <= $3 AND {LIVE}",
            self.tables.sorted_sets
        );
        let count: i64 = run!(self, "ZCOUNT", |c, _t| {
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(key)
                .bind(min)
                .bind(max)
                .fetch_one(&mut *c)
        })?;
        Ok(count.max(0) as u64)
    }

    async fn sorted_set_cardinality(&self, key: &str) -> StorageResult<u64> {
        let len = run!(self, "ZCARD", |c, t| sorted_set_len(c, t, key))?;
        Ok(len.max(0) as u64)
    }

    async fn trim_sorted_set_by_rank(&self, key: &str, start: isize, stop: isize) -> StorageResult<u64> {
        run!(self, "ZREMRANGEBYRANK", |c, t| trim_sorted_set_by_rank(c, t, key, start, stop))
    }

    async fn remove_sorted_set_by_score(&self, key: &str, min: f64, max: f64) -> StorageResult<u64> {
        run!(self, "ZREMRANGEBYSCORE", |c, t| remove_sorted_set_by_score(c, t, key, min, max))
    }

    async fn remove_from_sorted_set(&self, key: &str, member: &str) -> StorageResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE key = $1 AND member = $2 AND {LIVE}",
            self.tables.sorted_sets
        );
        let result = run!(self, "ZREM", |c, _t| {
            sqlx::query(&sql).bind(key).bind(member).execute(&mut *c)
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_to_set(&self, key: &str, members: &[String]) -> StorageResult<u64> {
        run!(self, "SADD", |c, t| add_to_set(c, t, key, members))
    }

    async fn remove_from_set(&self, key: &str, members: &[String]) -> StorageResult<u64> {
        run!(self, "SREM", |c, t| remove_from_set(c, t, key, members))
    }

    async fn set_members(&self, key: &str) -> StorageResult<Vec<String>> {
        let sql = format!(
            "SELECT member FROM {} WHERE key = $1 AND {LIVE} ORDER BY member",
            self.tables.sets
        );
        run!(self, "SMEMBERS", |c, _t| sqlx::query_scalar::<_, String>(&sql)
            .bind(key)
            .fetch_all(&mut *c))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let t = &self.tables;
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE key = $1 AND {LIVE} \
             UNION ALL SELECT 1 FROM {} WHERE key = $1 AND {LIVE} \
             UNION ALL SELECT 1 FROM {} WHERE key = $1 AND {LIVE} \
             UNION ALL SELECT 1 FROM {} WHERE key = $1 AND {LIVE})",
            t.keys, t.hashes, t.sets, t.sorted_sets
        );
        run!(self, "EXISTS", |c, _t| sqlx::query_scalar::<_, bool>(&sql)
            .bind(key)
            .fetch_one(&mut *c))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        run!(self, "EXPIRE", |c, t| expire(c, t, key, ttl))
    }

    async fn delete(&self, keys: &[String]) -> StorageResult<u64> {
        run!(self, "DEL", |c, t| delete(c, t, keys))
    }

    async fn scan_keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let t = &self.tables;
        let sql = format!(
            "SELECT key FROM {} WHERE key LIKE $1 AND {LIVE} \
             UNION SELECT key FROM {} WHERE key LIKE $1 AND {LIVE} \
             UNION SELECT key FROM {} WHERE key LIKE $1 AND {LIVE} \
             UNION SELECT key FROM {} WHERE key LIKE $1 AND {LIVE} ORDER BY key",
            t.keys, t.hashes, t.sets, t.sorted_sets
        );
        let like = glob_to_like(pattern);
        run!(self, "SCAN", |c, _t| sqlx::query_scalar::<_, String>(&sql)
            .bind(&like)
            .fetch_all(&mut *c))
    }

    async fn pipeline(&self, commands: Vec<StorageCommand>) -> StorageResult<()> {
        if commands.is_empty() {
            return Ok(());
        }
        bounded(self.timeout, "TRANSACTION", async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| classify("BEGIN", e))?;
            for command in &commands {
                apply(&mut *tx, &self.tables, command)
                    .await
                    .map_err(|e| classify("TRANSACTION", e))?;
            }
            tx.commit().await.map_err(|e| classify("COMMIT", e))
        })
        .await?;

        debug!(commands = commands.len(), "Database pipeline committed");
        Ok(())
    }

    async fn ping(&self) -> StorageResult<bool> {
        let one: i32 = run!(self, "PING", |c, _t| sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&mut *c))?;
        Ok(one == 1)
    }

    fn driver_name(&self) -> &'static str {
        "database"
    }
}
