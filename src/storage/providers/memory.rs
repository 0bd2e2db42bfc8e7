//! In-process storage driver
//!
//! Holds the whole keyspace behind one `parking_lot::Mutex`. Expiry is lazy: an
//! expired entry is dropped the next time its key is touched or scanned. Sorted sets
//! and rank ranges follow Redis semantics so the memory and Redis drivers are
//! interchangeable in tests.

use crate::storage::command::{resolve_rank_range, Increment, StorageCommand};
use crate::storage::errors::{StorageError, StorageResult};
use crate::storage::traits::StorageDriver;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    SortedSet(HashMap<String, f64>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "string",
            Self::Hash(_) => "hash",
            Self::Set(_) => "set",
            Self::SortedSet(_) => "zset",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Hash(h) => h.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::SortedSet(z) => z.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str, expected: &str, actual: &Value) -> StorageError {
    StorageError::Backend(format!(
        "WRONGTYPE key '{}' holds a {} value, expected {}",
        key,
        actual.type_name(),
        expected
    ))
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn live_value(&mut self, key: &str) -> Option<&Value> {
        self.live(key).map(|e| &e.value)
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|e| e.value.is_empty()) {
            self.entries.remove(key);
        }
    }

    fn apply_ttl(&mut self, key: &str, ttl: Option<Duration>) {
        if let Some(ttl) = ttl {
            self.expire(key, ttl);
        }
    }

    fn entry_or_insert(&mut self, key: &str, empty: Value) -> &mut Entry {
        // Purge an expired entry first so a stale TTL does not carry over
        let _ = self.live(key);
        self.entries.entry(key.to_string()).or_insert(Entry {
            value: empty,
            expires_at: None,
        })
    }

    fn hash_mut(&mut self, key: &str) -> StorageResult<&mut HashMap<String, String>> {
        let entry = self.entry_or_insert(key, Value::Hash(HashMap::new()));
        match &mut entry.value {
            Value::Hash(h) => Ok(h),
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    fn set_mut(&mut self, key: &str) -> StorageResult<&mut BTreeSet<String>> {
        let entry = self.entry_or_insert(key, Value::Set(BTreeSet::new()));
        match &mut entry.value {
            Value::Set(s) => Ok(s),
            other => Err(wrong_type(key, "set", other)),
        }
    }

    fn zset_mut(&mut self, key: &str) -> StorageResult<&mut HashMap<String, f64>> {
        let entry = self.entry_or_insert(key, Value::SortedSet(HashMap::new()));
        match &mut entry.value {
            Value::SortedSet(z) => Ok(z),
            other => Err(wrong_type(key, "zset", other)),
        }
    }

    fn hash(&mut self, key: &str) -> StorageResult<Option<&HashMap<String, String>>> {
        match self.live_value(key) {
            None => Ok(None),
            Some(Value::Hash(h)) => Ok(Some(h)),
            Some(other) => Err(wrong_type(key, "hash", other)),
        }
    }

    fn sorted(&mut self, key: &str) -> StorageResult<Vec<(String, f64)>> {
        match self.live_value(key) {
            None => Ok(Vec::new()),
            Some(Value::SortedSet(z)) => Ok(sorted_members(z)),
            Some(other) => Err(wrong_type(key, "zset", other)),
        }
    }

    fn set_scalar(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Scalar(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
    }

    fn set_hash(&mut self, key: &str, fields: &[(String, String)], ttl: Option<Duration>) -> StorageResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let hash = self.hash_mut(key)?;
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        self.apply_ttl(key, ttl);
        Ok(())
    }

    fn increment(&mut self, key: &str, field: &str, delta: Increment) -> StorageResult<()> {
        let hash = self.hash_mut(key)?;
        let current = hash.get(field).cloned();
        let next = match delta {
            Increment::Int(d) => {
                let base = match current {
                    None => 0,
                    Some(v) => v.parse::<i64>().map_err(|_| {
                        StorageError::Backend(format!(
                            "hash value at '{key}.{field}' is not an integer"
                        ))
                    })?,
                };
                (base + d).to_string()
            }
            Increment::Float(d) => {
                let base = match current {
                    None => 0.0,
                    Some(v) => v.parse::<f64>().map_err(|_| {
                        StorageError::Backend(format!(
                            "hash value at '{key}.{field}' is not a float"
                        ))
                    })?,
                };
                (base + d).to_string()
            }
        };
        hash.insert(field.to_string(), next);
        Ok(())
    }

    fn add_to_sorted_set(&mut self, key: &str, members: &[(String, f64)], ttl: Option<Duration>) -> StorageResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let zset = self.zset_mut(key)?;
        for (member, score) in members {
            zset.insert(member.clone(), *score);
        }
        self.apply_ttl(key, ttl);
        Ok(())
    }

    fn trim_by_rank(&mut self, key: &str, start: isize, stop: isize) -> StorageResult<u64> {
        let ordered = self.sorted(key)?;
        let doomed = rank_slice(&ordered, start, stop);
        if doomed.is_empty() {
            return Ok(0);
        }
        let zset = self.zset_mut(key)?;
        for (member, _) in doomed {
            zset.remove(member);
        }
        let removed = doomed.len() as u64;
        self.drop_if_empty(key);
        Ok(removed)
    }

    fn remove_by_score(&mut self, key: &str, min: f64, max: f64) -> StorageResult<u64> {
        if self.live_value(key).is_none() {
            return Ok(0);
        }
        let zset = self.zset_mut(key)?;
        let before = zset.len();
        zset.retain(|_, score| !(*score >= min && *score <= max));
        let removed = (before - zset.len()) as u64;
        self.drop_if_empty(key);
        Ok(removed)
    }

    fn add_to_set(&mut self, key: &str, members: &[String]) -> StorageResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let set = self.set_mut(key)?;
        Ok(members.iter().filter(|m| set.insert((*m).clone())).count() as u64)
    }

    fn remove_from_set(&mut self, key: &str, members: &[String]) -> StorageResult<u64> {
        if self.live_value(key).is_none() {
            return Ok(0);
        }
        let set = self.set_mut(key)?;
        let removed = members.iter().filter(|m| set.remove(m.as_str())).count() as u64;
        self.drop_if_empty(key);
        Ok(removed)
    }

    fn expire(&mut self, key: &str, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return self.entries.remove(key).is_some();
        }
        match self.live(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }

    fn delete(&mut self, keys: &[String]) -> u64 {
        let now = Instant::now();
        keys.iter()
            .filter(|k| {
                self.entries
                    .remove(k.as_str())
                    .is_some_and(|e| !e.is_expired(now))
            })
            .count() as u64
    }

    fn apply(&mut self, command: StorageCommand) -> StorageResult<()> {
        match command {
            StorageCommand::SetScalar { key, value, ttl } => {
                self.set_scalar(&key, &value, ttl);
                Ok(())
            }
            StorageCommand::SetHash { key, fields, ttl } => self.set_hash(&key, &fields, ttl),
            StorageCommand::IncrementHashField { key, field, delta } => {
                self.increment(&key, &field, delta)
            }
            StorageCommand::AddToSortedSet { key, members, ttl } => {
                self.add_to_sorted_set(&key, &members, ttl)
            }
            StorageCommand::TrimSortedSetByRank { key, start, stop } => {
                self.trim_by_rank(&key, start, stop).map(|_| ())
            }
            StorageCommand::RemoveSortedSetByScore { key, min, max } => {
                self.remove_by_score(&key, min, max).map(|_| ())
            }
            StorageCommand::AddToSet { key, members } => self.add_to_set(&key, &members).map(|_| ()),
            StorageCommand::RemoveFromSet { key, members } => {
                self.remove_from_set(&key, &members).map(|_| ())
            }
            StorageCommand::Expire { key, ttl } => {
                self.expire(&key, ttl);
                Ok(())
            }
            StorageCommand::Delete { keys } => {
                self.delete(&keys);
                Ok(())
            }
        }
    }
}

/// Members ordered by score, ties broken lexicographically by member
fn sorted_members(zset: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut members: Vec<(String, f64)> = zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    members
}

/// Resolve Redis-style inclusive rank bounds against an ordered slice
fn rank_slice<T>(items: &[T], start: isize, stop: isize) -> &[T] {
    match resolve_rank_range(items.len(), start, stop) {
        Some((offset, count)) => &items[offset..offset + count],
        None => &items[0..0],
    }
}

/// Glob matching with `*` and `?`, as used by `SCAN MATCH`
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Process-local storage driver
///
/// Cloning shares the keyspace, so every component built from one driver sees the
/// same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageDriver {
    keyspace: Arc<Mutex<Keyspace>>,
}

impl MemoryStorageDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.keyspace
            .lock()
            .entries
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of a key, `None` when the key is missing or persistent
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut keyspace = self.keyspace.lock();
        let expires_at = keyspace.live(key)?.expires_at?;
        Some(expires_at.saturating_duration_since(Instant::now()))
    }

    pub fn flush(&self) {
        self.keyspace.lock().entries.clear();
    }

    /// Drop every expired entry now; returns how many were removed
    pub fn purge_expired(&self) -> u64 {
        let now = Instant::now();
        let mut keyspace = self.keyspace.lock();
        let before = keyspace.entries.len();
        keyspace.entries.retain(|_, e| !e.is_expired(now));
        (before - keyspace.entries.len()) as u64
    }
}

impl StorageDriver for MemoryStorageDriver {
    async fn set_scalar(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        self.keyspace.lock().set_scalar(key, value, ttl);
        Ok(())
    }

    async fn get_scalar(&self, key: &str) -> StorageResult<Option<String>> {
        let mut keyspace = self.keyspace.lock();
        match keyspace.live_value(key) {
            None => Ok(None),
            Some(Value::Scalar(v)) => Ok(Some(v.clone())),
            Some(other) => Err(wrong_type(key, "string", other)),
        }
    }

    async fn set_hash(
        &self,
        key: &str,
        fields: &[(String, String)],
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        self.keyspace.lock().set_hash(key, fields, ttl)
    }

    async fn get_hash(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        Ok(self.keyspace.lock().hash(key)?.cloned().unwrap_or_default())
    }

    async fn get_hash_field(&self, key: &str, field: &str) -> StorageResult<Option<String>> {
        Ok(self
            .keyspace
            .lock()
            .hash(key)?
            .and_then(|h| h.get(field).cloned()))
    }

    async fn increment_hash_field(
        &self,
        key: &str,
        field: &str,
        delta: Increment,
    ) -> StorageResult<()> {
        self.keyspace.lock().increment(key, field, delta)
    }

    async fn add_to_sorted_set(
        &self,
        key: &str,
        members: &[(String, f64)],
        ttl: Option<Duration>,
    ) -> StorageResult<()> {
        self.keyspace.lock().add_to_sorted_set(key, members, ttl)
    }

    async fn range_sorted_set_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> StorageResult<Vec<(String, f64)>> {
        let ordered = self.keyspace.lock().sorted(key)?;
        Ok(ordered
            .into_iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .collect())
    }

    async fn range_sorted_set_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StorageResult<Vec<(String, f64)>> {
        let ordered = self.keyspace.lock().sorted(key)?;
        Ok(rank_slice(&ordered, start, stop).to_vec())
    }

    async fn count_sorted_set_by_score(&self, key: &str, min: f64, max: f64) -> StorageResult<u64> {
        let ordered = self.keyspace.lock().sorted(key)?;
        Ok(ordered
            .iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .count() as u64)
    }

    async fn sorted_set_cardinality(&self, key: &str) -> StorageResult<u64> {
        Ok(self.keyspace.lock().sorted(key)?.len() as u64)
    }

    async fn trim_sorted_set_by_rank(&self, key: &str, start: isize, stop: isize) -> StorageResult<u64> {
        self.keyspace.lock().trim_by_rank(key, start, stop)
    }

    async fn remove_sorted_set_by_score(&self, key: &str, min: f64, max: f64) -> StorageResult<u64> {
        self.keyspace.lock().remove_by_score(key, min, max)
    }

    async fn remove_from_sorted_set(&self, key: &str, member: &str) -> StorageResult<bool> {
        let mut keyspace = self.keyspace.lock();
        if keyspace.live_value(key).is_none() {
            return Ok(false);
        }
        let removed = keyspace.zset_mut(key)?.remove(member).is_some();
        keyspace.drop_if_empty(key);
        Ok(removed)
    }

    async fn add_to_set(&self, key: &str, members: &[String]) -> StorageResult<u64> {
        self.keyspace.lock().add_to_set(key, members)
    }

    async fn remove_from_set(&self, key: &str, members: &[String]) -> StorageResult<u64> {
        self.keyspace.lock().remove_from_set(key, members)
    }

    async fn set_members(&self, key: &str) -> StorageResult<Vec<String>> {
        let mut keyspace = self.keyspace.lock();
        match keyspace.live_value(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(s)) => Ok(s.iter().cloned().collect()),
            Some(other) => Err(wrong_type(key, "set", other)),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.keyspace.lock().live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        Ok(self.keyspace.lock().expire(key, ttl))
    }

    async fn delete(&self, keys: &[String]) -> StorageResult<u64> {
        Ok(self.keyspace.lock().delete(keys))
    }

    async fn scan_keys(&self, pattern: &str) -> StorageResult<Vec<String>> {
        let now = Instant::now();
        let keyspace = self.keyspace.lock();
        // expired entries are hidden, not removed; purge_expired owns removal
        let mut keys: Vec<String> = keyspace
            .entries
            .iter()
            .filter(|(k, e)| !e.is_expired(now) && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn pipeline(&self, commands: Vec<StorageCommand>) -> StorageResult<()> {
        let mut keyspace = self.keyspace.lock();
        for command in commands {
            keyspace.apply(command)?;
        }
        Ok(())
    }

    async fn ping(&self) -> StorageResult<bool> {
        Ok(true)
    }

    fn driver_name(&self) -> &'static str {
        "memory"
    }
}
