//! Batched write commands
//!
//! A [`Pipeline`] collects writes that a recorder wants applied together. The Redis
//! driver sends them as one `MULTI`/`EXEC` block, the database driver runs them in a
//! single transaction and the memory driver applies them under one lock.

use std::time::Duration;

/// Delta for an atomic hash field increment
///
/// Integer and float increments map to different server commands (`HINCRBY` vs
/// `HINCRBYFLOAT`), so the distinction is kept all the way to the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Increment {
    Int(i64),
    Float(f64),
}

impl Increment {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }
}

impl From<i64> for Increment {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Increment {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A single write inside a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum StorageCommand {
    SetScalar {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    SetHash {
        key: String,
        fields: Vec<(String, String)>,
        ttl: Option<Duration>,
    },
    IncrementHashField {
        key: String,
        field: String,
        delta: Increment,
    },
    AddToSortedSet {
        key: String,
        members: Vec<(String, f64)>,
        ttl: Option<Duration>,
    },
    TrimSortedSetByRank {
        key: String,
        start: isize,
        stop: isize,
    },
    RemoveSortedSetByScore {
        key: String,
        min: f64,
        max: f64,
    },
    AddToSet {
        key: String,
        members: Vec<String>,
    },
    RemoveFromSet {
        key: String,
        members: Vec<String>,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Delete {
        keys: Vec<String>,
    },
}

impl StorageCommand {
    /// Key the command writes to (first key for multi-key deletes)
    pub fn key(&self) -> &str {
        match self {
            Self::SetScalar { key, .. }
            | Self::SetHash { key, .. }
            | Self::IncrementHashField { key, .. }
            | Self::AddToSortedSet { key, .. }
            | Self::TrimSortedSetByRank { key, .. }
            | Self::RemoveSortedSetByScore { key, .. }
            | Self::AddToSet { key, .. }
            | Self::RemoveFromSet { key, .. }
            | Self::Expire { key, .. } => key,
            Self::Delete { keys } => keys.first().map(String::as_str).unwrap_or(""),
        }
    }
}

/// Ordered batch of writes built with chained calls
///
/// ```rust
/// use queue_metrics::storage::Pipeline;
/// use std::time::Duration;
///
/// let pipeline = Pipeline::new()
///     .increment_hash_field("qm:jobs:redis:default:SendEmail", "total_processed", 1_i64)
///     .add_to_sorted_set("qm:durations:redis:default:SendEmail", "job-1:120", 1_700_000_000.0, None)
///     .trim_sorted_set_by_rank("qm:durations:redis:default:SendEmail", 0, -10_001)
///     .expire("qm:durations:redis:default:SendEmail", Duration::from_secs(3600));
///
/// assert_eq!(pipeline.len(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    commands: Vec<StorageCommand>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, command: StorageCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn set_scalar(self, key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) -> Self {
        self.push(StorageCommand::SetScalar {
            key: key.into(),
            value: value.into(),
            ttl,
        })
    }

    pub fn set_hash(self, key: impl Into<String>, fields: Vec<(String, String)>, ttl: Option<Duration>) -> Self {
        self.push(StorageCommand::SetHash {
            key: key.into(),
            fields,
            ttl,
        })
    }

    pub fn set_hash_field(self, key: impl Into<String>, field: impl Into<String>, value: impl ToString) -> Self {
        self.set_hash(key, vec![(field.into(), value.to_string())], None)
    }

    pub fn increment_hash_field(
        self,
        key: impl Into<String>,
        field: impl Into<String>,
        delta: impl Into<Increment>,
    ) -> Self {
        self.push(StorageCommand::IncrementHashField {
            key: key.into(),
            field: field.into(),
            delta: delta.into(),
        })
    }

    pub fn add_to_sorted_set(
        self,
        key: impl Into<String>,
        member: impl Into<String>,
        score: f64,
        ttl: Option<Duration>,
    ) -> Self {
        self.push(StorageCommand::AddToSortedSet {
            key: key.into(),
            members: vec![(member.into(), score)],
            ttl,
        })
    }

    pub fn trim_sorted_set_by_rank(self, key: impl Into<String>, start: isize, stop: isize) -> Self {
        self.push(StorageCommand::TrimSortedSetByRank {
            key: key.into(),
            start,
            stop,
        })
    }

    pub fn remove_sorted_set_by_score(self, key: impl Into<String>, min: f64, max: f64) -> Self {
        self.push(StorageCommand::RemoveSortedSetByScore {
            key: key.into(),
            min,
            max,
        })
    }

    pub fn add_to_set(self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.push(StorageCommand::AddToSet {
            key: key.into(),
            members: vec![member.into()],
        })
    }

    pub fn remove_from_set(self, key: impl Into<String>, member: impl Into<String>) -> Self {
        self.push(StorageCommand::RemoveFromSet {
            key: key.into(),
            members: vec![member.into()],
        })
    }

    pub fn expire(self, key: impl Into<String>, ttl: Duration) -> Self {
        self.push(StorageCommand::Expire {
            key: key.into(),
            ttl,
        })
    }

    pub fn delete(self, key: impl Into<String>) -> Self {
        self.push(StorageCommand::Delete {
            keys: vec![key.into()],
        })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[StorageCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<StorageCommand> {
        self.commands
    }
}

/// Render a score bound the way Redis expects it
pub fn format_score_bound(score: f64) -> String {
    if score == f64::INFINITY {
        "+inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

/// Resolve Redis-style inclusive rank bounds into `(offset, count)`
///
/// Negative indices count from the end. Returns `None` when the range is empty.
pub fn resolve_rank_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    if len == 0 {
        return None;
    }
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, (stop - start + 1) as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_from_primitives() {
        assert_eq!(Increment::from(3_i64), Increment::Int(3));
        assert_eq!(Increment::from(1.5_f64), Increment::Float(1.5));
        assert_eq!(Increment::Int(2).as_f64(), 2.0);
    }

    #[test]
    fn test_pipeline_preserves_order() {
        let pipeline = Pipeline::new()
            .increment_hash_field("a", "count", 1_i64)
            .set_hash_field("a", "last", 42)
            .delete("b");

        let keys: Vec<&str> = pipeline.commands().iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec!["a", "a", "b"]);
        assert!(matches!(
            pipeline.commands()[1],
            StorageCommand::SetHash { ref fields, .. } if fields[0] == ("last".to_string(), "42".to_string())
        ));
    }

    #[test]
    fn test_resolve_rank_range() {
        assert_eq!(resolve_rank_range(5, 0, -1), Some((0, 5)));
        assert_eq!(resolve_rank_range(5, -2, -1), Some((3, 2)));
        assert_eq!(resolve_rank_range(5, 1, 100), Some((1, 4)));
        assert_eq!(resolve_rank_range(5, 3, 1), None);
        assert_eq!(resolve_rank_range(0, 0, -1), None);
        // Keeping the newest 10,000 of 5 removes nothing
        assert_eq!(resolve_rank_range(5, 0, -10_001), None);
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(format_score_bound(f64::INFINITY), "+inf");
        assert_eq!(format_score_bound(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_score_bound(1700000000.0), "1700000000");
    }
}
