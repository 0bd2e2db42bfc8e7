//! Queue snapshots, depth readings and health scoring

use super::fields::{truncate_to_seconds, FieldReader, FieldWriter};
use super::identity::QueueIdentity;
use crate::constants::health;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Queue health classification derived from the health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    /// No snapshot has been recorded yet
    Unknown,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> Self {
        if score >= health::HEALTHY_MIN_SCORE {
            Self::Healthy
        } else if score >= health::WARNING_MIN_SCORE {
            Self::Warning
        } else {
            Self::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "healthy" => Some(Self::Healthy),
            "warning" => Some(Self::Warning),
            "critical" => Some(Self::Critical),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite health score in `[0, 100]`.
///
/// Starts at 100 and subtracts capped penalties for depth over 100, oldest job
/// age over 5 minutes, the failure rate, and a backlog with no active workers.
pub fn calculate_health_score(
    depth: u64,
    oldest_job_age_seconds: u64,
    failure_rate: f64,
    active_workers: u64,
) -> f64 {
    let mut score = health::MAX_SCORE;

    if depth > health::DEPTH_THRESHOLD {
        let excess = (depth - health::DEPTH_THRESHOLD) as f64;
        score -= (excess / health::DEPTH_PENALTY_DIVISOR).min(health::MAX_DEPTH_PENALTY);
    }

    if oldest_job_age_seconds > health::AGE_THRESHOLD_SECONDS {
        let excess = (oldest_job_age_seconds - health::AGE_THRESHOLD_SECONDS) as f64;
        score -= (excess / health::AGE_PENALTY_DIVISOR).min(health::MAX_AGE_PENALTY);
    }

    if failure_rate.is_finite() && failure_rate > 0.0 {
        score -= failure_rate.min(health::MAX_FAILURE_PENALTY);
    }

    if depth > 0 && active_workers == 0 {
        score -= health::NO_WORKERS_PENALTY;
    }

    score.clamp(0.0, health::MAX_SCORE)
}

/// Latest computed state of one queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub connection: String,
    pub queue: String,
    pub depth: u64,
    pub pending: u64,
    pub scheduled: u64,
    pub reserved: u64,
    pub oldest_job_age: u64,
    pub throughput_per_minute: f64,
    pub avg_duration: f64,
    pub failure_rate: f64,
    pub utilization_rate: f64,
    pub active_workers: u64,
    pub health_score: f64,
    pub health_status: HealthStatus,
    pub recorded_at: DateTime<Utc>,
}

impl QueueSnapshot {
    /// Zero-valued snapshot, scored
    pub fn empty(queue: &QueueIdentity, recorded_at: DateTime<Utc>) -> Self {
        Self {
            connection: queue.connection.clone(),
            queue: queue.queue.clone(),
            depth: 0,
            pending: 0,
            scheduled: 0,
            reserved: 0,
            oldest_job_age: 0,
            throughput_per_minute: 0.0,
            avg_duration: 0.0,
            failure_rate: 0.0,
            utilization_rate: 0.0,
            active_workers: 0,
            health_score: 0.0,
            health_status: HealthStatus::Unknown,
            recorded_at: truncate_to_seconds(recorded_at),
        }
        .scored()
    }

    pub fn identity(&self) -> QueueIdentity {
        QueueIdentity::new(&self.connection, &self.queue)
    }

    /// Recompute `health_score` and `health_status` from the other fields
    pub fn scored(mut self) -> Self {
        self.health_score = calculate_health_score(
            self.depth,
            self.oldest_job_age,
            self.failure_rate,
            self.active_workers,
        );
        self.health_status = HealthStatus::from_score(self.health_score);
        self
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        FieldWriter::new()
            .put("connection", &self.connection)
            .put("queue", &self.queue)
            .put("depth", self.depth)
            .put("pending", self.pending)
            .put("scheduled", self.scheduled)
            .put("reserved", self.reserved)
            .put("oldest_job_age", self.oldest_job_age)
            .put("throughput_per_minute", self.throughput_per_minute)
            .put("avg_duration", self.avg_duration)
            .put("failure_rate", self.failure_rate)
            .put("utilization_rate", self.utilization_rate)
            .put("active_workers", self.active_workers)
            .put("health_score", self.health_score)
            .put("health_status", self.health_status)
            .put_timestamp("recorded_at", self.recorded_at)
            .build()
    }

    /// `None` when nothing was ever stored under the key
    pub fn from_fields(
        key: &str,
        queue: &QueueIdentity,
        fields: &HashMap<String, String>,
    ) -> Option<Self> {
        let reader = FieldReader::new(key, fields);
        if reader.is_empty() {
            return None;
        }

        let health_score = reader.f64("health_score");
        let health_status = reader
            .string("health_status")
            .and_then(|status| HealthStatus::parse(&status))
            .unwrap_or_else(|| HealthStatus::from_score(health_score));

        Some(Self {
            connection: reader.string_or("connection", &queue.connection),
            queue: reader.string_or("queue", &queue.queue),
            depth: reader.u64("depth"),
            pending: reader.u64("pending"),
            scheduled: reader.u64("scheduled"),
            reserved: reader.u64("reserved"),
            oldest_job_age: reader.u64("oldest_job_age"),
            throughput_per_minute: reader.f64("throughput_per_minute"),
            avg_duration: reader.f64("avg_duration"),
            failure_rate: reader.f64("failure_rate"),
            utilization_rate: reader.f64("utilization_rate"),
            active_workers: reader.u64("active_workers"),
            health_score,
            health_status,
            recorded_at: reader
                .timestamp("recorded_at")
                .unwrap_or(DateTime::UNIX_EPOCH),
        })
    }
}

/// Point-in-time job counts reported by a [`crate::aggregation::QueueInspector`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDepthData {
    pub connection: String,
    pub queue: String,
    pub pending_jobs: u64,
    pub reserved_jobs: u64,
    pub delayed_jobs: u64,
    pub oldest_pending_job_at: Option<DateTime<Utc>>,
    pub oldest_delayed_job_at: Option<DateTime<Utc>>,
    pub measured_at: DateTime<Utc>,
}

impl QueueDepthData {
    pub fn empty(queue: &QueueIdentity, measured_at: DateTime<Utc>) -> Self {
        Self {
            connection: queue.connection.clone(),
            queue: queue.queue.clone(),
            pending_jobs: 0,
            reserved_jobs: 0,
            delayed_jobs: 0,
            oldest_pending_job_at: None,
            oldest_delayed_job_at: None,
            measured_at,
        }
    }

    pub fn total_jobs(&self) -> u64 {
        self.pending_jobs + self.reserved_jobs + self.delayed_jobs
    }

    pub fn has_backlog(&self) -> bool {
        self.pending_jobs > 0
    }

    pub fn is_empty(&self) -> bool {
        self.total_jobs() == 0
    }

    /// Age of the oldest pending job at measurement time
    pub fn oldest_pending_age_seconds(&self) -> u64 {
        self.oldest_pending_job_at
            .map(|at| (self.measured_at - at).num_seconds().max(0) as u64)
            .unwrap_or(0)
    }
}

/// One timestamped value of a depth or throughput series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Trend data for one queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTrends {
    pub connection: String,
    pub queue: String,
    pub snapshots: Vec<QueueSnapshot>,
    pub depth_history: Vec<HistoryPoint>,
    pub throughput_history: Vec<HistoryPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_score_penalties() {
        assert_eq!(calculate_health_score(0, 0, 0.0, 0), 100.0);
        // 50 excess jobs -> 5 points
        assert_eq!(calculate_health_score(150, 0, 0.0, 1), 95.0);
        // depth penalty caps at 30
        assert_eq!(calculate_health_score(10_000, 0, 0.0, 1), 70.0);
        // 10 minutes over the 5 minute threshold -> 10 points
        assert_eq!(calculate_health_score(0, 900, 0.0, 0), 90.0);
        // failure penalty caps at 20
        assert_eq!(calculate_health_score(0, 0, 75.0, 0), 80.0);
        // backlog without workers
        assert_eq!(calculate_health_score(10, 0, 0.0, 0), 80.0);
    }

    #[test]
    fn test_health_score_floors_at_zero() {
        assert_eq!(calculate_health_score(100_000, 100_000, 100.0, 0), 0.0);
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(HealthStatus::from_score(80.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_score(79.9), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_score(50.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_score(49.9), HealthStatus::Critical);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let queue = QueueIdentity::new("redis", "emails");
        let snapshot = QueueSnapshot {
            depth: 150,
            pending: 140,
            scheduled: 5,
            reserved: 5,
            oldest_job_age: 420,
            throughput_per_minute: 12.5,
            avg_duration: 133.333_333_333_333_34,
            failure_rate: 2.5,
            utilization_rate: 66.666_666_666_666_67,
            active_workers: 3,
            ..QueueSnapshot::empty(&queue, DateTime::from_timestamp(1_700_000_000, 0).unwrap())
        }
        .scored();

        let fields: HashMap<String, String> = snapshot.to_fields().into_iter().collect();
        let restored = QueueSnapshot::from_fields("k", &queue, &fields).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_missing_snapshot_is_none() {
        let queue = QueueIdentity::new("redis", "emails");
        assert!(QueueSnapshot::from_fields("k", &queue, &HashMap::new()).is_none());
    }

    #[test]
    fn test_depth_data() {
        let now = DateTime::from_timestamp(1_700_000_600, 0).unwrap();
        let depth = QueueDepthData {
            pending_jobs: 3,
            reserved_jobs: 1,
            delayed_jobs: 2,
            oldest_pending_job_at: DateTime::from_timestamp(1_700_000_000, 0),
            ..QueueDepthData::empty(&QueueIdentity::new("redis", "default"), now)
        };
        assert_eq!(depth.total_jobs(), 6);
        assert!(depth.has_backlog());
        assert_eq!(depth.oldest_pending_age_seconds(), 600);
    }
}
