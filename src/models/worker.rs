//! Worker heartbeats and state

use super::fields::{FieldReader, FieldWriter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lifecycle state reported by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Idle,
    Busy,
    Paused,
    Stopped,
    Crashed,
    Unknown,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Crashed => "crashed",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Idle | Self::Busy | Self::Paused)
    }

    /// Able to pick up work right now
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Idle | Self::Busy)
    }

    pub fn requires_attention(&self) -> bool {
        matches!(self, Self::Crashed | Self::Stopped)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "busy" => Ok(Self::Busy),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            "crashed" => Ok(Self::Crashed),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown worker state '{other}'")),
        }
    }
}

/// Stored liveness record for one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    pub connection: String,
    pub queue: String,
    pub state: WorkerState,
    pub last_heartbeat: DateTime<Utc>,
    pub last_state_change: Option<DateTime<Utc>>,
    pub current_job_id: Option<String>,
    pub current_job_class: Option<String>,
    pub idle_time_seconds: f64,
    pub busy_time_seconds: f64,
    pub jobs_processed: u64,
    pub pid: u32,
    pub hostname: String,
}

impl WorkerHeartbeat {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        FieldWriter::new()
            .put("worker_id", &self.worker_id)
            .put("connection", &self.connection)
            .put("queue", &self.queue)
            .put("state", self.state)
            .put_timestamp("last_heartbeat", self.last_heartbeat)
            .put_opt_timestamp("last_state_change", self.last_state_change)
            .put("current_job_id", self.current_job_id.as_deref().unwrap_or(""))
            .put("current_job_class", self.current_job_class.as_deref().unwrap_or(""))
            .put("idle_time_seconds", self.idle_time_seconds)
            .put("busy_time_seconds", self.busy_time_seconds)
            .put("jobs_processed", self.jobs_processed)
            .put("pid", self.pid)
            .put("hostname", &self.hostname)
            .build()
    }

    /// `None` for an empty hash or one without a heartbeat timestamp
    pub fn from_fields(key: &str, worker_id: &str, fields: &HashMap<String, String>) -> Option<Self> {
        let reader = FieldReader::new(key, fields);
        let last_heartbeat = reader.timestamp("last_heartbeat")?;
        Some(Self {
            worker_id: reader.string_or("worker_id", worker_id),
            connection: reader.string_or("connection", "default"),
            queue: reader.string_or("queue", "default"),
            state: reader.parsed("state").unwrap_or(WorkerState::Unknown),
            last_heartbeat,
            last_state_change: reader.timestamp("last_state_change"),
            current_job_id: reader.string("current_job_id"),
            current_job_class: reader.string("current_job_class"),
            idle_time_seconds: reader.f64("idle_time_seconds"),
            busy_time_seconds: reader.f64("busy_time_seconds"),
            jobs_processed: reader.u64("jobs_processed"),
            pid: reader.parsed("pid").unwrap_or(0),
            hostname: reader.string_or("hostname", "unknown"),
        })
    }

    pub fn seconds_since_last_heartbeat(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_heartbeat).num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Stale once strictly more than `threshold` has passed since the last heartbeat
    pub fn is_stale_at(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.seconds_since_last_heartbeat(now) > threshold.as_secs_f64()
    }

    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.is_stale_at(threshold, Utc::now())
    }

    /// Share of tracked time spent idle, 0 when nothing is tracked yet
    pub fn idle_percentage(&self) -> f64 {
        let total = self.idle_time_seconds + self.busy_time_seconds;
        if total <= 0.0 {
            0.0
        } else {
            self.idle_time_seconds / total * 100.0
        }
    }
}

/// Who a worker is, as reported by a [`crate::recorders::WorkerIdentityProvider`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub worker_id: String,
    pub hostname: String,
    pub pid: u32,
}

/// Worker rollup for one queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub connection: String,
    pub queue: String,
    pub total_workers: u64,
    /// Non-stale workers in an active state
    pub active_workers: u64,
    pub busy_workers: u64,
    pub idle_workers: u64,
    pub stale_workers: u64,
    pub jobs_processed: u64,
    pub avg_idle_percentage: f64,
}

impl WorkerStats {
    /// Busy share of active workers, 0 without active workers
    pub fn utilization_rate(&self) -> f64 {
        if self.active_workers == 0 {
            0.0
        } else {
            self.busy_workers as f64 / self.active_workers as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(at: i64) -> WorkerHeartbeat {
        WorkerHeartbeat {
            worker_id: "worker_host_1".to_string(),
            connection: "redis".to_string(),
            queue: "default".to_string(),
            state: WorkerState::Busy,
            last_heartbeat: DateTime::from_timestamp(at, 0).unwrap(),
            last_state_change: None,
            current_job_id: Some("job-1".to_string()),
            current_job_class: Some("SendEmail".to_string()),
            idle_time_seconds: 30.0,
            busy_time_seconds: 90.0,
            jobs_processed: 4,
            pid: 1,
            hostname: "host".to_string(),
        }
    }

    #[test]
    fn test_state_predicates() {
        assert!(WorkerState::Paused.is_healthy());
        assert!(!WorkerState::Paused.is_active());
        assert!(WorkerState::Crashed.requires_attention());
        assert!(!WorkerState::Unknown.is_healthy());
        assert_eq!("busy".parse::<WorkerState>(), Ok(WorkerState::Busy));
        assert!("sleeping".parse::<WorkerState>().is_err());
    }

    #[test]
    fn test_staleness_boundary() {
        let hb = heartbeat(1_700_000_000);
        let threshold = Duration::from_secs(60);
        let at = |secs: i64| DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap();

        assert!(!hb.is_stale_at(threshold, at(59)));
        assert!(!hb.is_stale_at(threshold, at(60)));
        assert!(hb.is_stale_at(threshold, at(61)));
    }

    #[test]
    fn test_round_trip_clears_job_fields() {
        let mut hb = heartbeat(1_700_000_000);
        let fields: HashMap<String, String> = hb.to_fields().into_iter().collect();
        assert_eq!(WorkerHeartbeat::from_fields("k", "worker_host_1", &fields), Some(hb.clone()));

        hb.state = WorkerState::Idle;
        hb.current_job_id = None;
        hb.current_job_class = None;
        let fields: HashMap<String, String> = hb.to_fields().into_iter().collect();
        let restored = WorkerHeartbeat::from_fields("k", "worker_host_1", &fields).unwrap();
        assert_eq!(restored.current_job_id, None);
        assert_eq!(restored.state, WorkerState::Idle);
    }

    #[test]
    fn test_idle_percentage() {
        assert!((heartbeat(0).idle_percentage() - 25.0).abs() < 1e-9);
    }
}
