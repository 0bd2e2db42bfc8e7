//! Per-job-class counters, samples and computed statistics

use super::fields::{FieldReader, FieldWriter};
use super::identity::JobIdentity;
use crate::constants::{HEALTHY_JOB_FAILURE_RATE, HEALTHY_JOB_SUCCESS_RATE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hash field names of the job aggregate
pub mod field {
    pub const TOTAL_QUEUED: &str = "total_queued";
    pub const TOTAL_PROCESSED: &str = "total_processed";
    pub const TOTAL_FAILED: &str = "total_failed";
    pub const TOTAL_DURATION_MS: &str = "total_duration_ms";
    pub const TOTAL_MEMORY_MB: &str = "total_memory_mb";
    pub const TOTAL_CPU_TIME_MS: &str = "total_cpu_time_ms";
    pub const TOTAL_TIMEOUTS: &str = "total_timeouts";
    pub const TOTAL_EXCEPTIONS: &str = "total_exceptions";
    pub const TOTAL_RETRIES: &str = "total_retries";
    pub const LAST_RETRY_ATTEMPT: &str = "last_retry_attempt";
    pub const LAST_PROCESSED_AT: &str = "last_processed_at";
    pub const LAST_FAILED_AT: &str = "last_failed_at";
    pub const LAST_EXCEPTION: &str = "last_exception";
    pub const LAST_ACTIVITY_AT: &str = "last_activity_at";
}

/// Monotonic counters for one job class within its TTL window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetricsAggregate {
    pub total_queued: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub total_duration_ms: f64,
    pub total_memory_mb: f64,
    pub total_cpu_time_ms: f64,
    pub total_timeouts: u64,
    pub total_exceptions: u64,
    pub total_retries: u64,
    pub last_retry_attempt: Option<u64>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub last_exception: Option<String>,
}

impl JobMetricsAggregate {
    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> Self {
        let reader = FieldReader::new(key, fields);
        Self {
            total_queued: reader.u64(field::TOTAL_QUEUED),
            total_processed: reader.u64(field::TOTAL_PROCESSED),
            total_failed: reader.u64(field::TOTAL_FAILED),
            total_duration_ms: reader.f64(field::TOTAL_DURATION_MS),
            total_memory_mb: reader.f64(field::TOTAL_MEMORY_MB),
            total_cpu_time_ms: reader.f64(field::TOTAL_CPU_TIME_MS),
            total_timeouts: reader.u64(field::TOTAL_TIMEOUTS),
            total_exceptions: reader.u64(field::TOTAL_EXCEPTIONS),
            total_retries: reader.u64(field::TOTAL_RETRIES),
            last_retry_attempt: reader.parsed(field::LAST_RETRY_ATTEMPT),
            last_processed_at: reader.timestamp(field::LAST_PROCESSED_AT),
            last_failed_at: reader.timestamp(field::LAST_FAILED_AT),
            last_exception: reader.string(field::LAST_EXCEPTION),
        }
    }

    /// Jobs that reached a terminal outcome
    pub fn total_finished(&self) -> u64 {
        self.total_processed + self.total_failed
    }

    pub fn avg_duration_ms(&self) -> f64 {
        mean(self.total_duration_ms, self.total_processed)
    }

    pub fn avg_memory_mb(&self) -> f64 {
        mean(self.total_memory_mb, self.total_processed)
    }

    pub fn avg_cpu_time_ms(&self) -> f64 {
        mean(self.total_cpu_time_ms, self.total_processed)
    }

    /// `failed / (processed + failed) * 100`, 0 when nothing finished
    pub fn failure_rate(&self) -> f64 {
        percentage(self.total_failed, self.total_finished())
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_finished() == 0 {
            return 0.0;
        }
        percentage(self.total_processed, self.total_finished())
    }
}

fn mean(total: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// One completed-job observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSample {
    pub job_id: String,
    pub job: JobIdentity,
    pub duration_ms: f64,
    pub memory_mb: f64,
    pub cpu_time_ms: f64,
    pub completed_at: DateTime<Utc>,
}

/// Sorted-set member for a sample: `"{job_id}:{value}"`
pub fn sample_member(job_id: &str, value: f64) -> String {
    format!("{job_id}:{value}")
}

/// Value half of a sample member; bare numeric members are accepted too
pub fn parse_sample_member(member: &str) -> Option<f64> {
    let value = match member.rsplit_once(':') {
        Some((_, value)) => value,
        None => member,
    };
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Short-lived record linking a job id to its class between start and finish
#[derive(Debug, Clone, PartialEq)]
pub struct JobTracking {
    pub job: JobIdentity,
    pub started_at: DateTime<Utc>,
}

impl JobTracking {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        FieldWriter::new()
            .put("job_class", &self.job.job_class)
            .put("connection", &self.job.connection)
            .put("queue", &self.job.queue)
            .put_timestamp("started_at", self.started_at)
            .build()
    }

    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> Option<Self> {
        let reader = FieldReader::new(key, fields);
        Some(Self {
            job: JobIdentity::new(
                reader.string("connection")?,
                reader.string("queue")?,
                reader.string("job_class")?,
            ),
            started_at: reader.timestamp("started_at")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_queued: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub avg: f64,
    pub peak: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub avg: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    pub per_minute: f64,
    pub per_hour: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub count: u64,
    pub rate: f64,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub last_exception: Option<String>,
}

/// Diagnostic counters that never affect processed/failed totals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryCounters {
    pub timeouts: u64,
    pub exceptions: u64,
    pub retries: u64,
    pub last_retry_attempt: Option<u64>,
    pub exceptions_by_class: HashMap<String, u64>,
}

/// Sample statistics over one trailing time window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub window_seconds: i64,
    pub jobs_processed: u64,
    pub avg_duration: f64,
    /// Jobs per minute over the window
    pub throughput: f64,
}

impl WindowStats {
    /// `45s`, `5m`, `1h`, `1d`
    pub fn label(&self) -> String {
        let seconds = self.window_seconds;
        match seconds {
            s if s < 60 => format!("{s}s"),
            s if s < 3600 => format!("{}m", s / 60),
            s if s < 86_400 => format!("{}h", s / 3600),
            s => format!("{}d", s / 86_400),
        }
    }
}

/// Everything known about one job class at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetricsData {
    pub job_class: String,
    pub connection: String,
    pub queue: String,
    pub execution: ExecutionStats,
    pub duration: DurationStats,
    pub memory: MemoryStats,
    pub cpu: CpuStats,
    pub throughput: ThroughputStats,
    pub failures: FailureInfo,
    pub auxiliary: AuxiliaryCounters,
    pub window_stats: Vec<WindowStats>,
    pub calculated_at: DateTime<Utc>,
}

impl JobMetricsData {
    /// Zero-valued metrics for a known job class with no data
    pub fn empty(job: &JobIdentity, calculated_at: DateTime<Utc>) -> Self {
        Self {
            job_class: job.job_class.clone(),
            connection: job.connection.clone(),
            queue: job.queue.clone(),
            execution: ExecutionStats::default(),
            duration: DurationStats::default(),
            memory: MemoryStats::default(),
            cpu: CpuStats::default(),
            throughput: ThroughputStats::default(),
            failures: FailureInfo::default(),
            auxiliary: AuxiliaryCounters::default(),
            window_stats: Vec::new(),
            calculated_at,
        }
    }

    pub fn identity(&self) -> JobIdentity {
        JobIdentity::new(&self.connection, &self.queue, &self.job_class)
    }

    pub fn has_failures(&self) -> bool {
        self.failures.count > 0
    }

    pub fn is_healthy(&self) -> bool {
        self.execution.success_rate >= HEALTHY_JOB_SUCCESS_RATE
            && self.failures.rate < HEALTHY_JOB_FAILURE_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_rates() {
        let aggregate = JobMetricsAggregate {
            total_processed: 7,
            total_failed: 3,
            total_duration_ms: 700.0,
            ..Default::default()
        };
        assert!((aggregate.failure_rate() - 30.0).abs() < 1e-9);
        assert!((aggregate.success_rate() - 70.0).abs() < 1e-9);
        assert!((aggregate.avg_duration_ms() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_aggregate_has_zero_rates() {
        let aggregate = JobMetricsAggregate::default();
        assert_eq!(aggregate.failure_rate(), 0.0);
        assert_eq!(aggregate.success_rate(), 0.0);
        assert_eq!(aggregate.avg_duration_ms(), 0.0);
    }

    #[test]
    fn test_sample_member_parsing() {
        assert_eq!(parse_sample_member(&sample_member("job-1", 12.5)), Some(12.5));
        assert_eq!(parse_sample_member("uuid:with:colons:250"), Some(250.0));
        assert_eq!(parse_sample_member("42"), Some(42.0));
        assert_eq!(parse_sample_member("job-1:oops"), None);
    }

    #[test]
    fn test_window_labels() {
        let label = |window_seconds| {
            WindowStats {
                window_seconds,
                ..Default::default()
            }
            .label()
        };
        assert_eq!(label(45), "45s");
        assert_eq!(label(300), "5m");
        assert_eq!(label(3600), "1h");
        assert_eq!(label(172_800), "2d");
    }

    #[test]
    fn test_job_health() {
        let job = JobIdentity::new("redis", "default", "SendEmail");
        let mut data = JobMetricsData::empty(&job, Utc::now());
        data.execution.success_rate = 99.0;
        data.failures.rate = 1.0;
        assert!(data.is_healthy());
        data.failures.rate = 6.0;
        assert!(!data.is_healthy());
    }

    #[test]
    fn test_tracking_round_trip() {
        let tracking = JobTracking {
            job: JobIdentity::new("redis", "default", "SendEmail"),
            started_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let fields: HashMap<String, String> = tracking.to_fields().into_iter().collect();
        assert_eq!(JobTracking::from_fields("k", &fields), Some(tracking));
        assert_eq!(JobTracking::from_fields("k", &HashMap::new()), None);
    }
}
