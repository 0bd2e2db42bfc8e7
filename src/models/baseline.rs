//! Learned per-queue resource profile used for capacity planning

use super::fields::{FieldReader, FieldWriter};
use super::identity::QueueIdentity;
use crate::constants::baseline::{
    MILLIS_PER_HOUR, RELIABLE_MIN_CONFIDENCE, RELIABLE_MIN_SAMPLES, WANTED_SAMPLES,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineData {
    pub connection: String,
    pub queue: String,
    pub cpu_percent_per_job: f64,
    pub memory_mb_per_job: f64,
    pub avg_duration_ms: f64,
    pub sample_count: u64,
    /// In `[0, 1]`
    pub confidence_score: f64,
    pub calculated_at: DateTime<Utc>,
    /// The window that produced this baseline deviated from the previous one
    pub significant_deviation: bool,
}

impl BaselineData {
    pub fn identity(&self) -> QueueIdentity {
        QueueIdentity::new(&self.connection, &self.queue)
    }

    pub fn is_reliable(&self) -> bool {
        self.sample_count >= RELIABLE_MIN_SAMPLES && self.confidence_score >= RELIABLE_MIN_CONFIDENCE
    }

    pub fn needs_more_samples(&self) -> bool {
        self.sample_count < WANTED_SAMPLES
    }

    /// Jobs per hour the given spare CPU and memory could absorb.
    ///
    /// Parallel job slots are whole jobs (truncated), and so is the hourly
    /// estimate. Any non-positive input yields 0.
    pub fn estimate_capacity(&self, available_cpu_percent: f64, available_memory_mb: f64) -> u64 {
        let inputs = [
            self.cpu_percent_per_job,
            self.memory_mb_per_job,
            self.avg_duration_ms,
            available_cpu_percent,
            available_memory_mb,
        ];
        if inputs.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return 0;
        }

        let cpu_slots = (available_cpu_percent / self.cpu_percent_per_job).trunc();
        let memory_slots = (available_memory_mb / self.memory_mb_per_job).trunc();
        let parallel_jobs = cpu_slots.min(memory_slots);
        if parallel_jobs <= 0.0 {
            return 0;
        }

        (parallel_jobs * MILLIS_PER_HOUR / self.avg_duration_ms).trunc() as u64
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        FieldWriter::new()
            .put("connection", &self.connection)
            .put("queue", &self.queue)
            .put("cpu_percent_per_job", self.cpu_percent_per_job)
            .put("memory_mb_per_job", self.memory_mb_per_job)
            .put("avg_duration_ms", self.avg_duration_ms)
            .put("sample_count", self.sample_count)
            .put("confidence_score", self.confidence_score)
            .put_timestamp("calculated_at", self.calculated_at)
            .put("significant_deviation", u8::from(self.significant_deviation))
            .build()
    }

    pub fn from_fields(
        key: &str,
        queue: &QueueIdentity,
        fields: &HashMap<String, String>,
    ) -> Option<Self> {
        let reader = FieldReader::new(key, fields);
        if reader.is_empty() {
            return None;
        }
        Some(Self {
            connection: reader.string_or("connection", &queue.connection),
            queue: reader.string_or("queue", &queue.queue),
            cpu_percent_per_job: reader.f64("cpu_percent_per_job"),
            memory_mb_per_job: reader.f64("memory_mb_per_job"),
            avg_duration_ms: reader.f64("avg_duration_ms"),
            sample_count: reader.u64("sample_count"),
            confidence_score: reader.f64("confidence_score").clamp(0.0, 1.0),
            calculated_at: reader
                .timestamp("calculated_at")
                .unwrap_or(DateTime::UNIX_EPOCH),
            significant_deviation: reader.bool("significant_deviation"),
        })
    }
}

/// `min(1, samples / target)`; a zero target means full confidence
pub fn confidence_for(sample_count: u64, target_sample_size: u64) -> f64 {
    if target_sample_size == 0 {
        return 1.0;
    }
    (sample_count as f64 / target_sample_size as f64).min(1.0)
}
