//! Recalculation cadence by confidence tier

use crate::config::BaselineConfig;
use crate::constants::baseline::{HIGH_CONFIDENCE_BELOW, LOW_CONFIDENCE_BELOW, MEDIUM_CONFIDENCE_BELOW};
use crate::models::BaselineData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    NoBaseline,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceTier {
    pub fn of(baseline: Option<&BaselineData>) -> Self {
        match baseline.map(|b| b.confidence_score) {
            None => Self::NoBaseline,
            Some(c) if c < LOW_CONFIDENCE_BELOW => Self::Low,
            Some(c) if c < MEDIUM_CONFIDENCE_BELOW => Self::Medium,
            Some(c) if c < HIGH_CONFIDENCE_BELOW => Self::High,
            Some(_) => Self::VeryHigh,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoBaseline => "no_baseline",
            Self::Low => "low_confidence",
            Self::Medium => "medium_confidence",
            Self::High => "high_confidence",
            Self::VeryHigh => "very_high_confidence",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RecalculationSchedule {
    config: BaselineConfig,
}

impl RecalculationSchedule {
    pub fn new(config: BaselineConfig) -> Self {
        Self { config }
    }

    /// How long a baseline stays current. A baseline flagged with a
    /// significant deviation uses the deviation trigger interval instead of
    /// its tier's.
    pub fn recalculation_interval(&self, baseline: Option<&BaselineData>) -> Duration {
        let deviation = &self.config.deviation;
        if deviation.enabled && baseline.is_some_and(|b| b.significant_deviation) {
            return minutes(deviation.trigger_interval);
        }

        let intervals = &self.config.intervals;
        minutes(match ConfidenceTier::of(baseline) {
            ConfidenceTier::NoBaseline => intervals.no_baseline,
            ConfidenceTier::Low => intervals.low_confidence,
            ConfidenceTier::Medium => intervals.medium_confidence,
            ConfidenceTier::High => intervals.high_confidence,
            ConfidenceTier::VeryHigh => intervals.very_high_confidence,
        })
    }

    /// A missing baseline is always due; otherwise due once its interval has
    /// fully elapsed
    pub fn is_due(&self, baseline: Option<&BaselineData>, now: DateTime<Utc>) -> bool {
        let Some(existing) = baseline else {
            return true;
        };
        let elapsed = (now - existing.calculated_at).num_seconds();
        elapsed >= self.recalculation_interval(baseline).as_secs() as i64
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(confidence: f64, minutes_ago: i64, now: DateTime<Utc>) -> BaselineData {
        BaselineData {
            connection: "redis".to_string(),
            queue: "default".to_string(),
            cpu_percent_per_job: 5.0,
            memory_mb_per_job: 20.0,
            avg_duration_ms: 100.0,
            sample_count: 10,
            confidence_score: confidence,
            calculated_at: now - chrono::Duration::minutes(minutes_ago),
            significant_deviation: false,
        }
    }

    #[test]
    fn test_tiers() {
        let now = Utc::now();
        assert_eq!(ConfidenceTier::of(None), ConfidenceTier::NoBaseline);
        assert_eq!(ConfidenceTier::of(Some(&baseline(0.2, 0, now))), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::of(Some(&baseline(0.5, 0, now))), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::of(Some(&baseline(0.7, 0, now))), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::of(Some(&baseline(0.9, 0, now))), ConfidenceTier::VeryHigh);
    }

    #[test]
    fn test_intervals_follow_config() {
        let schedule = RecalculationSchedule::new(BaselineConfig::default());
        let now = Utc::now();
        assert_eq!(schedule.recalculation_interval(None), Duration::from_secs(60));
        assert_eq!(
            schedule.recalculation_interval(Some(&baseline(0.95, 0, now))),
            Duration::from_secs(3600)
        );

        let mut deviating = baseline(0.95, 0, now);
        deviating.significant_deviation = true;
        assert_eq!(schedule.recalculation_interval(Some(&deviating)), Duration::from_secs(300));
    }

    #[test]
    fn test_is_due() {
        let schedule = RecalculationSchedule::new(BaselineConfig::default());
        let now = Utc::now();
        assert!(schedule.is_due(None, now));
        // low confidence recalculates every 5 minutes
        assert!(!schedule.is_due(Some(&baseline(0.1, 4, now)), now));
        assert!(schedule.is_due(Some(&baseline(0.1, 5, now)), now));
        assert!(!schedule.is_due(Some(&baseline(0.95, 59, now)), now));
    }
}
