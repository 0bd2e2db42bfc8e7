//! Sample statistics
//!
//! Percentiles use the rank method over the score-ascending ordering:
//! `index = ceil(p * n) - 1`, clamped into the sample range.

use crate::constants::{P50, P95, P99};

/// Value at percentile `p` (0.0..=1.0) of an ascending-sorted slice
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// `failed / (processed + failed) * 100`, zero when nothing finished
pub fn failure_rate(processed: u64, failed: u64) -> f64 {
    let finished = processed + failed;
    if finished == 0 {
        0.0
    } else {
        failed as f64 / finished as f64 * 100.0
    }
}

/// Jobs per minute for `count` completions over `window_seconds`
pub fn per_minute(count: u64, window_seconds: i64) -> f64 {
    if window_seconds <= 0 {
        0.0
    } else {
        count as f64 / window_seconds as f64 * 60.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Summary {
    /// Summarize unsorted values; non-finite values are ignored
    pub fn of(values: impl IntoIterator<Item = f64>) -> Self {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_by(f64::total_cmp);

        Self {
            count: sorted.len(),
            avg: mean(&sorted),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p50: percentile(&sorted, P50),
            p95: percentile(&sorted, P95),
            p99: percentile(&sorted, P99),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_rank_method() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&values, 0.95), 95.0);
        assert_eq!(percentile(&values, 0.99), 99.0);
        assert_eq!(percentile(&values, 0.5), 50.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 1.0), 100.0);

        assert_eq!(percentile(&[7.0], 0.99), 7.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
        // ceil(0.95 * 3) - 1 = 2
        assert_eq!(percentile(&[1.0, 2.0, 3.0], 0.95), 3.0);
    }

    #[test]
    fn test_failure_rate() {
        assert_eq!(failure_rate(7, 3), 30.0);
        assert_eq!(failure_rate(0, 0), 0.0);
        assert_eq!(failure_rate(0, 4), 100.0);
    }

    #[test]
    fn test_summary() {
        let summary = Summary::of([300.0, 100.0, 200.0, f64::NAN]);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.avg, 200.0);
        assert_eq!(summary.min, 100.0);
        assert_eq!(summary.max, 300.0);
        assert_eq!(summary.p50, 200.0);
        assert_eq!(summary.p99, 300.0);

        assert_eq!(Summary::of(Vec::new()), Summary::default());
    }

    #[test]
    fn test_per_minute() {
        assert_eq!(per_minute(30, 300), 6.0);
        assert_eq!(per_minute(5, 60), 5.0);
        assert_eq!(per_minute(5, 0), 0.0);
    }
}
