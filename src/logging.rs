//! # Structured Logging
//!
//! Environment-aware `tracing` setup. Console output everywhere, plus JSON
//! lines in production for log shippers. Safe to call more than once and safe
//! to call when the host application already installed a subscriber.

use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGING_READY: OnceLock<()> = OnceLock::new();

/// Install the console (and, in production, JSON) subscriber once per process
pub fn init_structured_logging() {
    LOGGING_READY.get_or_init(|| {
        let environment = get_environment();
        let log_level = default_level_for(&environment);
        let production = environment == "production";

        let console = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(!production)
            .with_filter(filter(&log_level));

        let json = production.then(|| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(false)
                .with_filter(filter(&log_level))
        });

        let subscriber = tracing_subscriber::registry().with(console).with(json);

        if subscriber.try_init().is_err() {
            tracing::debug!("tracing subscriber already installed by host, reusing it");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_level = %log_level,
            "Queue metrics logging initialized"
        );
    });
}

/// `RUST_LOG` wins over the environment default
fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Current environment from `QUEUE_METRICS_ENV`, then `APP_ENV`
pub fn get_environment() -> String {
    std::env::var("QUEUE_METRICS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn default_level_for(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        "test" => "warn".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log the outcome of a scheduled batch run
pub fn log_batch_run(operation: &str, processed: usize, failed: usize, skipped: usize, elapsed_ms: u128) {
    tracing::info!(
        operation = %operation,
        processed = processed,
        failed = failed,
        skipped = skipped,
        elapsed_ms = elapsed_ms as u64,
        timestamp = %Utc::now().to_rfc3339(),
        "BATCH_RUN"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert_eq!(default_level_for("production"), "info");
        assert_eq!(default_level_for("test"), "warn");
        assert_eq!(default_level_for("staging"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        assert!(LOGGING_READY.get().is_some());
    }
}
