//! Proptest strategies for metric inputs

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use queue_metrics::models::{WorkerHeartbeat, WorkerState};

pub fn worker_state() -> impl Strategy<Value = WorkerState> {
    prop_oneof![
        Just(WorkerState::Idle),
        Just(WorkerState::Busy),
        Just(WorkerState::Paused),
        Just(WorkerState::Stopped),
        Just(WorkerState::Crashed),
    ]
}

/// A sequence of state reports, each some whole seconds after the last
pub fn state_reports() -> impl Strategy<Value = Vec<(WorkerState, i64)>> {
    prop::collection::vec((worker_state(), 0i64..600), 1..30)
}

pub fn finite_samples() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..100_000.0, 1..200)
}

pub fn fresh_worker(state: WorkerState, at: DateTime<Utc>) -> WorkerHeartbeat {
    WorkerHeartbeat {
        worker_id: "worker_prop_1".to_string(),
        connection: "redis".to_string(),
        queue: "default".to_string(),
        state,
        last_heartbeat: at,
        last_state_change: Some(at),
        current_job_id: None,
        current_job_class: None,
        idle_time_seconds: 0.0,
        busy_time_seconds: 0.0,
        jobs_processed: 0,
        pid: 1,
        hostname: "prop".to_string(),
    }
}

pub fn epoch_plus(seconds: i64) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + Duration::seconds(seconds)
}
