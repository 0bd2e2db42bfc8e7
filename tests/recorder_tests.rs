//! Hot-path recording through the public engine surface

mod common;

use chrono::{Duration, Utc};
use common::*;
use queue_metrics::config::QueueMetricsConfig;
use queue_metrics::events::MetricsEvent;
use queue_metrics::models::{QueueIdentity, WorkerState};
use queue_metrics::recorders::{
    JobExceptionOccurred, JobLifecycleObserver, JobRetryRequested, JobTimedOut, LifecycleDispatcher,
    WorkerHeartbeatReported, WorkerStateChanged,
};

#[tokio::test]
async fn test_disabled_engine_records_nothing() {
    let config = QueueMetricsConfig {
        enabled: false,
        ..QueueMetricsConfig::default()
    };
    let engine = memory_engine_with(config);
    let job = job("default", "SendInvoice");

    engine
        .recorder()
        .record_completion(&CompletionBuilder::new(&job).build())
        .await;
    let heartbeat = engine
        .recorder()
        .record_worker_heartbeat(&heartbeat(&job.queue_identity(), WorkerState::Busy, Utc::now()))
        .await;

    assert!(heartbeat.is_none());
    assert!(engine.query().get_job_metrics(&job).await.unwrap().is_none());
    assert!(engine.query().get_all_queues().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_completion_without_duration_uses_start_time() {
    let engine = memory_engine();
    let job = job("default", "SendInvoice");
    let started_at = now_seconds() - Duration::seconds(5);

    engine.recorder().record_start(&started(&job, "abc", started_at)).await;
    engine
        .recorder()
        .record_completion(
            &CompletionBuilder::new(&job)
                .id("abc")
                .without_duration()
                .at(started_at + Duration::milliseconds(250))
                .build(),
        )
        .await;

    let metrics = engine.query().get_job_metrics(&job).await.unwrap().unwrap();
    assert_eq!(metrics.execution.total_queued, 1);
    assert_eq!(metrics.execution.total_processed, 1);
    assert_eq!(metrics.duration.avg, 250.0);
}

#[tokio::test]
async fn test_completion_without_tracking_records_zero_duration() {
    let engine = memory_engine();
    let job = job("default", "SendInvoice");

    engine
        .recorder()
        .record_completion(&CompletionBuilder::new(&job).id("never-started").without_duration().build())
        .await;

    let metrics = engine.query().get_job_metrics(&job).await.unwrap().unwrap();
    assert_eq!(metrics.execution.total_processed, 1);
    assert_eq!(metrics.duration.avg, 0.0);
}

#[tokio::test]
async fn test_negative_resource_readings_are_clamped() {
    let engine = memory_engine();
    let job = job("default", "SendInvoice");

    engine
        .recorder()
        .record_completion(&CompletionBuilder::new(&job).duration(-10.0).memory(-1.0).cpu(f64::NAN).build())
        .await;

    let metrics = engine.query().get_job_metrics(&job).await.unwrap().unwrap();
    assert_eq!(metrics.duration.avg, 0.0);
    assert_eq!(metrics.memory.avg, 0.0);
    assert_eq!(metrics.cpu.avg, 0.0);
}

#[tokio::test]
async fn test_failure_message_is_truncated() {
    let engine = memory_engine();
    let job = job("default", "SendInvoice");
    let message = "x".repeat(1500);

    engine.recorder().record_failure(&failed(&job, &message, Utc::now())).await;

    let metrics = engine.query().get_job_metrics(&job).await.unwrap().unwrap();
    assert_eq!(metrics.failures.count, 1);
    assert_eq!(metrics.failures.last_exception.map(|e| e.chars().count()), Some(1000));
    assert!(metrics.failures.last_failed_at.is_some());
}

#[tokio::test]
async fn test_auxiliary_counters_leave_totals_alone() {
    let engine = memory_engine();
    let job = job("default", "SendInvoice");
    let now = Utc::now();
    let recorder = engine.recorder();

    recorder
        .record_timeout(&JobTimedOut {
            job_id: "1".to_string(),
            job: job.clone(),
            at: now,
        })
        .await;
    for class in ["RuntimeException", "RuntimeException", "PDOException"] {
        recorder
            .record_exception(&JobExceptionOccurred {
                job_id: "1".to_string(),
                job: job.clone(),
                exception_class: class.to_string(),
                message: "boom".to_string(),
                at: now,
            })
            .await;
    }
    recorder
        .record_retry_requested(&JobRetryRequested {
            job_id: "1".to_string(),
            job: job.clone(),
            attempt: 3,
            at: now,
        })
        .await;

    let metrics = engine.query().get_job_metrics(&job).await.unwrap().unwrap();
    assert_eq!(metrics.execution.total_processed, 0);
    assert_eq!(metrics.failures.count, 0);
    assert_eq!(metrics.auxiliary.timeouts, 1);
    assert_eq!(metrics.auxiliary.exceptions, 3);
    assert_eq!(metrics.auxiliary.retries, 1);
    assert_eq!(metrics.auxiliary.last_retry_attempt, Some(3));
    assert_eq!(metrics.auxiliary.exceptions_by_class.get("RuntimeException"), Some(&2));
    assert_eq!(metrics.auxiliary.exceptions_by_class.get("PDOException"), Some(&1));
}

#[tokio::test]
async fn test_heartbeats_account_time_per_state() {
    let engine = memory_engine();
    let queue = QueueIdentity::new("redis", "default");
    let t0 = now_seconds() - Duration::seconds(30);
    let recorder = engine.recorder();

    recorder.record_worker_heartbeat(&heartbeat(&queue, WorkerState::Idle, t0)).await;
    recorder
        .record_worker_heartbeat(&heartbeat(&queue, WorkerState::Busy, t0 + Duration::seconds(10)))
        .await;
    let last = recorder
        .record_worker_heartbeat(&heartbeat(&queue, WorkerState::Idle, t0 + Duration::seconds(25)))
        .await
        .unwrap();

    assert_eq!(last.worker_id, "worker_test-host_4242");
    assert_eq!(last.idle_time_seconds, 10.0);
    assert_eq!(last.busy_time_seconds, 15.0);
    assert_eq!(last.jobs_processed, 1);

    let stored = engine.query().get_worker(&last.worker_id).await.unwrap().unwrap();
    assert_eq!(stored, last);
}

#[tokio::test]
async fn test_repeated_state_keeps_counters() {
    let engine = memory_engine();
    let queue = QueueIdentity::new("redis", "default");
    let t0 = now_seconds() - Duration::seconds(20);
    let recorder = engine.recorder();

    recorder.record_worker_heartbeat(&heartbeat(&queue, WorkerState::Busy, t0)).await;
    let last = recorder
        .record_worker_heartbeat(&heartbeat(&queue, WorkerState::Busy, t0 + Duration::seconds(10)))
        .await
        .unwrap();

    assert_eq!(last.busy_time_seconds, 0.0);
    assert_eq!(last.jobs_processed, 0);
    assert_eq!(last.last_heartbeat, t0 + Duration::seconds(10));
}

#[tokio::test]
async fn test_state_transition_creates_and_updates_worker() {
    let engine = memory_engine();
    let t0 = now_seconds() - Duration::seconds(8);
    let recorder = engine.recorder();

    let first = recorder.transition_worker_state(&state_change(WorkerState::Busy, t0)).await.unwrap();
    assert_eq!(first.state, WorkerState::Busy);

    let stopped = recorder
        .transition_worker_state(&state_change(WorkerState::Stopped, t0 + Duration::seconds(8)))
        .await
        .unwrap();
    assert_eq!(stopped.state, WorkerState::Stopped);
    assert_eq!(stopped.busy_time_seconds, 8.0);
    assert_eq!(stopped.jobs_processed, 1);
}

#[tokio::test]
async fn test_relayed_heartbeat_uses_explicit_worker_id() {
    let engine = memory_engine();
    let queue = QueueIdentity::new("redis", "emails");
    let relayed = WorkerHeartbeatReported {
        worker_id: Some("worker_box-7_311".to_string()),
        ..heartbeat(&queue, WorkerState::Busy, now_seconds())
    };

    let stored = engine.recorder().record_worker_heartbeat(&relayed).await.unwrap();
    assert_eq!(stored.worker_id, "worker_box-7_311");
    assert_eq!(stored.queue, "emails");
    assert!(stored.hostname.is_empty());

    let query = engine.query();
    assert!(query.get_worker("worker_box-7_311").await.unwrap().is_some());
    assert!(query.get_worker("worker_test-host_4242").await.unwrap().is_none());

    // naming our own id behaves like an implicit report
    let own = WorkerHeartbeatReported {
        worker_id: Some("worker_test-host_4242".to_string()),
        ..heartbeat(&queue, WorkerState::Idle, now_seconds())
    };
    let stored = engine.recorder().record_worker_heartbeat(&own).await.unwrap();
    assert_eq!(stored.hostname, "test-host");
    assert_eq!(stored.pid, 4242);
}

#[tokio::test]
async fn test_transition_of_unseen_worker_does_not_invent_a_queue() {
    let engine = memory_engine();
    let ghost = WorkerStateChanged {
        worker_id: Some("worker_ghost_1".to_string()),
        ..state_change(WorkerState::Stopped, now_seconds())
    };

    let stored = engine.recorder().transition_worker_state(&ghost).await.unwrap();
    assert!(stored.queue.is_empty());
    assert!(stored.connection.is_empty());

    let overview = engine.query().get_overview().await.unwrap();
    assert_eq!(overview.workers.total_workers, 0);
    assert!(overview.workers.by_queue.is_empty());

    let placed = WorkerStateChanged {
        worker_id: Some("worker_ghost_2".to_string()),
        queue: Some(QueueIdentity::new("redis", "reports")),
        ..state_change(WorkerState::Paused, now_seconds())
    };
    let stored = engine.recorder().transition_worker_state(&placed).await.unwrap();
    assert_eq!(stored.queue, "reports");
}

#[tokio::test]
async fn test_depth_over_threshold_publishes_event() {
    let engine = memory_engine();
    let mut events = engine.subscribe();
    let queue = QueueIdentity::new("redis", "default");

    engine.recorder().record_queue_depth(&queue, 100, Utc::now()).await;
    assert!(events.try_recv().is_err());

    engine.recorder().record_queue_depth(&queue, 150, Utc::now()).await;
    let published = events.try_recv().unwrap();
    match published.event {
        MetricsEvent::QueueDepthThresholdExceeded {
            depth,
            threshold,
            percentage_over,
        } => {
            assert_eq!(depth.pending_jobs, 150);
            assert_eq!(threshold, 100);
            assert_eq!(percentage_over, 50.0);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let trends = engine
        .query()
        .get_queue_trends(&queue, Utc::now() - Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(trends.depth_history.len(), 2);
}

#[tokio::test]
async fn test_dispatcher_forwards_to_engine_observer() {
    let engine = memory_engine();
    let dispatcher = LifecycleDispatcher::new().with_observer(engine.observer());
    let job = job("emails", "SendWelcome");

    dispatcher.on_job_start(&started(&job, "d-1", Utc::now())).await;
    dispatcher
        .on_job_complete(&CompletionBuilder::new(&job).id("d-1").duration(42.0).build())
        .await;

    let metrics = engine.query().get_job_metrics(&job).await.unwrap().unwrap();
    assert_eq!(metrics.execution.total_processed, 1);
    assert_eq!(metrics.duration.avg, 42.0);
}
