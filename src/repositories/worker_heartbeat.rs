//! Worker heartbeat records
//!
//! A worker only ever writes its own record, so state accounting reads the
//! previous record and writes the next one. Cross-worker data (the worker
//! index) goes through set operations only.

use super::job_metrics::is_older_than;
use crate::config::StorageConfig;
use crate::error::QueueMetricsResult;
use crate::models::{QueueIdentity, WorkerHeartbeat, WorkerIdentity, WorkerState};
use crate::storage::{KeyBuilder, Pipeline, StorageProvider};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Host and pid of a worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerProcess {
    pub hostname: String,
    pub pid: u32,
}

impl From<&WorkerIdentity> for WorkerProcess {
    fn from(identity: &WorkerIdentity) -> Self {
        Self {
            hostname: identity.hostname.clone(),
            pid: identity.pid,
        }
    }
}

/// One heartbeat as reported by a worker loop
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatUpdate {
    pub worker_id: String,
    /// Reporting host and pid; `None` when relayed for another worker
    pub process: Option<WorkerProcess>,
    pub connection: String,
    pub queue: String,
    pub state: WorkerState,
    pub current_job_id: Option<String>,
    pub current_job_class: Option<String>,
    pub at: DateTime<Utc>,
}

/// An explicit state change outside the heartbeat cadence
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub worker_id: String,
    /// Reporting host and pid; `None` when relayed for another worker
    pub process: Option<WorkerProcess>,
    /// Used only when the worker has no record yet
    pub queue: Option<QueueIdentity>,
    pub state: WorkerState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WorkerHeartbeatRepository {
    storage: StorageProvider,
    keys: KeyBuilder,
    ttl: Duration,
}

impl WorkerHeartbeatRepository {
    pub fn new(storage: StorageProvider, keys: KeyBuilder, config: &StorageConfig) -> Self {
        Self {
            storage,
            keys,
            ttl: config.ttl.aggregated_ttl(),
        }
    }

    pub async fn get_worker(&self, worker_id: &str) -> QueueMetricsResult<Option<WorkerHeartbeat>> {
        let key = self.keys.worker(worker_id);
        let fields = self.storage.get_hash(&key).await?;
        Ok(WorkerHeartbeat::from_fields(&key, worker_id, &fields))
    }

    /// Store a heartbeat, accounting time to the previous state on a change
    pub async fn record_heartbeat(&self, update: &HeartbeatUpdate) -> QueueMetricsResult<WorkerHeartbeat> {
        let previous = self.get_worker(&update.worker_id).await?;

        let mut next = match previous {
            Some(previous) => {
                let mut next = advance_state(previous, update.state, update.at);
                next.connection = update.connection.clone();
                next.queue = update.queue.clone();
                next
            }
            None => new_record(&update.worker_id, &update.connection, &update.queue, update.state, update.at),
        };

        next.current_job_id = update.current_job_id.clone();
        next.current_job_class = update.current_job_class.clone();
        apply_process(&mut next, update.process.as_ref());

        self.store(&next).await?;
        Ok(next)
    }

    /// Explicit transition outside the heartbeat cadence, e.g. on shutdown.
    ///
    /// A worker seen for the first time takes the transition's queue, or no
    /// queue at all when none is given.
    pub async fn transition_state(&self, transition: &StateTransition) -> QueueMetricsResult<WorkerHeartbeat> {
        let mut next = match self.get_worker(&transition.worker_id).await? {
            Some(previous) => advance_state(previous, transition.state, transition.at),
            None => {
                let (connection, queue) = transition
                    .queue
                    .as_ref()
                    .map(|q| (q.connection.as_str(), q.queue.as_str()))
                    .unwrap_or_default();
                new_record(&transition.worker_id, connection, queue, transition.state, transition.at)
            }
        };
        apply_process(&mut next, transition.process.as_ref());

        self.store(&next).await?;
        Ok(next)
    }

    async fn store(&self, heartbeat: &WorkerHeartbeat) -> QueueMetricsResult<()> {
        let pipeline = Pipeline::new()
            .set_hash(
                self.keys.worker(&heartbeat.worker_id),
                heartbeat.to_fields(),
                Some(self.ttl),
            )
            .add_to_set(self.keys.workers_index(), heartbeat.worker_id.clone());
        self.storage.pipeline(pipeline).await?;
        Ok(())
    }

    /// Every stored worker; index entries whose record expired are pruned
    pub async fn list_workers(&self) -> QueueMetricsResult<Vec<WorkerHeartbeat>> {
        let index = self.keys.workers_index();
        let ids = self.storage.set_members(&index).await?;
        let mut workers = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();

        for id in ids {
            match self.get_worker(&id).await? {
                Some(worker) => workers.push(worker),
                None => missing.push(id),
            }
        }

        if !missing.is_empty() {
            debug!(count = missing.len(), "Pruning expired workers from index");
            self.storage.remove_from_set(&index, &missing).await?;
        }

        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        Ok(workers)
    }

    pub async fn delete_worker(&self, worker_id: &str) -> QueueMetricsResult<bool> {
        let deleted = self.storage.delete(&[self.keys.worker(worker_id)]).await?;
        self.storage
            .remove_from_set(&self.keys.workers_index(), &[worker_id.to_string()])
            .await?;
        Ok(deleted > 0)
    }

    /// Delete workers whose last heartbeat is older than `older_than`
    pub async fn cleanup(&self, older_than: Duration, now: DateTime<Utc>) -> QueueMetricsResult<u64> {
        let mut deleted = 0;
        for worker in self.list_workers().await? {
            if is_older_than(worker.last_heartbeat, older_than, now)
                && self.delete_worker(&worker.worker_id).await?
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

fn apply_process(heartbeat: &mut WorkerHeartbeat, process: Option<&WorkerProcess>) {
    if let Some(process) = process {
        heartbeat.hostname = process.hostname.clone();
        heartbeat.pid = process.pid;
    }
}

fn new_record(
    worker_id: &str,
    connection: &str,
    queue: &str,
    state: WorkerState,
    at: DateTime<Utc>,
) -> WorkerHeartbeat {
    WorkerHeartbeat {
        worker_id: worker_id.to_string(),
        connection: connection.to_string(),
        queue: queue.to_string(),
        state,
        last_heartbeat: at,
        last_state_change: Some(at),
        current_job_id: None,
        current_job_class: None,
        idle_time_seconds: 0.0,
        busy_time_seconds: 0.0,
        jobs_processed: 0,
        pid: 0,
        hostname: String::new(),
    }
}

/// Apply a state report to the previous record.
///
/// On a change, the time since the last state change is credited to the
/// previous state, and leaving `busy` counts one processed job.
pub fn advance_state(previous: WorkerHeartbeat, state: WorkerState, at: DateTime<Utc>) -> WorkerHeartbeat {
    let mut next = previous;
    let at = at.max(next.last_heartbeat);

    if next.state != state {
        let since = next.last_state_change.unwrap_or(next.last_heartbeat);
        let elapsed = (at - since).num_milliseconds().max(0) as f64 / 1000.0;

        match next.state {
            WorkerState::Idle => next.idle_time_seconds += elapsed,
            WorkerState::Busy => {
                next.busy_time_seconds += elapsed;
                next.jobs_processed += 1;
            }
            _ => {}
        }

        if state != WorkerState::Busy {
            next.current_job_id = None;
            next.current_job_class = None;
        }

        next.state = state;
        next.last_state_change = Some(at);
    }

    next.last_heartbeat = at;
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> WorkerHeartbeatRepository {
        WorkerHeartbeatRepository::new(StorageProvider::memory(), KeyBuilder::new("qm"), &StorageConfig::default())
    }

    fn process() -> Option<WorkerProcess> {
        Some(WorkerProcess {
            hostname: "host".to_string(),
            pid: 42,
        })
    }

    fn transition(id: &str, queue: Option<QueueIdentity>, state: WorkerState, secs: i64) -> StateTransition {
        StateTransition {
            worker_id: id.to_string(),
            process: process(),
            queue,
            state,
            at: at(secs),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn update(id: &str, state: WorkerState, secs: i64) -> HeartbeatUpdate {
        HeartbeatUpdate {
            worker_id: id.to_string(),
            process: process(),
            connection: "redis".to_string(),
            queue: "default".to_string(),
            state,
            current_job_id: (state == WorkerState::Busy).then(|| "job-1".to_string()),
            current_job_class: (state == WorkerState::Busy).then(|| "SendEmail".to_string()),
            at: at(secs),
        }
    }

    #[tokio::test]
    async fn test_state_time_accounting() {
        let repo = repo();
        repo.record_heartbeat(&update("w1", WorkerState::Idle, 0)).await.unwrap();
        repo.record_heartbeat(&update("w1", WorkerState::Idle, 5)).await.unwrap();
        repo.record_heartbeat(&update("w1", WorkerState::Busy, 10)).await.unwrap();
        let worker = repo.record_heartbeat(&update("w1", WorkerState::Idle, 40)).await.unwrap();

        assert_eq!(worker.idle_time_seconds, 10.0);
        assert_eq!(worker.busy_time_seconds, 30.0);
        assert_eq!(worker.jobs_processed, 1);
        assert_eq!(worker.last_state_change, Some(at(40)));
        assert_eq!(worker.current_job_id, None);

        let stored = repo.get_worker("w1").await.unwrap().unwrap();
        assert_eq!(stored, worker);
    }

    #[tokio::test]
    async fn test_repeated_state_is_idempotent_for_accounting() {
        let repo = repo();
        repo.record_heartbeat(&update("w1", WorkerState::Busy, 0)).await.unwrap();
        let worker = repo.record_heartbeat(&update("w1", WorkerState::Busy, 30)).await.unwrap();

        assert_eq!(worker.busy_time_seconds, 0.0);
        assert_eq!(worker.last_state_change, Some(at(0)));
        assert_eq!(worker.last_heartbeat, at(30));
    }

    #[tokio::test]
    async fn test_transition_creates_missing_worker() {
        let repo = repo();
        let queue = QueueIdentity::new("sqs", "reports");
        let worker = repo
            .transition_state(&transition("w9", Some(queue), WorkerState::Stopped, 0))
            .await
            .unwrap();
        assert_eq!(worker.state, WorkerState::Stopped);
        assert_eq!(worker.pid, 42);
        assert_eq!((worker.connection.as_str(), worker.queue.as_str()), ("sqs", "reports"));
        assert_eq!(repo.list_workers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transition_without_queue_leaves_worker_unassigned() {
        let repo = repo();
        let worker = repo
            .transition_state(&transition("w9", None, WorkerState::Paused, 0))
            .await
            .unwrap();
        assert!(worker.connection.is_empty());
        assert!(worker.queue.is_empty());

        // an existing record keeps its queue
        repo.record_heartbeat(&update("w1", WorkerState::Idle, 0)).await.unwrap();
        let moved = repo
            .transition_state(&transition("w1", Some(QueueIdentity::new("sqs", "other")), WorkerState::Stopped, 5))
            .await
            .unwrap();
        assert_eq!(moved.queue, "default");
    }

    #[tokio::test]
    async fn test_relayed_heartbeat_keeps_known_process() {
        let repo = repo();
        repo.record_heartbeat(&update("w1", WorkerState::Idle, 0)).await.unwrap();
        let relayed = HeartbeatUpdate {
            process: None,
            ..update("w1", WorkerState::Busy, 5)
        };
        let worker = repo.record_heartbeat(&relayed).await.unwrap();
        assert_eq!(worker.hostname, "host");
        assert_eq!(worker.pid, 42);
        assert_eq!(worker.state, WorkerState::Busy);
    }

    #[tokio::test]
    async fn test_cleanup_removes_old_heartbeats() {
        let repo = repo();
        repo.record_heartbeat(&update("old", WorkerState::Idle, 0)).await.unwrap();
        repo.record_heartbeat(&update("new", WorkerState::Idle, 500)).await.unwrap();

        assert_eq!(repo.cleanup(Duration::from_secs(300), at(600)).await.unwrap(), 1);
        let remaining: Vec<String> = repo
            .list_workers()
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.worker_id)
            .collect();
        assert_eq!(remaining, vec!["new".to_string()]);
    }
}
