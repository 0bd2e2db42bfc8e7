//! Registry of observed queues and job classes

use crate::error::QueueMetricsResult;
use crate::models::{JobIdentity, QueueIdentity};
use crate::storage::{KeyBuilder, Pipeline, StorageProvider};
use tracing::debug;

/// Idempotent discovery sets; entries only leave through explicit cleanup
#[derive(Debug, Clone)]
pub struct DiscoveryRepository {
    storage: StorageProvider,
    keys: KeyBuilder,
}

impl DiscoveryRepository {
    pub fn new(storage: StorageProvider, keys: KeyBuilder) -> Self {
        Self { storage, keys }
    }

    /// Add both discovery entries for `job` to a batch
    pub fn append_job(&self, pipeline: Pipeline, job: &JobIdentity) -> Pipeline {
        pipeline
            .add_to_set(self.keys.discovered_queues(), job.queue_identity().to_member())
            .add_to_set(self.keys.discovered_jobs(), job.to_member())
    }

    pub async fn mark_queue_discovered(&self, queue: &QueueIdentity) -> QueueMetricsResult<()> {
        self.storage
            .add_to_set(&self.keys.discovered_queues(), &[queue.to_member()])
            .await?;
        Ok(())
    }

    /// Also marks the job's queue
    pub async fn mark_job_discovered(&self, job: &JobIdentity) -> QueueMetricsResult<()> {
        self.storage
            .pipeline(self.append_job(Pipeline::new(), job))
            .await?;
        Ok(())
    }

    /// Known queues, sorted
    pub async fn list_queues(&self) -> QueueMetricsResult<Vec<QueueIdentity>> {
        let members = self.storage.set_members(&self.keys.discovered_queues()).await?;
        let mut queues: Vec<QueueIdentity> = members
            .iter()
            .filter_map(|member| {
                let parsed = QueueIdentity::from_member(member);
                if parsed.is_none() {
                    debug!(member = %member, "Skipping unparseable queue discovery entry");
                }
                parsed
            })
            .collect();
        queues.sort();
        Ok(queues)
    }

    /// Known job classes, sorted
    pub async fn list_jobs(&self) -> QueueMetricsResult<Vec<JobIdentity>> {
        let members = self.storage.set_members(&self.keys.discovered_jobs()).await?;
        let mut jobs: Vec<JobIdentity> = members
            .iter()
            .filter_map(|member| JobIdentity::from_member(member))
            .collect();
        jobs.sort();
        Ok(jobs)
    }

    pub async fn list_jobs_for_queue(&self, queue: &QueueIdentity) -> QueueMetricsResult<Vec<JobIdentity>> {
        Ok(self
            .list_jobs()
            .await?
            .into_iter()
            .filter(|job| job.belongs_to(queue))
            .collect())
    }

    pub async fn is_queue_known(&self, queue: &QueueIdentity) -> QueueMetricsResult<bool> {
        Ok(self.list_queues().await?.contains(queue))
    }

    pub async fn is_job_known(&self, job: &JobIdentity) -> QueueMetricsResult<bool> {
        Ok(self.list_jobs().await?.contains(job))
    }

    pub async fn forget_job(&self, job: &JobIdentity) -> QueueMetricsResult<()> {
        self.storage
            .remove_from_set(&self.keys.discovered_jobs(), &[job.to_member()])
            .await?;
        Ok(())
    }

    /// Drop a queue entry once none of its job classes remain
    pub async fn forget_queue_if_unused(&self, queue: &QueueIdentity) -> QueueMetricsResult<bool> {
        if !self.list_jobs_for_queue(queue).await?.is_empty() {
            return Ok(false);
        }
        let removed = self
            .storage
            .remove_from_set(&self.keys.discovered_queues(), &[queue.to_member()])
            .await?;
        Ok(removed > 0)
    }
}
