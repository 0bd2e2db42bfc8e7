//! Identifying tuples for queues and job classes
//!
//! Both are stored in the discovery sets as compact JSON arrays, so connection,
//! queue and class names may contain any character including `:`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(connection, queue)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueIdentity {
    pub connection: String,
    pub queue: String,
}

impl QueueIdentity {
    pub fn new(connection: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            queue: queue.into(),
        }
    }

    /// Discovery-set member: `["connection","queue"]`
    pub fn to_member(&self) -> String {
        serde_json::json!([self.connection, self.queue]).to_string()
    }

    pub fn from_member(member: &str) -> Option<Self> {
        let (connection, queue): (String, String) = serde_json::from_str(member).ok()?;
        Some(Self { connection, queue })
    }
}

impl fmt::Display for QueueIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection, self.queue)
    }
}

/// A `(connection, queue, job_class)` triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobIdentity {
    pub connection: String,
    pub queue: String,
    pub job_class: String,
}

impl JobIdentity {
    pub fn new(
        connection: impl Into<String>,
        queue: impl Into<String>,
        job_class: impl Into<String>,
    ) -> Self {
        Self {
            connection: connection.into(),
            queue: queue.into(),
            job_class: job_class.into(),
        }
    }

    pub fn queue_identity(&self) -> QueueIdentity {
        QueueIdentity::new(&self.connection, &self.queue)
    }

    pub fn belongs_to(&self, queue: &QueueIdentity) -> bool {
        self.connection == queue.connection && self.queue == queue.queue
    }

    /// Discovery-set member: `["connection","queue","job_class"]`
    pub fn to_member(&self) -> String {
        serde_json::json!([self.connection, self.queue, self.job_class]).to_string()
    }

    pub fn from_member(member: &str) -> Option<Self> {
        let (connection, queue, job_class): (String, String, String) =
            serde_json::from_str(member).ok()?;
        Some(Self {
            connection,
            queue,
            job_class,
        })
    }
}

impl fmt::Display for JobIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.connection, self.queue, self.job_class)
    }
}
