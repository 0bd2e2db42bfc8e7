//! Key naming scheme
//!
//! Every key is `{prefix}:{segment}:...`. Job class names may contain `:` (module
//! paths), so parsing always splits from a fixed number of leading segments.

/// Builds namespaced keys for one deployment prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Join segments under the prefix
    pub fn key(&self, segments: &[&str]) -> String {
        let mut key = self.prefix.clone();
        for segment in segments {
            key.push(':');
            key.push_str(segment);
        }
        key
    }

    /// Job aggregate hash
    pub fn job_metrics(&self, connection: &str, queue: &str, job_class: &str) -> String {
        self.key(&["jobs", connection, queue, job_class])
    }

    pub fn durations(&self, connection: &str, queue: &str, job_class: &str) -> String {
        self.key(&["durations", connection, queue, job_class])
    }

    pub fn memory(&self, connection: &str, queue: &str, job_class: &str) -> String {
        self.key(&["memory", connection, queue, job_class])
    }

    pub fn cpu(&self, connection: &str, queue: &str, job_class: &str) -> String {
        self.key(&["cpu", connection, queue, job_class])
    }

    /// Per-exception-class counters for one job class
    pub fn exceptions(&self, connection: &str, queue: &str, job_class: &str) -> String {
        self.key(&["exceptions", connection, queue, job_class])
    }

    /// Transient tracking record between start and completion
    pub fn job_tracking(&self, job_id: &str) -> String {
        self.key(&["job", job_id])
    }

    pub fn queue_snapshot(&self, connection: &str, queue: &str) -> String {
        self.key(&["queue_snapshot", connection, queue])
    }

    pub fn queue_snapshots(&self, connection: &str, queue: &str) -> String {
        self.key(&["queue_snapshots", connection, queue])
    }

    pub fn queue_depth_history(&self, connection: &str, queue: &str) -> String {
        self.key(&["queue_depth_history", connection, queue])
    }

    pub fn throughput_history(&self, connection: &str, queue: &str) -> String {
        self.key(&["throughput_history", connection, queue])
    }

    pub fn baseline(&self, connection: &str, queue: &str) -> String {
        self.key(&["baseline", connection, queue])
    }

    pub fn worker(&self, worker_id: &str) -> String {
        self.key(&["worker", worker_id])
    }

    /// Set of known worker ids
    pub fn workers_index(&self) -> String {
        self.key(&["workers"])
    }

    pub fn discovered_queues(&self) -> String {
        self.key(&["discovered", "queues"])
    }

    pub fn discovered_jobs(&self) -> String {
        self.key(&["discovered", "jobs"])
    }

    /// Glob pattern over every key of one kind, e.g. `prefix:jobs:*`
    pub fn pattern(&self, segment: &str) -> String {
        self.key(&[segment, "*"])
    }

    /// Split a scanned key back into `(connection, queue)`
    pub fn parse_queue_key(&self, segment: &str, key: &str) -> Option<(String, String)> {
        let rest = self.strip(segment, key)?;
        let (connection, queue) = rest.split_once(':')?;
        Some((connection.to_string(), queue.to_string()))
    }

    fn strip<'a>(&self, segment: &str, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix.as_str())?
            .strip_prefix(':')?
            .strip_prefix(segment)?
            .strip_prefix(':')
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_KEY_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = KeyBuilder::new("qm");
        assert_eq!(
            keys.job_metrics("redis", "default", "App::SendEmail"),
            "qm:jobs:redis:default:App::SendEmail"
        );
        assert_eq!(keys.queue_snapshot("redis", "emails"), "qm:queue_snapshot:redis:emails");
        assert_eq!(keys.worker("worker_host_12"), "qm:worker:worker_host_12");
        assert_eq!(keys.pattern("baseline"), "qm:baseline:*");
    }

    #[test]
    fn test_parse_queue_key() {
        let keys = KeyBuilder::new("qm");
        let key = keys.baseline("sqs", "reports");
        assert_eq!(
            keys.parse_queue_key("baseline", &key),
            Some(("sqs".to_string(), "reports".to_string()))
        );
        assert_eq!(keys.parse_queue_key("baseline", "other:baseline:a:b"), None);
    }
}
