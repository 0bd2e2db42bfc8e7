//! Worker identity derivation
//!
//! Injected into the recorder at construction so nothing reads process-wide
//! state at record time.

use crate::models::WorkerIdentity;
use std::fmt::Debug;

pub trait WorkerIdentityProvider: Send + Sync + Debug {
    fn identity(&self) -> WorkerIdentity;
}

/// Plain worker process: `worker_{host}_{pid}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProcessIdentity {
    hostname: String,
    pid: u32,
}

impl HostProcessIdentity {
    pub fn new(hostname: impl Into<String>, pid: u32) -> Self {
        Self {
            hostname: hostname.into(),
            pid,
        }
    }

    /// Current process on this host
    pub fn detect() -> Self {
        Self::new(detect_hostname(), std::process::id())
    }
}

impl WorkerIdentityProvider for HostProcessIdentity {
    fn identity(&self) -> WorkerIdentity {
        WorkerIdentity {
            worker_id: format!("worker_{}_{}", self.hostname, self.pid),
            hostname: self.hostname.clone(),
            pid: self.pid,
        }
    }
}

/// Worker spawned by a supervisor process:
/// `worker_supervisor_{name}_{host}_{pid}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorIdentity {
    pub supervisor_name: String,
    pub parent_id: Option<u32>,
    pub pool_name: Option<String>,
    hostname: String,
    pid: u32,
}

impl SupervisorIdentity {
    pub fn new(supervisor_name: impl Into<String>, hostname: impl Into<String>, pid: u32) -> Self {
        Self {
            supervisor_name: supervisor_name.into(),
            parent_id: None,
            pool_name: None,
            hostname: hostname.into(),
            pid,
        }
    }

    pub fn with_parent(mut self, parent_id: u32) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_pool(mut self, pool_name: impl Into<String>) -> Self {
        self.pool_name = Some(pool_name.into());
        self
    }

    pub fn detect(supervisor_name: impl Into<String>) -> Self {
        Self::new(supervisor_name, detect_hostname(), std::process::id())
    }
}

impl WorkerIdentityProvider for SupervisorIdentity {
    fn identity(&self) -> WorkerIdentity {
        WorkerIdentity {
            worker_id: format!(
                "worker_supervisor_{}_{}_{}",
                self.supervisor_name, self.hostname, self.pid
            ),
            hostname: self.hostname.clone(),
            pid: self.pid,
        }
    }
}

fn detect_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|name| name.trim().to_string())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_process_identity() {
        let identity = HostProcessIdentity::new("web-1", 4242).identity();
        assert_eq!(identity.worker_id, "worker_web-1_4242");
        assert_eq!(identity.pid, 4242);
    }

    #[test]
    fn test_supervisor_identity() {
        let supervisor = SupervisorIdentity::new("supervisor-1", "web-1", 99)
            .with_parent(12)
            .with_pool("emails");
        assert_eq!(supervisor.identity().worker_id, "worker_supervisor_supervisor-1_web-1_99");
        assert_eq!(supervisor.parent_id, Some(12));
    }

    #[test]
    fn test_detect_has_a_hostname() {
        let identity = HostProcessIdentity::detect().identity();
        assert!(identity.worker_id.starts_with("worker_"));
        assert_eq!(identity.pid, std::process::id());
    }
}
