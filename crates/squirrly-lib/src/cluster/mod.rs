//! Cluster queries and pod log access
//!
//! Discovery only needs three questions answered by the cluster: does the
//! deployment exist, which pods carry a label selector, and does a service
//! exist. The result sink additionally follows or collects pod logs.

mod kubernetes;

pub use kubernetes::KubeCluster;

use crate::error::Result;
use crate::models::Deployment;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Read-only view of the cluster used for target discovery
#[async_trait]
pub trait ClusterQuery: Send + Sync {
    async fn deployment_exists(&self, deployment: &Deployment) -> Result<bool>;

    /// Pod names matching `selector`, in listing order
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<String>>;

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Terminal phase of a pod whose log is being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodOutcome {
    Succeeded,
    Failed,
}

impl PodOutcome {
    pub fn from_phase(phase: &str) -> Option<Self> {
        match phase {
            "Succeeded" => Some(PodOutcome::Succeeded),
            "Failed" => Some(PodOutcome::Failed),
            _ => None,
        }
    }
}

/// Access to the log of a pod running the orchestrator
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Send log lines as they are produced until the container exits
    async fn follow_log(
        &self,
        namespace: &str,
        pod: &str,
        lines: mpsc::Sender<String>,
    ) -> Result<()>;

    /// Block until the pod reaches `Succeeded` or `Failed`
    async fn wait_for_completion(&self, namespace: &str, pod: &str) -> Result<PodOutcome>;

    /// The complete log of the pod
    async fn collect_log(&self, namespace: &str, pod: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_outcome_from_phase() {
        assert_eq!(
            PodOutcome::from_phase("Succeeded"),
            Some(PodOutcome::Succeeded)
        );
        assert_eq!(PodOutcome::from_phase("Failed"), Some(PodOutcome::Failed));
        assert_eq!(PodOutcome::from_phase("Running"), None);
        assert_eq!(PodOutcome::from_phase("Pending"), None);
    }
}
