//! Orchestrator operations kbench depends on

use async_trait::async_trait;
use kbench_types::ResourceUsage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::DeployResult;

/// Object kinds kbench creates and deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Deployment,
    Service,
    Autoscaler,
    Pod,
}

impl ResourceKind {
    /// Name the orchestrator CLI uses for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
            ResourceKind::Service => "service",
            ResourceKind::Autoscaler => "hpa",
            ResourceKind::Pod => "pod",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    pub name: String,
    pub phase: String,
    /// A container of this pod has terminated, now or in its last state
    pub crashed: bool,
    pub restarts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub replicas: u32,
    pub ready_replicas: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub ready: bool,
    pub control_plane: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodUsage {
    pub name: String,
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
}

impl From<&PodUsage> for ResourceUsage {
    fn from(usage: &PodUsage) -> Self {
        ResourceUsage {
            cpu_millicores: usage.cpu_millicores,
            memory_bytes: usage.memory_bytes,
        }
    }
}

/// Sum per-pod usage into one figure for the deployment.
pub fn total_usage(pods: &[PodUsage]) -> ResourceUsage {
    pods.iter().map(ResourceUsage::from).sum()
}

/// Container orchestrator
///
/// Deletes are tolerant of objects that are already gone.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Create or update the objects in a manifest file
    async fn apply(&self, path: &Path) -> DeployResult<()>;

    async fn delete(&self, kind: ResourceKind, name: &str) -> DeployResult<()>;

    async fn delete_all(&self, kind: ResourceKind) -> DeployResult<()>;

    /// Delete every pod immediately, skipping graceful termination
    async fn force_delete_all_pods(&self) -> DeployResult<()>;

    /// Set the replica count; does not wait for convergence
    async fn scale(&self, deployment: &str, replicas: u32) -> DeployResult<()>;

    /// Whether the latest rollout of `deployment` has completed
    async fn rollout_ready(&self, deployment: &str) -> DeployResult<bool>;

    async fn deployment_status(&self, deployment: &str) -> DeployResult<DeploymentStatus>;

    /// Pods labelled `app=<app>`
    async fn list_pods(&self, app: &str) -> DeployResult<Vec<PodStatus>>;

    async fn delete_pod(&self, name: &str) -> DeployResult<()>;

    /// Cluster IP of a service
    async fn service_ip(&self, name: &str) -> DeployResult<String>;

    /// Current usage of pods labelled `app=<app>`
    async fn pod_usage(&self, app: &str) -> DeployResult<Vec<PodUsage>>;

    async fn nodes(&self) -> DeployResult<Vec<NodeStatus>>;
}
