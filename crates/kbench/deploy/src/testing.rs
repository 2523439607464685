//! In-memory orchestrator for tests
//!
//! Models deployments as lists of pods. A deployment can be told to crash a
//! pod on each of its next `k` scale-ups, to report its rollout as pending
//! for a number of polls, or to keep deleted pods listed for a while.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{DeployError, DeployResult};
use crate::orchestrator::{
    DeploymentStatus, NodeStatus, Orchestrator, PodStatus, PodUsage, ResourceKind,
};

#[derive(Debug, Clone)]
struct SimPod {
    name: String,
    crashed: bool,
    /// List calls this pod stays visible for after deletion
    lingering: Option<u32>,
}

#[derive(Debug, Default)]
struct SimDeployment {
    desired: u32,
    pods: Vec<SimPod>,
    crash_cycles: u32,
    rollout_delay: u32,
    rollout_checks: u32,
}

#[derive(Debug, Default)]
struct SimState {
    deployments: BTreeMap<String, SimDeployment>,
    services: BTreeMap<String, String>,
    autoscalers: Vec<String>,
    pending_crash_cycles: BTreeMap<String, u32>,
    pending_rollout_delay: BTreeMap<String, u32>,
    applied: Vec<PathBuf>,
    deleted: Vec<(ResourceKind, String)>,
    pod_deletes: Vec<String>,
    scale_calls: Vec<(String, u32)>,
    fail_apply: Vec<(String, String)>,
    delete_lag: u32,
    nodes: Vec<NodeStatus>,
    force_deletes: u32,
    pod_counter: u64,
}

impl SimState {
    fn spawn_pods(&mut self, name: &str) {
        let counter = &mut self.pod_counter;
        let Some(dep) = self.deployments.get_mut(name) else {
            return;
        };
        dep.pods.retain(|p| p.lingering.is_some());
        let crash = dep.crash_cycles > 0;
        for i in 0..dep.desired {
            *counter += 1;
            dep.pods.push(SimPod {
                name: format!("{}-{:05}", name, counter),
                crashed: crash && i == 0,
                lingering: None,
            });
        }
    }
}

/// [`Orchestrator`] that keeps everything in memory.
#[derive(Debug)]
pub struct SimulatedOrchestrator {
    state: Mutex<SimState>,
}

impl Default for SimulatedOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedOrchestrator {
    pub const POD_CPU_MILLICORES: u64 = 100;
    pub const POD_MEMORY_BYTES: u64 = 64 << 20;

    /// A ready three-node cluster with no workloads.
    pub fn new() -> Self {
        let node = |name: &str, control_plane: bool| NodeStatus {
            name: name.to_string(),
            ready: true,
            control_plane,
        };
        Self {
            state: Mutex::new(SimState {
                nodes: vec![node("node0", true), node("node1", false), node("node2", false)],
                ..SimState::default()
            }),
        }
    }

    pub fn set_nodes(&self, nodes: Vec<NodeStatus>) {
        self.state.lock().nodes = nodes;
    }

    /// Create a healthy deployment directly.
    pub fn add_deployment(&self, name: &str, replicas: u32) {
        let mut state = self.state.lock();
        state.deployments.insert(
            name.to_string(),
            SimDeployment {
                desired: replicas,
                ..SimDeployment::default()
            },
        );
        state.spawn_pods(name);
    }

    /// Crash one pod on each of the next `cycles` pod generations of `name`.
    /// Applies to deployments created later too.
    pub fn crash_cycles(&self, name: &str, cycles: u32) {
        let mut state = self.state.lock();
        match state.deployments.get_mut(name) {
            Some(dep) => dep.crash_cycles = cycles,
            None => {
                state.pending_crash_cycles.insert(name.to_string(), cycles);
            }
        }
    }

    /// Report the rollout of `name` as pending for the next `polls` checks.
    pub fn delay_rollout(&self, name: &str, polls: u32) {
        let mut state = self.state.lock();
        match state.deployments.get_mut(name) {
            Some(dep) => dep.rollout_delay = polls,
            None => {
                state.pending_rollout_delay.insert(name.to_string(), polls);
            }
        }
    }

    /// Keep deleted pods listed for `polls` list calls.
    pub fn delete_lag(&self, polls: u32) {
        self.state.lock().delete_lag = polls;
    }

    /// Fail applies whose path contains `pattern`.
    pub fn fail_apply(&self, pattern: &str, stderr: &str) {
        self.state
            .lock()
            .fail_apply
            .push((pattern.to_string(), stderr.to_string()));
    }

    /// Scale immediately, bypassing crash injection bookkeeping.
    pub fn scale_now(&self, name: &str, replicas: u32) {
        let mut state = self.state.lock();
        if let Some(dep) = state.deployments.get_mut(name) {
            dep.desired = replicas;
        }
        state.spawn_pods(name);
    }

    pub fn has_deployment(&self, name: &str) -> bool {
        self.state.lock().deployments.contains_key(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.state.lock().services.contains_key(name)
    }

    pub fn deployment_names(&self) -> Vec<String> {
        self.state.lock().deployments.keys().cloned().collect()
    }

    pub fn applied(&self) -> Vec<PathBuf> {
        self.state.lock().applied.clone()
    }

    pub fn deleted(&self) -> Vec<(ResourceKind, String)> {
        self.state.lock().deleted.clone()
    }

    pub fn pod_deletes(&self) -> Vec<String> {
        self.state.lock().pod_deletes.clone()
    }

    pub fn scale_calls(&self) -> Vec<(String, u32)> {
        self.state.lock().scale_calls.clone()
    }

    pub fn force_deletes(&self) -> u32 {
        self.state.lock().force_deletes
    }

    pub fn rollout_checks(&self, name: &str) -> u32 {
        self.state
            .lock()
            .deployments
            .get(name)
            .map(|d| d.rollout_checks)
            .unwrap_or_default()
    }

    fn not_found(kind: &str, name: &str) -> DeployError {
        DeployError::Command {
            command: format!("get {} {}", kind, name),
            exit_code: Some(1),
            stderr: format!("Error from server (NotFound): {} \"{}\" not found", kind, name),
        }
    }
}

fn manifest_identity(path: &Path) -> Option<(String, String, u32)> {
    let text = std::fs::read_to_string(path).ok()?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text).ok()?;
    let kind = value.get("kind")?.as_str()?.to_string();
    let name = value.get("metadata")?.get("name")?.as_str()?.to_string();
    let replicas = value
        .get("spec")
        .and_then(|s| s.get("replicas"))
        .and_then(|r| r.as_u64())
        .unwrap_or(1) as u32;
    Some((kind, name, replicas))
}

#[async_trait]
impl Orchestrator for SimulatedOrchestrator {
    async fn apply(&self, path: &Path) -> DeployResult<()> {
        let identity = manifest_identity(path);
        let mut state = self.state.lock();

        let display = path.to_string_lossy().to_string();
        if let Some((_, stderr)) = state.fail_apply.iter().find(|(p, _)| display.contains(p.as_str())) {
            return Err(DeployError::Command {
                command: format!("apply -f {}", display),
                exit_code: Some(1),
                stderr: stderr.clone(),
            });
        }
        state.applied.push(path.to_path_buf());

        match identity {
            Some((kind, name, replicas)) if kind == "Deployment" => {
                let crash_cycles = state.pending_crash_cycles.remove(&name).unwrap_or_default();
                let rollout_delay = state.pending_rollout_delay.remove(&name).unwrap_or_default();
                state.deployments.insert(
                    name.clone(),
                    SimDeployment {
                        desired: replicas,
                        crash_cycles,
                        rollout_delay,
                        ..SimDeployment::default()
                    },
                );
                state.spawn_pods(&name);
            }
            Some((kind, name, _)) if kind == "Service" => {
                let ip = format!("10.96.{}.{}", state.services.len() / 250, state.services.len() % 250 + 1);
                state.services.insert(name, ip);
            }
            Some((kind, name, _)) if kind == "HorizontalPodAutoscaler" => {
                state.autoscalers.push(name);
            }
            _ => {}
        }
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> DeployResult<()> {
        let mut state = self.state.lock();
        match kind {
            ResourceKind::Deployment => {
                state.deployments.remove(name);
            }
            ResourceKind::Service => {
                state.services.remove(name);
            }
            ResourceKind::Autoscaler => state.autoscalers.retain(|a| a != name),
            ResourceKind::Pod => {
                for dep in state.deployments.values_mut() {
                    dep.pods.retain(|p| p.name != name);
                }
            }
        }
        state.deleted.push((kind, name.to_string()));
        Ok(())
    }

    async fn delete_all(&self, kind: ResourceKind) -> DeployResult<()> {
        let mut state = self.state.lock();
        match kind {
            ResourceKind::Deployment => state.deployments.clear(),
            ResourceKind::Service => state.services.clear(),
            ResourceKind::Autoscaler => state.autoscalers.clear(),
            ResourceKind::Pod => {
                for dep in state.deployments.values_mut() {
                    dep.pods.clear();
                }
            }
        }
        state.deleted.push((kind, "--all".to_string()));
        Ok(())
    }

    async fn force_delete_all_pods(&self) -> DeployResult<()> {
        let mut state = self.state.lock();
        for dep in state.deployments.values_mut() {
            dep.pods.clear();
        }
        state.force_deletes += 1;
        Ok(())
    }

    async fn scale(&self, deployment: &str, replicas: u32) -> DeployResult<()> {
        let mut state = self.state.lock();
        state.scale_calls.push((deployment.to_string(), replicas));
        let dep = state
            .deployments
            .get_mut(deployment)
            .ok_or_else(|| Self::not_found("deployment", deployment))?;
        dep.desired = replicas;
        state.spawn_pods(deployment);
        Ok(())
    }

    async fn rollout_ready(&self, deployment: &str) -> DeployResult<bool> {
        let mut state = self.state.lock();
        let dep = state
            .deployments
            .get_mut(deployment)
            .ok_or_else(|| Self::not_found("deployment", deployment))?;
        dep.rollout_checks += 1;
        if dep.rollout_delay > 0 {
            dep.rollout_delay -= 1;
            return Ok(false);
        }
        let live = dep.pods.iter().filter(|p| p.lingering.is_none());
        Ok(live.clone().count() as u32 == dep.desired && live.clone().all(|p| !p.crashed))
    }

    async fn deployment_status(&self, deployment: &str) -> DeployResult<DeploymentStatus> {
        let state = self.state.lock();
        let dep = state
            .deployments
            .get(deployment)
            .ok_or_else(|| Self::not_found("deployment", deployment))?;
        let live: Vec<_> = dep.pods.iter().filter(|p| p.lingering.is_none()).collect();
        Ok(DeploymentStatus {
            replicas: live.len() as u32,
            ready_replicas: live.iter().filter(|p| !p.crashed).count() as u32,
        })
    }

    async fn list_pods(&self, app: &str) -> DeployResult<Vec<PodStatus>> {
        let mut state = self.state.lock();
        let Some(dep) = state.deployments.get_mut(app) else {
            return Ok(Vec::new());
        };
        let pods = dep
            .pods
            .iter()
            .map(|p| PodStatus {
                name: p.name.clone(),
                phase: if p.lingering.is_some() { "Terminating" } else { "Running" }.to_string(),
                crashed: p.crashed,
                restarts: u32::from(p.crashed),
            })
            .collect();

        for pod in dep.pods.iter_mut() {
            if let Some(left) = pod.lingering.as_mut() {
                *left = left.saturating_sub(1);
            }
        }
        dep.pods.retain(|p| p.lingering != Some(0));
        Ok(pods)
    }

    async fn delete_pod(&self, name: &str) -> DeployResult<()> {
        let mut state = self.state.lock();
        state.pod_deletes.push(name.to_string());
        let lag = state.delete_lag;
        for dep in state.deployments.values_mut() {
            let Some(pos) = dep.pods.iter().position(|p| p.name == name && p.lingering.is_none()) else {
                continue;
            };
            if dep.pods[pos].crashed {
                dep.crash_cycles = dep.crash_cycles.saturating_sub(1);
            }
            if lag == 0 {
                dep.pods.remove(pos);
            } else {
                dep.pods[pos].lingering = Some(lag);
            }
        }
        Ok(())
    }

    async fn service_ip(&self, name: &str) -> DeployResult<String> {
        self.state
            .lock()
            .services
            .get(name)
            .cloned()
            .ok_or_else(|| Self::not_found("service", name))
    }

    async fn pod_usage(&self, app: &str) -> DeployResult<Vec<PodUsage>> {
        let state = self.state.lock();
        Ok(state
            .deployments
            .get(app)
            .map(|dep| {
                dep.pods
                    .iter()
                    .filter(|p| p.lingering.is_none())
                    .map(|p| PodUsage {
                        name: p.name.clone(),
                        cpu_millicores: Self::POD_CPU_MILLICORES,
                        memory_bytes: Self::POD_MEMORY_BYTES,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn nodes(&self) -> DeployResult<Vec<NodeStatus>> {
        Ok(self.state.lock().nodes.clone())
    }
}
