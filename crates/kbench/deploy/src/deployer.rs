//! Manifest deployer
//!
//! Renders a benchmark's function templates under a freshly minted name,
//! creates them on the orchestrator and tears them down again.

use futures::future::{join_all, try_join_all};
use kbench_types::{Benchmark, Deadline, DeploymentName, ResourceUsage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{DeployError, DeployResult};
use crate::manifest::ManifestSet;
use crate::orchestrator::{total_usage, Orchestrator, ResourceKind};

/// Deployer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerConfig {
    /// Directory holding `<function>.yaml` templates
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,

    /// Directory rendered manifests are written to
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Also create the autoscaler object. Off when replicas are set by hand.
    #[serde(default)]
    pub autoscaler: bool,

    /// Rollout readiness timeout in seconds
    #[serde(default = "default_rollout_timeout")]
    pub rollout_timeout_secs: u64,

    /// Rollout poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Pause after deleting objects, in seconds
    #[serde(default = "default_delete_grace")]
    pub delete_grace_secs: u64,

    /// Manifests that must stay applied, re-applied by cleanup
    #[serde(default)]
    pub support_manifests: Vec<PathBuf>,
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("k8s-yamls")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("k8s-yamls/tmp")
}

fn default_rollout_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_delete_grace() -> u64 {
    2
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            manifest_dir: default_manifest_dir(),
            scratch_dir: default_scratch_dir(),
            autoscaler: false,
            rollout_timeout_secs: default_rollout_timeout(),
            poll_interval_ms: default_poll_interval(),
            delete_grace_secs: default_delete_grace(),
            support_manifests: Vec::new(),
        }
    }
}

impl DeployerConfig {
    pub fn rollout_timeout(&self) -> Duration {
        Duration::from_secs(self.rollout_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn delete_grace(&self) -> Duration {
        Duration::from_secs(self.delete_grace_secs)
    }
}

/// One function of a benchmark, rendered and ready to apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionArtifact {
    /// Logical function name
    pub function: String,
    /// Minted deployment name
    pub name: String,
    pub workload_path: PathBuf,
    pub service_path: PathBuf,
    pub autoscaler_path: Option<PathBuf>,
    pub port: u16,
}

impl FunctionArtifact {
    fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.workload_path, &self.service_path]
            .into_iter()
            .chain(self.autoscaler_path.as_ref())
    }
}

/// Address load is sent to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

pub struct ManifestDeployer {
    orchestrator: Arc<dyn Orchestrator>,
    config: DeployerConfig,
}

impl ManifestDeployer {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, config: DeployerConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn orchestrator(&self) -> &Arc<dyn Orchestrator> {
        &self.orchestrator
    }

    pub fn config(&self) -> &DeployerConfig {
        &self.config
    }

    /// Render every function of `benchmark` as `<function>-<suffix>`.
    #[instrument(skip(self, benchmark), fields(benchmark = %benchmark.name))]
    pub async fn render(
        &self,
        benchmark: &Benchmark,
        suffix: &str,
    ) -> DeployResult<Vec<FunctionArtifact>> {
        tokio::fs::create_dir_all(&self.config.scratch_dir).await?;

        let mut artifacts = Vec::with_capacity(benchmark.functions.len());
        for function in &benchmark.functions {
            let template = self.config.manifest_dir.join(format!("{}.yaml", function));
            let mut set = ManifestSet::load(&template)?;

            let name = DeploymentName::with_suffix(function.as_str(), suffix).to_string();
            set.rename(&name)?;

            let workload_path = self.scratch_path(&name, "workload");
            let service_path = self.scratch_path(&name, "service");
            tokio::fs::write(&workload_path, set.workload_yaml()?).await?;
            tokio::fs::write(&service_path, set.service_yaml()?).await?;

            let autoscaler_path = match set.autoscaler_yaml()? {
                Some(yaml) if self.config.autoscaler => {
                    let path = self.scratch_path(&name, "hpa");
                    tokio::fs::write(&path, yaml).await?;
                    Some(path)
                }
                _ => None,
            };

            debug!(function = %function, name = %name, "Rendered manifests");
            artifacts.push(FunctionArtifact {
                function: function.clone(),
                port: set.port(),
                name,
                workload_path,
                service_path,
                autoscaler_path,
            });
        }
        Ok(artifacts)
    }

    fn scratch_path(&self, name: &str, part: &str) -> PathBuf {
        self.config.scratch_dir.join(format!("{}-{}.yaml", name, part))
    }

    /// Create all functions concurrently. Each service is created only once
    /// its workload has rolled out.
    pub async fn deploy(&self, artifacts: &[FunctionArtifact]) -> DeployResult<()> {
        try_join_all(artifacts.iter().map(|a| self.deploy_one(a))).await?;
        Ok(())
    }

    #[instrument(skip(self, artifact), fields(name = %artifact.name))]
    async fn deploy_one(&self, artifact: &FunctionArtifact) -> DeployResult<()> {
        self.create(&artifact.name, &artifact.workload_path).await?;
        self.wait_ready(&artifact.name).await?;
        self.create(&artifact.name, &artifact.service_path).await?;
        if let Some(path) = &artifact.autoscaler_path {
            self.create(&artifact.name, path).await?;
        }
        info!(name = %artifact.name, "Function deployed");
        Ok(())
    }

    async fn create(&self, name: &str, path: &Path) -> DeployResult<()> {
        self.orchestrator.apply(path).await.map_err(|e| match e {
            DeployError::Command { stderr, .. } => {
                warn!(deployment = %name, stderr = %stderr, "Creation failed, a previous deployment may still be terminating");
                DeployError::Creation {
                    name: name.to_string(),
                    stderr,
                }
            }
            other => other,
        })
    }

    /// Poll rollout status until ready, bounded by one deadline.
    pub async fn wait_ready(&self, name: &str) -> DeployResult<()> {
        let timeout = self.config.rollout_timeout();
        let deadline = Deadline::after(timeout);
        loop {
            if self.orchestrator.rollout_ready(name).await? {
                return Ok(());
            }
            if deadline.is_expired() {
                return Err(DeployError::ReadinessTimeout {
                    name: name.to_string(),
                    waited_secs: timeout.as_secs(),
                });
            }
            deadline.sleep(self.config.poll_interval()).await;
        }
    }

    /// Delete every object of every function, then pause briefly. All
    /// deletes are attempted; the first error is returned.
    pub async fn delete(&self, artifacts: &[FunctionArtifact]) -> DeployResult<()> {
        let mut deletes = Vec::new();
        for artifact in artifacts {
            deletes.push((ResourceKind::Service, artifact.name.clone()));
            if artifact.autoscaler_path.is_some() {
                deletes.push((ResourceKind::Autoscaler, format!("{}-hpa", artifact.name)));
            }
            deletes.push((ResourceKind::Deployment, artifact.name.clone()));
        }

        let results = join_all(
            deletes
                .iter()
                .map(|(kind, name)| self.orchestrator.delete(*kind, name)),
        )
        .await;

        let mut first_error = None;
        for ((kind, name), result) in deletes.iter().zip(results) {
            if let Err(e) = result {
                warn!(kind = %kind, name = %name, error = %e, "Delete failed");
                first_error.get_or_insert(e);
            }
        }

        tokio::time::sleep(self.config.delete_grace()).await;
        first_error.map_or(Ok(()), Err)
    }

    /// Cluster address of the function receiving load.
    pub async fn entry_endpoint(
        &self,
        artifacts: &[FunctionArtifact],
        entry_point: &str,
    ) -> DeployResult<Endpoint> {
        let artifact = artifacts
            .iter()
            .find(|a| a.function == entry_point)
            .ok_or_else(|| DeployError::UnknownFunction(entry_point.to_string()))?;
        let host = self.orchestrator.service_ip(&artifact.name).await?;
        Ok(Endpoint {
            host,
            port: artifact.port,
        })
    }

    /// Summed usage of all pods of all functions.
    pub async fn resource_usage(&self, artifacts: &[FunctionArtifact]) -> DeployResult<ResourceUsage> {
        let mut usage = ResourceUsage::default();
        for artifact in artifacts {
            usage = usage + total_usage(&self.orchestrator.pod_usage(&artifact.name).await?);
        }
        Ok(usage)
    }

    /// Remove the rendered files of `artifacts`.
    pub async fn remove_rendered(&self, artifacts: &[FunctionArtifact]) {
        for path in artifacts.iter().flat_map(FunctionArtifact::paths) {
            if let Err(e) = tokio::fs::remove_file(path).await {
                debug!(path = %path.display(), error = %e, "Could not remove rendered manifest");
            }
        }
    }

    /// Remove every file in the scratch directory. Returns how many went.
    pub async fn clear_scratch(&self) -> DeployResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.config.scratch_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::fixtures::{FIBONACCI, GEO};
    use crate::testing::SimulatedOrchestrator;
    use kbench_types::{ReplicaRange, RpsRange, Sla};

    fn benchmark(functions: &[&str], entry_point: &str) -> Benchmark {
        Benchmark {
            name: "hotel".into(),
            functions: functions.iter().map(|f| f.to_string()).collect(),
            entry_point: entry_point.into(),
            sla: Sla {
                p50_us: 1000.0,
                p90_us: 5000.0,
            },
            rps_range: RpsRange { min: 10, max: 20 },
            replicas: ReplicaRange::default(),
            current_replicas: 1,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        sim: Arc<SimulatedOrchestrator>,
        deployer: ManifestDeployer,
    }

    fn fixture(autoscaler: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let manifest_dir = dir.path().join("k8s-yamls");
        std::fs::create_dir_all(&manifest_dir).unwrap();
        std::fs::write(manifest_dir.join("hotel-app-geo.yaml"), GEO).unwrap();
        std::fs::write(manifest_dir.join("fibonacci-python.yaml"), FIBONACCI).unwrap();

        let sim = Arc::new(SimulatedOrchestrator::new());
        let config = DeployerConfig {
            manifest_dir,
            scratch_dir: dir.path().join("scratch"),
            autoscaler,
            ..DeployerConfig::default()
        };
        Fixture {
            deployer: ManifestDeployer::new(sim.clone(), config),
            sim,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_render_writes_renamed_manifests() {
        let f = fixture(false);
        let bench = benchmark(&["hotel-app-geo", "fibonacci-python"], "fibonacci-python");
        let artifacts = f.deployer.render(&bench, "abcdefghij").await.unwrap();

        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, "hotel-app-geo-abcdefghij");
        assert_eq!(artifacts[0].port, 50000);
        assert!(artifacts[0].autoscaler_path.is_none());

        let workload = std::fs::read_to_string(&artifacts[0].workload_path).unwrap();
        let reparsed: crate::manifest::WorkloadManifest = serde_yaml::from_str(&workload).unwrap();
        assert_eq!(reparsed.metadata.name, "hotel-app-geo-abcdefghij");
        assert!(workload.contains("hotel-app-geo-db-abcdefghij.default.svc.cluster.local"));
    }

    #[tokio::test]
    async fn test_render_autoscaler_when_enabled() {
        let f = fixture(true);
        let bench = benchmark(&["hotel-app-geo"], "hotel-app-geo");
        let artifacts = f.deployer.render(&bench, "abcdefghij").await.unwrap();
        let hpa = std::fs::read_to_string(artifacts[0].autoscaler_path.as_ref().unwrap()).unwrap();
        assert!(hpa.contains("hotel-app-geo-abcdefghij-hpa"));
    }

    #[tokio::test]
    async fn test_render_unknown_function() {
        let f = fixture(false);
        let bench = benchmark(&["missing"], "missing");
        assert!(matches!(
            f.deployer.render(&bench, "abcdefghij").await,
            Err(DeployError::Manifest { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_creates_service_after_rollout() {
        let f = fixture(false);
        let bench = benchmark(&["fibonacci-python"], "fibonacci-python");
        let artifacts = f.deployer.render(&bench, "abcdefghij").await.unwrap();
        f.sim.delay_rollout("fibonacci-python-abcdefghij", 3);

        f.deployer.deploy(&artifacts).await.unwrap();

        let applied = f.sim.applied();
        assert_eq!(applied.len(), 2);
        assert!(applied[0].ends_with("fibonacci-python-abcdefghij-workload.yaml"));
        assert!(applied[1].ends_with("fibonacci-python-abcdefghij-service.yaml"));
        assert_eq!(f.sim.rollout_checks("fibonacci-python-abcdefghij"), 4);

        let endpoint = f
            .deployer
            .entry_endpoint(&artifacts, "fibonacci-python")
            .await
            .unwrap();
        assert_eq!(endpoint.port, 80);
        assert!(endpoint.host.starts_with("10.96."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_times_out() {
        let f = fixture(false);
        let bench = benchmark(&["fibonacci-python"], "fibonacci-python");
        let artifacts = f.deployer.render(&bench, "abcdefghij").await.unwrap();
        f.sim.delay_rollout("fibonacci-python-abcdefghij", u32::MAX);

        let err = f.deployer.deploy(&artifacts).await.unwrap_err();
        assert!(matches!(err, DeployError::ReadinessTimeout { waited_secs: 60, .. }));
        assert_eq!(f.sim.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_creation_failure_is_reported() {
        let f = fixture(false);
        let bench = benchmark(&["fibonacci-python"], "fibonacci-python");
        let artifacts = f.deployer.render(&bench, "abcdefghij").await.unwrap();
        f.sim.fail_apply("workload", "object is being deleted");

        let err = f.deployer.deploy(&artifacts).await.unwrap_err();
        assert!(matches!(err, DeployError::Creation { ref name, .. } if name == "fibonacci-python-abcdefghij"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_cleanup_scratch() {
        let f = fixture(true);
        let bench = benchmark(&["hotel-app-geo", "fibonacci-python"], "hotel-app-geo");
        let artifacts = f.deployer.render(&bench, "abcdefghij").await.unwrap();
        f.deployer.deploy(&artifacts).await.unwrap();

        f.deployer.delete(&artifacts).await.unwrap();
        let deleted = f.sim.deleted();
        assert!(deleted.contains(&(ResourceKind::Service, "hotel-app-geo-abcdefghij".into())));
        assert!(deleted.contains(&(ResourceKind::Autoscaler, "hotel-app-geo-abcdefghij-hpa".into())));
        assert!(deleted.contains(&(ResourceKind::Deployment, "fibonacci-python-abcdefghij".into())));
        assert!(!f.sim.has_deployment("hotel-app-geo-abcdefghij"));

        // hotel-app-geo has an autoscaler, fibonacci-python does not
        assert_eq!(f.deployer.clear_scratch().await.unwrap(), 5);
        assert_eq!(f.deployer.clear_scratch().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_resource_usage_sums_functions() {
        let f = fixture(false);
        let bench = benchmark(&["fibonacci-python", "hotel-app-geo"], "hotel-app-geo");
        let artifacts = f.deployer.render(&bench, "abcdefghij").await.unwrap();
        f.deployer.deploy(&artifacts).await.unwrap();
        f.sim.scale_now("fibonacci-python-abcdefghij", 3);

        let usage = f.deployer.resource_usage(&artifacts).await.unwrap();
        assert_eq!(usage.cpu_millicores, 4 * SimulatedOrchestrator::POD_CPU_MILLICORES);
        assert_eq!(usage.memory_bytes, 4 * SimulatedOrchestrator::POD_MEMORY_BYTES);
    }
}
