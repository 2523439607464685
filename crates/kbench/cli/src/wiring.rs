//! Build experiment components from configuration

use kbench_autoscale::AutoscaleController;
use kbench_deploy::{Kubectl, ManifestDeployer, Orchestrator};
use kbench_driver::{ready_workers, ExperimentContext, KbenchConfig};
use kbench_invoker::{InvokerConfig, LoadInvocationClient};
use kbench_metrics::{MetricsSampler, PrometheusBackend};
use kbench_remote::LocalRunner;
use std::path::{self, Path};
use std::sync::Arc;
use tracing::info;

use crate::error::{CliError, CliResult};

/// `kubectl` on the local machine
pub fn orchestrator() -> Arc<dyn Orchestrator> {
    Arc::new(Kubectl::new(Arc::new(LocalRunner::new())))
}

/// Nodes to sample: the configured list, or every ready worker node.
pub async fn metrics_nodes(
    config: &KbenchConfig,
    orchestrator: &dyn Orchestrator,
) -> CliResult<Vec<String>> {
    if !config.metrics.nodes.is_empty() {
        return Ok(config.metrics.nodes.clone());
    }
    let workers = ready_workers(orchestrator, config.driver.expected_nodes).await?;
    if workers.is_empty() {
        return Err(CliError::NoMetricsNodes);
    }
    info!(nodes = ?workers, "Sampling metrics from worker nodes");
    Ok(workers)
}

/// The configuration with paths made absolute. The generator runs inside
/// `work_dir`, so a relative binary path must not be resolved from there.
/// Bare binary names are left for `PATH` lookup.
fn invoker_config(config: &InvokerConfig) -> CliResult<InvokerConfig> {
    let binary = if Path::new(&config.binary).components().count() > 1 {
        path::absolute(&config.binary)?.to_string_lossy().into_owned()
    } else {
        config.binary.clone()
    };
    Ok(InvokerConfig {
        binary,
        work_dir: path::absolute(&config.work_dir)?,
        debug: config.debug,
    })
}

/// Load generator running in its configured work directory
pub fn invoker(config: &InvokerConfig) -> CliResult<LoadInvocationClient> {
    let config = invoker_config(config)?;
    let runner = LocalRunner::new().with_working_dir(&config.work_dir);
    Ok(LoadInvocationClient::new(Arc::new(runner), config))
}

pub async fn build_context(
    config: &KbenchConfig,
    orchestrator: Arc<dyn Orchestrator>,
) -> CliResult<ExperimentContext> {
    let nodes = metrics_nodes(config, orchestrator.as_ref()).await?;
    let backend = PrometheusBackend::new(&config.metrics)?;

    Ok(ExperimentContext {
        deployer: ManifestDeployer::new(orchestrator.clone(), config.deploy.clone()),
        autoscaler: AutoscaleController::new(orchestrator, config.autoscale.clone()),
        invoker: invoker(&config.invoker)?,
        sampler: MetricsSampler::new(Arc::new(backend), nodes),
        retry: config.driver.retry.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbench_invoker::InvocationRequest;

    #[test]
    fn test_invoker_paths_are_absolute() {
        let cwd = std::env::current_dir().unwrap();
        let config = InvokerConfig {
            binary: "./tools/invoker".into(),
            work_dir: "runs".into(),
            debug: false,
        };
        let resolved = invoker_config(&config).unwrap();
        assert_eq!(resolved.work_dir, cwd.join("runs"));
        assert!(Path::new(&resolved.binary).is_absolute());
        assert!(Path::new(&resolved.binary).ends_with("tools/invoker"));

        let bare = InvokerConfig {
            binary: "invoker".into(),
            ..config
        };
        assert_eq!(invoker_config(&bare).unwrap().binary, "invoker");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoker_runs_in_work_dir() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let binary = tmp.path().join("fake-invoker");
        std::fs::write(
            &binary,
            "#!/bin/sh\n\
             printf '1000\\n1200\\n' > rps1.00_wired.csv\n\
             echo 'The measured latencies are saved in rps1.00_wired.csv'\n\
             echo 'completed requests: 2, 2'\n\
             echo 'target RPS: 1.00 / 1.0'\n",
        )
        .unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        let work = tmp.path().join("work");
        std::fs::create_dir(&work).unwrap();

        let client = invoker(&InvokerConfig {
            binary: binary.to_string_lossy().into_owned(),
            work_dir: work.clone(),
            debug: false,
        })
        .unwrap();
        let result = client
            .invoke(&InvocationRequest {
                name: "wired".into(),
                host: "127.0.0.1".into(),
                port: 80,
                duration_secs: 1,
                rps: 1,
            })
            .await
            .unwrap();

        assert_eq!(result.latency_file, work.join("rps1.00_wired.csv"));
        assert_eq!(client.latencies(&result).await.unwrap(), vec![1000.0, 1200.0]);
        assert!(!Path::new("rps1.00_wired.csv").exists());
        assert_eq!(client.clear_outputs().await.unwrap(), 2);
    }
}
