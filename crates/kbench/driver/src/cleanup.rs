//! Cluster and workspace cleanup

use kbench_deploy::{ManifestDeployer, ResourceKind};
use kbench_invoker::LoadInvocationClient;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::DriverResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Also force-delete every pod without a grace period
    pub aggressive: bool,
    /// Leave rendered manifests in the scratch directory
    pub keep_manifests: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub support_reapplied: usize,
    pub manifests_removed: usize,
    pub outputs_removed: usize,
}

/// Remove every workload, service and autoscaler, then bring the shared
/// support services back. Safe to run repeatedly.
#[instrument(skip(deployer, invoker))]
pub async fn cleanup(
    deployer: &ManifestDeployer,
    invoker: &LoadInvocationClient,
    options: CleanupOptions,
) -> DriverResult<CleanupReport> {
    let orchestrator = deployer.orchestrator();
    for kind in [ResourceKind::Autoscaler, ResourceKind::Service, ResourceKind::Deployment] {
        orchestrator.delete_all(kind).await?;
    }
    if options.aggressive {
        warn!("Force-deleting all pods");
        orchestrator.force_delete_all_pods().await?;
    }

    let mut report = CleanupReport::default();
    for manifest in &deployer.config().support_manifests {
        orchestrator.apply(manifest).await?;
        report.support_reapplied += 1;
    }

    if !options.keep_manifests {
        report.manifests_removed = deployer.clear_scratch().await?;
    }
    report.outputs_removed = invoker.clear_outputs().await?;

    info!(
        support_reapplied = report.support_reapplied,
        manifests_removed = report.manifests_removed,
        outputs_removed = report.outputs_removed,
        "Cleanup complete"
    );
    Ok(report)
}
