//! Components an experiment cycle works with

use kbench_autoscale::AutoscaleController;
use kbench_deploy::ManifestDeployer;
use kbench_invoker::LoadInvocationClient;
use kbench_metrics::MetricsSampler;
use kbench_types::RetryPolicy;

/// Everything a worker needs, shared by `Arc` between the scheduler and its
/// workers.
pub struct ExperimentContext {
    pub deployer: ManifestDeployer,
    pub autoscaler: AutoscaleController,
    pub invoker: LoadInvocationClient,
    pub sampler: MetricsSampler,
    /// Retries of a whole cycle
    pub retry: RetryPolicy,
}
