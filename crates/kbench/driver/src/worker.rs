//! One benchmark's experiment cycle
//!
//! deploy → scale → invoke → read latencies → sample → record → tear down.
//! A failed cycle is torn down and, if its error is retryable, run again
//! under a freshly minted name.

use chrono::Utc;
use futures::future::join_all;
use kbench_deploy::FunctionArtifact;
use kbench_invoker::InvocationRequest;
use kbench_types::{CycleOutcome, DeploymentName, ExperimentRecord, LatencyPercentiles, RpsStats};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::context::ExperimentContext;
use crate::error::{DriverError, DriverResult};
use crate::mix::CyclePlan;
use crate::state::SharedState;

/// Run `plan` to completion under `name`, which the scheduler has already
/// marked active. The benchmark is inactive again when this returns.
#[instrument(skip_all, fields(benchmark = %plan.benchmark.name, rps = plan.rps, replicas = plan.replicas))]
pub async fn run_worker(
    ctx: Arc<ExperimentContext>,
    state: Arc<SharedState>,
    plan: CyclePlan,
    name: DeploymentName,
) -> CycleOutcome {
    let benchmark = plan.benchmark.name.clone();
    let mut name = name;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let mut artifacts = Vec::new();
        let outcome = match run_cycle(&ctx, &plan, &name, &mut artifacts).await {
            Ok(record) => {
                info!(
                    name = %name,
                    p90 = record.latencies.p90,
                    sla_violated = record.sla_violated,
                    "Cycle recorded"
                );
                state.push_result(record);
                CycleOutcome::Success
            }
            Err(e) => {
                warn!(name = %name, attempt, error = %e, "Cycle failed");
                e.outcome()
            }
        };

        match outcome {
            CycleOutcome::Retry { reason } if ctx.retry.allows(attempt) => {
                teardown(&ctx, &artifacts).await;
                tokio::time::sleep(ctx.retry.backoff_for(attempt)).await;
                match state.remint(&benchmark, || DeploymentName::mint(&benchmark)) {
                    Some(next) => {
                        debug!(previous = %name, next = %next, reason = %reason, "Retrying under a new name");
                        name = next;
                    }
                    None => return CycleOutcome::abort("benchmark is no longer active"),
                }
            }
            CycleOutcome::Retry { reason } => {
                state.deactivate(&benchmark);
                teardown(&ctx, &artifacts).await;
                return CycleOutcome::abort(format!("gave up after {} attempts: {}", attempt, reason));
            }
            outcome => {
                state.deactivate(&benchmark);
                teardown(&ctx, &artifacts).await;
                return outcome;
            }
        }
    }
}

/// One attempt. `artifacts` holds whatever was rendered, so the caller can
/// tear it down whatever happened.
pub async fn run_cycle(
    ctx: &ExperimentContext,
    plan: &CyclePlan,
    name: &DeploymentName,
    artifacts: &mut Vec<FunctionArtifact>,
) -> DriverResult<ExperimentRecord> {
    let benchmark = &plan.benchmark;

    *artifacts = ctx.deployer.render(benchmark, name.suffix()).await?;
    ctx.deployer.deploy(artifacts).await?;

    converge_all(ctx, artifacts, plan.replicas).await?;

    let endpoint = ctx
        .deployer
        .entry_endpoint(artifacts, &benchmark.entry_point)
        .await?;
    let request = InvocationRequest {
        name: name.to_string(),
        host: endpoint.host,
        port: endpoint.port,
        duration_secs: plan.duration_secs,
        rps: plan.rps,
    };
    let result = ctx.invoker.invoke(&request).await?;

    let samples = ctx.invoker.latencies(&result).await?;
    let Some(latencies) = LatencyPercentiles::from_samples(&samples) else {
        let batch: Vec<(String, u32)> = artifacts
            .iter()
            .map(|a| (a.name.clone(), plan.replicas))
            .collect();
        for (deployment, result) in ctx.autoscaler.error_crackdown(&batch).await {
            if let Ok(report) = result {
                debug!(deployment = %deployment, remediations = report.remediations, "Crackdown done");
            }
        }
        return Err(DriverError::NoLatencies(name.to_string()));
    };

    let env = ctx.sampler.sample(plan.duration_secs).await?;
    let resources = ctx.deployer.resource_usage(artifacts).await?;

    Ok(ExperimentRecord {
        timestamp: Utc::now(),
        benchmark_id: name.to_string(),
        benchmark: benchmark.name.clone(),
        resources,
        replicas: plan.replicas,
        rps: RpsStats::from(&result),
        sla_violated: benchmark.sla.violated_by(&latencies),
        latencies,
        env,
    })
}

pub(crate) async fn converge_all(
    ctx: &ExperimentContext,
    artifacts: &[FunctionArtifact],
    replicas: u32,
) -> DriverResult<()> {
    let outcomes = join_all(
        artifacts
            .iter()
            .map(|a| ctx.autoscaler.converge(&a.name, replicas)),
    )
    .await;

    for (artifact, outcome) in artifacts.iter().zip(outcomes) {
        if !outcome.is_success() {
            return Err(DriverError::Convergence {
                name: artifact.name.clone(),
                reason: outcome.to_string(),
            });
        }
    }
    Ok(())
}

pub(crate) async fn teardown(ctx: &ExperimentContext, artifacts: &[FunctionArtifact]) {
    if artifacts.is_empty() {
        return;
    }
    if let Err(e) = ctx.deployer.delete(artifacts).await {
        warn!(error = %e, "Teardown incomplete");
    }
    ctx.deployer.remove_rendered(artifacts).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::{fibonacci, harness};
    use kbench_deploy::ResourceKind;

    fn plan() -> CyclePlan {
        CyclePlan {
            benchmark: fibonacci(),
            rps: 100,
            duration_secs: 10,
            replicas: 2,
        }
    }

    fn activate(state: &SharedState) -> DeploymentName {
        state
            .activate("fib", || DeploymentName::with_suffix("fib", "aaaaaaaaaa"))
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_cycle() {
        let h = harness();
        let state = Arc::new(SharedState::new());
        let name = activate(&state);

        let outcome = run_worker(h.ctx.clone(), state.clone(), plan(), name).await;
        assert!(outcome.is_success());
        assert!(!state.is_active("fib"));

        let records = state.results();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.benchmark_id, "fib-aaaaaaaaaa");
        assert_eq!(record.benchmark, "fib");
        assert_eq!(record.replicas, 2);
        assert_eq!(record.rps.issued, 1000);
        assert_eq!(record.rps.completed, 950);
        assert_eq!(record.rps.drop_rate, 0.05);
        assert_eq!(record.latencies.p50, 1100.0);
        assert!(record.sla_violated);
        assert_eq!(record.resources.cpu_millicores, 200);
        assert_eq!(record.env.nodes.len(), 2);

        // the entry function was deployed under the shared suffix and removed
        assert!(h.sim.deleted().contains(&(
            ResourceKind::Deployment,
            "fibonacci-python-aaaaaaaaaa".to_string()
        )));
        assert!(!h.sim.has_deployment("fibonacci-python-aaaaaaaaaa"));
        assert_eq!(
            h.runner.calls_matching("-latf fib-aaaaaaaaaa.csv").len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_latencies_retry_under_new_name() {
        let h = harness();
        h.write_latencies("");
        let state = Arc::new(SharedState::new());
        let name = activate(&state);

        let outcome = run_worker(h.ctx.clone(), state.clone(), plan(), name).await;
        assert!(matches!(outcome, CycleOutcome::Abort { .. }));
        assert!(state.results().is_empty());
        assert!(!state.is_active("fib"));

        // three attempts, each under its own name, all torn down
        let invocations = h.runner.calls_matching("invoker");
        assert_eq!(invocations.len(), 3);
        let mut latf: Vec<_> = invocations
            .iter()
            .filter_map(|c| c.split("-latf ").nth(1).map(str::to_string))
            .collect();
        latf.dedup();
        assert_eq!(latf.len(), 3);
        assert!(h.sim.deployment_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_template_aborts_without_retry() {
        let h = harness();
        let mut plan = plan();
        plan.benchmark.functions = vec!["missing-function".into()];
        plan.benchmark.entry_point = "missing-function".into();
        let state = Arc::new(SharedState::new());
        let name = activate(&state);

        let outcome = run_worker(h.ctx.clone(), state.clone(), plan, name).await;
        assert!(matches!(outcome, CycleOutcome::Abort { .. }));
        assert!(h.runner.calls().is_empty());
        assert!(!state.is_active("fib"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_failure_is_retried() {
        let h = harness();
        h.sim.fail_apply("fibonacci-python-aaaaaaaaaa-workload", "object is being deleted");
        let state = Arc::new(SharedState::new());
        let name = activate(&state);

        let outcome = run_worker(h.ctx.clone(), state.clone(), plan(), name).await;
        assert!(outcome.is_success());
        assert_eq!(state.result_count(), 1);
        assert_ne!(state.results()[0].benchmark_id, "fib-aaaaaaaaaa");
    }
}
