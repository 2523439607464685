//! Environment interface for an external control agent
//!
//! A [`ControlEnvironment`] keeps one deployment per benchmark alive across
//! steps. The agent observes the cluster, proposes scale actions and gets
//! back the latencies each benchmark achieved under the new replica counts.

use futures::future::join_all;
use kbench_autoscale::AutoscaleController;
use kbench_deploy::FunctionArtifact;
use kbench_invoker::InvocationRequest;
use kbench_types::{Benchmark, DeploymentName, EnvSample, LatencyPercentiles, ScaleAction};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::context::ExperimentContext;
use crate::error::DriverResult;
use crate::mix::draw_rps;
use crate::worker::{converge_all, teardown};

struct Deployed {
    benchmark: Benchmark,
    name: DeploymentName,
    artifacts: Vec<FunctionArtifact>,
}

pub struct ControlEnvironment {
    ctx: Arc<ExperimentContext>,
    deployed: Vec<Deployed>,
    rng: StdRng,
}

impl ControlEnvironment {
    /// Deploy every benchmark under a fresh name and scale each to its
    /// current replica count.
    ///
    /// If any benchmark fails, the ones that came up are torn down again.
    #[instrument(skip_all, fields(benchmarks = benchmarks.len()))]
    pub async fn setup(ctx: Arc<ExperimentContext>, benchmarks: Vec<Benchmark>) -> DriverResult<Self> {
        let results = join_all(benchmarks.into_iter().map(|b| deploy_one(&ctx, b))).await;

        let mut deployed = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(d) => deployed.push(d),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let mut env = Self {
            ctx,
            deployed,
            rng: StdRng::from_entropy(),
        };
        if let Some(e) = first_error {
            env.teardown().await;
            return Err(e);
        }
        info!(deployed = env.deployed.len(), "Control environment ready");
        Ok(env)
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Minted name and replica count of every live benchmark.
    pub fn replicas(&self) -> BTreeMap<String, (DeploymentName, u32)> {
        self.deployed
            .iter()
            .map(|d| {
                (
                    d.benchmark.name.clone(),
                    (d.name.clone(), d.benchmark.current_replicas),
                )
            })
            .collect()
    }

    pub async fn observe(&self, window_secs: u64) -> DriverResult<EnvSample> {
        Ok(self.ctx.sampler.sample(window_secs).await?)
    }

    /// Apply `actions`, converge, then load every benchmark for
    /// `duration_secs` at a random rate from its range.
    ///
    /// Benchmarks whose invocation failed or produced no latencies are left
    /// out of the result.
    #[instrument(skip_all, fields(actions = actions.len()))]
    pub async fn evaluate(
        &mut self,
        actions: &[ScaleAction],
        duration_secs: u64,
    ) -> DriverResult<BTreeMap<String, LatencyPercentiles>> {
        for d in &mut self.deployed {
            for action in actions.iter().filter(|a| a.applies_to(&d.benchmark.name)) {
                d.benchmark.current_replicas =
                    AutoscaleController::apply_action(action, d.benchmark.current_replicas);
            }
        }

        let ctx = &self.ctx;
        let converged = join_all(
            self.deployed
                .iter()
                .map(|d| converge_all(ctx, &d.artifacts, d.benchmark.current_replicas)),
        )
        .await;
        converged.into_iter().collect::<DriverResult<Vec<()>>>()?;

        let rates: Vec<u32> = self
            .deployed
            .iter()
            .map(|d| draw_rps(d.benchmark.rps_range, &mut self.rng))
            .collect();
        let measured = join_all(
            self.deployed
                .iter()
                .zip(rates)
                .map(|(d, rps)| measure(ctx, d, rps, duration_secs)),
        )
        .await;

        let mut latencies = BTreeMap::new();
        for (d, result) in self.deployed.iter().zip(measured) {
            match result {
                Ok(Some(p)) => {
                    latencies.insert(d.benchmark.name.clone(), p);
                }
                Ok(None) => warn!(benchmark = %d.benchmark.name, "No latencies recorded"),
                Err(e) => warn!(benchmark = %d.benchmark.name, error = %e, "Invocation failed"),
            }
        }
        Ok(latencies)
    }

    /// Delete every deployment this environment created.
    pub async fn teardown(&mut self) {
        for d in self.deployed.drain(..) {
            teardown(&self.ctx, &d.artifacts).await;
        }
    }
}

async fn deploy_one(ctx: &ExperimentContext, benchmark: Benchmark) -> DriverResult<Deployed> {
    let name = DeploymentName::mint(&benchmark.name);
    let mut artifacts = Vec::new();
    let result = async {
        artifacts = ctx.deployer.render(&benchmark, name.suffix()).await?;
        ctx.deployer.deploy(&artifacts).await?;
        converge_all(ctx, &artifacts, benchmark.current_replicas).await
    }
    .await;

    match result {
        Ok(()) => Ok(Deployed {
            benchmark,
            name,
            artifacts,
        }),
        Err(e) => {
            teardown(ctx, &artifacts).await;
            Err(e)
        }
    }
}

async fn measure(
    ctx: &ExperimentContext,
    deployed: &Deployed,
    rps: u32,
    duration_secs: u64,
) -> DriverResult<Option<LatencyPercentiles>> {
    let endpoint = ctx
        .deployer
        .entry_endpoint(&deployed.artifacts, &deployed.benchmark.entry_point)
        .await?;
    let request = InvocationRequest {
        name: deployed.name.to_string(),
        host: endpoint.host,
        port: endpoint.port,
        duration_secs,
        rps,
    };
    let result = ctx.invoker.invoke(&request).await?;
    let samples = ctx.invoker.latencies(&result).await?;
    Ok(LatencyPercentiles::from_samples(&samples))
}
