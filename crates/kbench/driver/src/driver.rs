//! Experiment scheduler
//!
//! Every tick draws a random subset of benchmarks and starts a worker for
//! each one that is not already running. Results are persisted after every
//! tick. At the deadline outstanding workers are aborted, the cluster is
//! cleaned up and the results are written a final time.

use kbench_deploy::Orchestrator;
use kbench_types::{Benchmark, CycleOutcome, Deadline, DeploymentName, ExperimentRecord, RunId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::cleanup::{cleanup, CleanupOptions};
use crate::config::DriverConfig;
use crate::context::ExperimentContext;
use crate::error::{DriverError, DriverResult};
use crate::mix::{plan_tick, CyclePlan};
use crate::persist::write_results;
use crate::state::SharedState;
use crate::worker::{run_cycle, run_worker, teardown};

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub ticks: u64,
    pub spawned: u64,
    /// Draws skipped because the benchmark was still running
    pub skipped: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    /// Workers still running at the deadline
    pub cancelled: u64,
    pub records: usize,
}

pub struct ExperimentDriver {
    ctx: Arc<ExperimentContext>,
    state: Arc<SharedState>,
    benchmarks: Vec<Benchmark>,
    config: DriverConfig,
    workers: JoinSet<(String, CycleOutcome)>,
    rng: StdRng,
    summary: RunSummary,
}

impl ExperimentDriver {
    pub fn new(ctx: Arc<ExperimentContext>, benchmarks: Vec<Benchmark>, config: DriverConfig) -> Self {
        Self {
            ctx,
            state: Arc::new(SharedState::new()),
            benchmarks,
            config,
            workers: JoinSet::new(),
            rng: StdRng::from_entropy(),
            summary: RunSummary {
                run_id: RunId::generate().to_string(),
                ..RunSummary::default()
            },
        }
    }

    /// Use a fixed random source for the workload mix.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Check the cluster and the metrics backends before running.
    pub async fn preflight(&self) -> DriverResult<()> {
        ready_workers(self.ctx.deployer.orchestrator().as_ref(), self.config.expected_nodes).await?;

        let unreachable: Vec<String> = self
            .ctx
            .sampler
            .check_backends()
            .await
            .into_iter()
            .filter_map(|(node, result)| result.err().map(|_| node))
            .collect();
        if !unreachable.is_empty() {
            return Err(DriverError::MetricsUnavailable(unreachable));
        }
        Ok(())
    }

    /// Run until the configured duration has passed.
    #[instrument(skip(self), fields(run_id = %self.summary.run_id))]
    pub async fn run(&mut self) -> DriverResult<RunSummary> {
        let deadline = Deadline::after(self.config.duration());
        info!(
            duration_secs = self.config.duration_secs,
            tick_secs = self.config.tick_secs,
            benchmarks = self.benchmarks.len(),
            "Experiment started"
        );

        while !deadline.is_expired() {
            if let Err(e) = self.tick().await {
                warn!(error = %e, "Tick failed, continuing");
            }
            deadline.sleep(self.config.tick()).await;
        }

        self.finish().await
    }

    /// One scheduling step: reap finished workers, start new ones, persist.
    pub async fn tick(&mut self) -> DriverResult<usize> {
        self.reap();
        self.summary.ticks += 1;

        let plans = plan_tick(&self.benchmarks, &self.config, &mut self.rng);
        let mut started = 0;
        for plan in plans {
            if self.spawn(plan) {
                started += 1;
            }
        }

        debug!(tick = self.summary.ticks, started, running = self.workers.len(), "Tick");
        self.persist().await?;
        Ok(started)
    }

    fn spawn(&mut self, plan: CyclePlan) -> bool {
        let benchmark = plan.benchmark.name.clone();
        let Some(name) = self
            .state
            .activate(&benchmark, || DeploymentName::mint_with(&benchmark, &mut self.rng))
        else {
            debug!(benchmark = %benchmark, "Already running, skipped");
            self.summary.skipped += 1;
            return false;
        };

        info!(benchmark = %benchmark, name = %name, rps = plan.rps, replicas = plan.replicas, "Starting cycle");
        let ctx = self.ctx.clone();
        let state = self.state.clone();
        self.workers.spawn(async move {
            let outcome = run_worker(ctx, state, plan, name).await;
            (benchmark, outcome)
        });
        self.summary.spawned += 1;
        true
    }

    fn reap(&mut self) {
        while let Some(joined) = self.workers.try_join_next() {
            match joined {
                Ok((benchmark, CycleOutcome::Success)) => {
                    debug!(benchmark = %benchmark, "Worker finished");
                    self.summary.succeeded += 1;
                }
                Ok((benchmark, outcome)) => {
                    warn!(benchmark = %benchmark, outcome = %outcome, "Worker gave up");
                    self.summary.failed += 1;
                }
                Err(e) if e.is_panic() => {
                    error!(error = %e, "Worker panicked");
                    self.summary.panicked += 1;
                }
                Err(e) => debug!(error = %e, "Worker cancelled"),
            }
        }
    }

    async fn finish(&mut self) -> DriverResult<RunSummary> {
        self.reap();
        let outstanding = self.workers.len();
        self.workers.abort_all();
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Err(e) if e.is_cancelled() => self.summary.cancelled += 1,
                Err(e) => {
                    error!(error = %e, "Worker panicked");
                    self.summary.panicked += 1;
                }
                Ok((_, CycleOutcome::Success)) => self.summary.succeeded += 1,
                Ok(_) => self.summary.failed += 1,
            }
        }
        self.state.clear_active();
        if outstanding > 0 {
            warn!(outstanding, "Aborted workers still running at the deadline");
        }

        let options = CleanupOptions {
            aggressive: self.config.aggressive_cleanup,
            keep_manifests: false,
        };
        if let Err(e) = cleanup(&self.ctx.deployer, &self.ctx.invoker, options).await {
            error!(error = %e, "Final cleanup failed");
        }

        self.persist().await?;
        self.summary.records = self.state.result_count();
        info!(
            records = self.summary.records,
            succeeded = self.summary.succeeded,
            failed = self.summary.failed,
            cancelled = self.summary.cancelled,
            "Experiment finished"
        );
        Ok(self.summary.clone())
    }

    pub async fn persist(&self) -> DriverResult<()> {
        write_results(&self.config.output, &self.state.results()).await
    }
}

/// Check that every node is Ready and, when `expected` is non-zero, that
/// there are that many. Returns the worker nodes.
pub async fn ready_workers(orchestrator: &dyn Orchestrator, expected: usize) -> DriverResult<Vec<String>> {
    let nodes = orchestrator.nodes().await?;

    let not_ready: Vec<String> = nodes
        .iter()
        .filter(|n| !n.ready)
        .map(|n| n.name.clone())
        .collect();
    if !not_ready.is_empty() {
        return Err(DriverError::NodesNotReady(not_ready));
    }
    if expected > 0 && nodes.len() != expected {
        return Err(DriverError::NodeCount {
            expected,
            found: nodes.len(),
        });
    }

    Ok(nodes
        .into_iter()
        .filter(|n| !n.control_plane)
        .map(|n| n.name)
        .collect())
}

/// Deploy, scale, invoke and record one benchmark once, then tear it down.
pub async fn invoke_once(
    ctx: &ExperimentContext,
    benchmark: &Benchmark,
    rps: u32,
    duration_secs: u64,
    replicas: u32,
) -> DriverResult<ExperimentRecord> {
    let plan = CyclePlan {
        benchmark: benchmark.clone(),
        rps,
        duration_secs,
        replicas,
    };
    let name = DeploymentName::mint(&benchmark.name);
    let mut artifacts = Vec::new();
    let result = run_cycle(ctx, &plan, &name, &mut artifacts).await;
    teardown(ctx, &artifacts).await;
    result
}
