//! Replica convergence with crash remediation

use futures::future::join_all;
use kbench_deploy::{Orchestrator, PodStatus};
use kbench_types::{CycleOutcome, Deadline, ScaleAction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::AutoscaleConfig;
use crate::error::{AutoscaleError, AutoscaleResult};

/// What one convergence took
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleReport {
    pub polls: u32,
    pub remediations: u32,
}

pub struct AutoscaleController {
    orchestrator: Arc<dyn Orchestrator>,
    config: AutoscaleConfig,
}

impl AutoscaleController {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, config: AutoscaleConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &AutoscaleConfig {
        &self.config
    }

    /// Ask for `target` replicas without waiting for them.
    #[instrument(skip(self))]
    pub async fn scale(&self, name: &str, target: u32) -> AutoscaleResult<()> {
        self.orchestrator.scale(name, target).await?;
        debug!(deployment = %name, target, "Scale requested");
        Ok(())
    }

    /// Poll until `target` replicas of `name` are ready.
    ///
    /// Crashed pods found on a poll are remediated one at a time before the
    /// next poll. Readiness requires a completed rollout and exactly `target`
    /// ready replicas.
    #[instrument(skip(self, deadline))]
    pub async fn wait_to_scale(
        &self,
        name: &str,
        target: u32,
        deadline: Deadline,
    ) -> AutoscaleResult<ScaleReport> {
        let mut report = ScaleReport::default();

        loop {
            report.polls += 1;

            let crashed: Vec<PodStatus> = self
                .orchestrator
                .list_pods(name)
                .await?
                .into_iter()
                .filter(|pod| pod.crashed)
                .collect();

            if !crashed.is_empty() {
                for pod in &crashed {
                    self.remediate(name, &pod.name, target, deadline).await?;
                    report.remediations += 1;
                }
            } else if self.is_ready(name, target).await? {
                info!(
                    deployment = %name,
                    target,
                    polls = report.polls,
                    remediations = report.remediations,
                    "Replicas ready"
                );
                return Ok(report);
            }

            if deadline.is_expired() {
                warn!(deployment = %name, target, polls = report.polls, "Scale timed out");
                return Err(AutoscaleError::Timeout {
                    name: name.to_string(),
                    target,
                    polls: report.polls,
                });
            }
            deadline.sleep(self.config.poll_interval()).await;
        }
    }

    async fn is_ready(&self, name: &str, target: u32) -> AutoscaleResult<bool> {
        if !self.orchestrator.rollout_ready(name).await? {
            return Ok(false);
        }
        let status = self.orchestrator.deployment_status(name).await?;
        Ok(status.ready_replicas == target)
    }

    /// Replace one crashed pod: delete it, wait until it is no longer
    /// listed, then rescale so a fresh pod takes its place.
    #[instrument(skip(self, deadline))]
    async fn remediate(
        &self,
        name: &str,
        pod: &str,
        target: u32,
        deadline: Deadline,
    ) -> AutoscaleResult<()> {
        warn!(deployment = %name, pod = %pod, "Crashed pod, replacing");
        self.orchestrator.delete_pod(pod).await?;

        let started = Instant::now();
        let gone_by = Deadline::after(self.config.gone_timeout()).min(deadline);
        loop {
            let listed = self.orchestrator.list_pods(name).await?;
            if listed.iter().all(|p| p.name != pod) {
                break;
            }
            if gone_by.is_expired() {
                return Err(AutoscaleError::PodNotGone {
                    pod: pod.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            gone_by.sleep(self.config.gone_poll()).await;
        }

        self.orchestrator.scale(name, target).await?;
        Ok(())
    }

    /// Converge a batch of deployments concurrently, each with its own
    /// deadline. Used after an invocation came back without latencies.
    pub async fn error_crackdown(
        &self,
        batch: &[(String, u32)],
    ) -> Vec<(String, AutoscaleResult<ScaleReport>)> {
        let runs = batch.iter().map(|(name, target)| async move {
            let deadline = Deadline::after(self.config.scale_timeout());
            let result = self.wait_to_scale(name, *target, deadline).await;
            if let Err(e) = &result {
                warn!(deployment = %name, error = %e, "Crackdown failed");
            }
            (name.clone(), result)
        });
        join_all(runs).await
    }

    /// Scale and wait, retrying under the configured policy.
    #[instrument(skip(self))]
    pub async fn converge(&self, name: &str, target: u32) -> CycleOutcome {
        let policy = &self.config.retry;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result = match self.scale(name, target).await {
                Ok(()) => {
                    let deadline = Deadline::after(self.config.scale_timeout());
                    self.wait_to_scale(name, target, deadline).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(_) => return CycleOutcome::Success,
                Err(e) if policy.allows(attempt) => {
                    let backoff = policy.backoff_for(attempt);
                    warn!(
                        deployment = %name,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Convergence failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return CycleOutcome::abort(format!(
                        "{} did not converge after {} attempts: {}",
                        name, attempt, e
                    ));
                }
            }
        }
    }

    /// Replica count `action` asks for, given `current`.
    pub fn apply_action(action: &ScaleAction, current: u32) -> u32 {
        action.target.apply(current)
    }

    /// Read the current count of `name`, apply `action` and request the
    /// result. Returns the new target.
    pub async fn execute_action(&self, name: &str, action: &ScaleAction) -> AutoscaleResult<u32> {
        let current = self.orchestrator.deployment_status(name).await?.replicas;
        let target = Self::apply_action(action, current);
        if target != current {
            self.scale(name, target).await?;
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbench_deploy::testing::SimulatedOrchestrator;
    use kbench_types::RetryPolicy;
    use proptest::prelude::*;
    use std::time::Duration;

    fn controller(sim: &Arc<SimulatedOrchestrator>, config: AutoscaleConfig) -> AutoscaleController {
        AutoscaleController::new(sim.clone(), config)
    }

    fn fast_config() -> AutoscaleConfig {
        AutoscaleConfig {
            poll_interval_ms: 100,
            gone_timeout_secs: 5,
            gone_poll_ms: 100,
            scale_timeout_secs: 30,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(200),
                max_backoff: Duration::from_secs(1),
                multiplier: 2.0,
            },
        }
    }

    async fn converge_after_crashes(cycles: u32, lag: u32) -> (ScaleReport, usize) {
        let sim = Arc::new(SimulatedOrchestrator::new());
        sim.add_deployment("fib", 1);
        sim.crash_cycles("fib", cycles);
        sim.delete_lag(lag);

        let controller = controller(&sim, fast_config());
        controller.scale("fib", 3).await.unwrap();
        let report = controller
            .wait_to_scale("fib", 3, Deadline::after(Duration::from_secs(60)))
            .await
            .unwrap();
        (report, sim.pod_deletes().len())
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_poll() {
        let (report, deletes) = converge_after_crashes(0, 0).await;
        assert_eq!(report, ScaleReport { polls: 1, remediations: 0 });
        assert_eq!(deletes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_deleted_pod_to_disappear() {
        let (report, deletes) = converge_after_crashes(2, 3).await;
        assert_eq!(report, ScaleReport { polls: 3, remediations: 2 });
        assert_eq!(deletes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescale_after_each_remediation() {
        let sim = Arc::new(SimulatedOrchestrator::new());
        sim.add_deployment("fib", 2);
        sim.crash_cycles("fib", 1);

        let controller = controller(&sim, fast_config());
        controller.scale("fib", 2).await.unwrap();
        controller
            .wait_to_scale("fib", 2, Deadline::after(Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(
            sim.scale_calls(),
            vec![("fib".to_string(), 2), ("fib".to_string(), 2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_rollout_never_completes() {
        let sim = Arc::new(SimulatedOrchestrator::new());
        sim.add_deployment("fib", 1);
        sim.delay_rollout("fib", u32::MAX);

        let controller = controller(&sim, fast_config());
        let started = Instant::now();
        let err = controller
            .wait_to_scale("fib", 1, Deadline::after(Duration::from_secs(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, AutoscaleError::Timeout { polls, .. } if polls == 11));
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pod_that_never_disappears() {
        let sim = Arc::new(SimulatedOrchestrator::new());
        sim.add_deployment("fib", 1);
        sim.crash_cycles("fib", 1);
        sim.delete_lag(u32::MAX);

        let controller = controller(&sim, fast_config());
        controller.scale("fib", 1).await.unwrap();
        let err = controller
            .wait_to_scale("fib", 1, Deadline::after(Duration::from_secs(60)))
            .await
            .unwrap_err();

        assert!(matches!(err, AutoscaleError::PodNotGone { waited_ms: 5000, .. }));
        assert_eq!(sim.pod_deletes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_converge_success() {
        let sim = Arc::new(SimulatedOrchestrator::new());
        sim.add_deployment("fib", 1);
        sim.crash_cycles("fib", 1);

        let outcome = controller(&sim, fast_config()).converge("fib", 4).await;
        assert!(outcome.is_success());
        assert_eq!(sim.pod_deletes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_converge_aborts_after_max_attempts() {
        let sim = Arc::new(SimulatedOrchestrator::new());

        let outcome = controller(&sim, fast_config()).converge("missing", 2).await;
        assert!(matches!(outcome, CycleOutcome::Abort { .. }));
        assert_eq!(sim.scale_calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_crackdown_reports_per_name() {
        let sim = Arc::new(SimulatedOrchestrator::new());
        sim.add_deployment("fib", 2);
        sim.add_deployment("geo", 1);
        sim.delay_rollout("geo", u32::MAX);

        let mut config = fast_config();
        config.scale_timeout_secs = 2;
        let results = controller(&sim, config)
            .error_crackdown(&[("fib".to_string(), 2), ("geo".to_string(), 1)])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "fib");
        assert!(results[0].1.is_ok());
        assert_eq!(results[1].0, "geo");
        assert!(matches!(results[1].1, Err(AutoscaleError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_action() {
        let sim = Arc::new(SimulatedOrchestrator::new());
        sim.add_deployment("fib", 3);
        let controller = controller(&sim, fast_config());

        let target = controller
            .execute_action("fib", &ScaleAction::delta("fib", -5))
            .await
            .unwrap();
        assert_eq!(target, 1);
        assert_eq!(sim.scale_calls(), vec![("fib".to_string(), 1)]);

        // already at the requested count
        let target = controller
            .execute_action("fib", &ScaleAction::absolute("fib", 1))
            .await
            .unwrap();
        assert_eq!(target, 1);
        assert_eq!(sim.scale_calls().len(), 1);
    }

    #[test]
    fn test_apply_action() {
        let up = ScaleAction::delta("fib", 2);
        assert_eq!(AutoscaleController::apply_action(&up, 3), 5);
        let down = ScaleAction::delta("fib", -3);
        assert_eq!(AutoscaleController::apply_action(&down, 3), 1);
        let exact = ScaleAction::absolute("fib", 7);
        assert_eq!(AutoscaleController::apply_action(&exact, 3), 7);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn converges_within_one_poll_per_crash(cycles in 0u32..8, lag in 0u32..4) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let (report, deletes) = runtime.block_on(converge_after_crashes(cycles, lag));

            prop_assert!(report.polls <= cycles + 1);
            prop_assert!(deletes as u32 <= cycles);
            prop_assert_eq!(report.remediations as usize, deletes);
        }
    }
}
