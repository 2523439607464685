//! Cluster bootstrapper
//!
//! Forms a multi-node cluster from freshly reserved hosts: provision every
//! node, configure the workers, initialize the master, join the workers one
//! by one and install the tooling experiments need.

use futures::future::join_all;
use kbench_remote::{CommandOutput, RemoteExecutor, RemoteResult};
use kbench_types::{Deadline, Node};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Topology;
use crate::error::{BootstrapError, BootstrapResult};
use crate::join::extract_join_command;
use crate::log_sink::LogSink;
use crate::scripts::ProvisionScripts;
use crate::state::ClusterState;

/// Timing knobs for the join handshake
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Wait before the first look at the master log
    pub join_initial_wait: Duration,

    /// Interval between master log polls
    pub join_poll_interval: Duration,

    /// Give up on the join command after this long
    pub join_timeout: Duration,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            join_initial_wait: Duration::from_secs(5),
            join_poll_interval: Duration::from_secs(1),
            join_timeout: Duration::from_secs(600),
        }
    }
}

/// Events emitted while bootstrapping.
#[derive(Debug, Clone)]
pub enum BootstrapEvent {
    /// The state machine moved.
    StateChanged {
        from: ClusterState,
        to: ClusterState,
    },

    /// A node finished a phase.
    NodeFinished {
        host: String,
        phase: String,
        success: bool,
    },
}

/// Summary of a finished bootstrap
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub state: ClusterState,
    pub join_command: String,
    /// Failures in optional phases
    pub warnings: Vec<String>,
}

pub struct ClusterBootstrapper {
    executor: Arc<dyn RemoteExecutor>,
    topology: Topology,
    scripts: ProvisionScripts,
    options: BootstrapOptions,
    log: Arc<LogSink>,
    state: ClusterState,
    event_tx: broadcast::Sender<BootstrapEvent>,
}

impl ClusterBootstrapper {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        topology: Topology,
        scripts: ProvisionScripts,
        log: Arc<LogSink>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            executor,
            topology,
            scripts,
            options: BootstrapOptions::default(),
            log,
            state: ClusterState::Idle,
            event_tx,
        }
    }

    pub fn with_options(mut self, options: BootstrapOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BootstrapEvent> {
        self.event_tx.subscribe()
    }

    /// Run the bootstrap to `Ready`. Any fatal error leaves the machine in
    /// `Aborted`.
    #[instrument(skip(self), fields(master = %self.topology.master.hostname, workers = self.topology.workers.len()))]
    pub async fn run(&mut self) -> BootstrapResult<BootstrapReport> {
        match self.drive().await {
            Ok(report) => {
                info!("Cluster is ready");
                Ok(report)
            }
            Err(e) => {
                error!(state = %self.state, error = %e, "Bootstrap aborted");
                if let Err(te) = self.advance(ClusterState::Aborted) {
                    debug!(error = %te, "Bootstrap already aborted");
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> BootstrapResult<BootstrapReport> {
        let mut warnings = Vec::new();
        let all_nodes: Vec<Node> = self.topology.all().cloned().collect();
        let workers = self.topology.workers.clone();
        let master = self.topology.master.hostname.clone();

        self.advance(ClusterState::NodesCleaning)?;
        info!(nodes = all_nodes.len(), "Setting up all nodes");
        let results = self
            .run_parallel("provision", &all_nodes, &self.scripts.provision_all)
            .await;
        self.require_all("provision", results)?;
        self.advance(ClusterState::NodesProvisioned)?;

        info!("Setting up worker nodes");
        let results = self
            .run_parallel("configure-worker", &workers, &self.scripts.configure_worker)
            .await;
        self.require_all("configure-worker", results)?;
        self.advance(ClusterState::WorkersConfigured)?;

        info!(host = %master, "Initializing master");
        let mut master_session = self
            .executor
            .spawn(&master, &self.scripts.init_master)
            .await?;
        self.advance(ClusterState::MasterJoinInitiated)?;

        let join_command = self.wait_for_join_command(&master).await?;
        info!(join_command = %join_command, "Join command available");
        self.advance(ClusterState::JoinStringAvailable)?;

        // Sequential on purpose: a bad join command stops at the first worker.
        for (i, worker) in workers.iter().enumerate() {
            let output = self.executor.execute(&worker.hostname, &join_command).await?;
            self.log.record(&worker.hostname, "join", &output)?;
            self.check("join", &worker.hostname, &output)?;
            info!(host = %worker.hostname, "Worker joined ({}/{})", i + 1, workers.len());
        }
        self.advance(ClusterState::WorkersJoined)?;

        master_session.send("y\n").await?;
        master_session.close_input().await?;
        let output = master_session.wait().await?;
        self.log.record(&master, "init-master", &output)?;
        self.check("master confirmation", &master, &output)?;

        info!(host = %master, "Installing vSwarm");
        match self.executor.execute(&master, &self.scripts.install_vswarm).await {
            Ok(output) => {
                self.log.record(&master, "install-vswarm", &output)?;
                if !output.success() {
                    warn!(host = %master, exit_code = ?output.exit_code, "vSwarm installation failed, install it manually");
                    warnings.push(format!("vSwarm installation failed on {}", master));
                }
            }
            Err(e) => {
                warn!(host = %master, error = %e, "vSwarm installation could not run");
                warnings.push(format!("vSwarm installation could not run on {}: {}", master, e));
            }
        }
        self.advance(ClusterState::VSwarmInstalled)?;

        info!("Installing metrics agents on all nodes");
        let results = self
            .run_parallel("install-metrics", &all_nodes, &self.scripts.install_metrics_agents)
            .await;
        for (host, result) in results {
            match result {
                Ok(output) if output.success() => {}
                Ok(output) => {
                    warn!(host = %host, exit_code = ?output.exit_code, "Metrics agent installation failed");
                    warnings.push(format!("metrics agents failed on {}", host));
                }
                Err(e) => {
                    warn!(host = %host, error = %e, "Metrics agent installation could not run");
                    warnings.push(format!("metrics agents could not run on {}: {}", host, e));
                }
            }
        }
        self.advance(ClusterState::MetricsAgentsInstalled)?;
        self.advance(ClusterState::Ready)?;

        Ok(BootstrapReport {
            state: self.state,
            join_command,
            warnings,
        })
    }

    fn advance(&mut self, next: ClusterState) -> BootstrapResult<()> {
        let from = self.state.transition(next)?;
        debug!(from = %from, to = %next, "Bootstrap state changed");
        let _ = self.event_tx.send(BootstrapEvent::StateChanged { from, to: next });
        Ok(())
    }

    /// Run `script` on every node concurrently and log each output.
    async fn run_parallel(
        &self,
        phase: &str,
        nodes: &[Node],
        script: &str,
    ) -> Vec<(String, RemoteResult<CommandOutput>)> {
        let runs = nodes.iter().map(|node| {
            let executor = self.executor.clone();
            let host = node.hostname.clone();
            async move {
                let result = executor.execute(&host, script).await;
                (host, result)
            }
        });

        let results = join_all(runs).await;
        for (host, result) in &results {
            if let Ok(output) = result {
                if let Err(e) = self.log.record(host, phase, output) {
                    warn!(host = %host, error = %e, "Failed to write bootstrap log");
                }
                let _ = self.event_tx.send(BootstrapEvent::NodeFinished {
                    host: host.clone(),
                    phase: phase.to_string(),
                    success: output.success(),
                });
            }
        }
        results
    }

    fn require_all(
        &self,
        phase: &str,
        results: Vec<(String, RemoteResult<CommandOutput>)>,
    ) -> BootstrapResult<()> {
        for (host, result) in results {
            let output = result?;
            self.check(phase, &host, &output)?;
        }
        Ok(())
    }

    fn check(&self, phase: &str, host: &str, output: &CommandOutput) -> BootstrapResult<()> {
        if output.success() {
            return Ok(());
        }
        error!(host, phase, exit_code = ?output.exit_code, stderr = %output.stderr.trim(), "Command failed");
        Err(BootstrapError::CommandFailed {
            phase: phase.to_string(),
            host: host.to_string(),
            exit_code: output.exit_code,
        })
    }

    async fn wait_for_join_command(&self, master: &str) -> BootstrapResult<String> {
        let deadline = Deadline::after(self.options.join_timeout);
        deadline.sleep(self.options.join_initial_wait).await;

        loop {
            let output = self
                .executor
                .execute(master, &ProvisionScripts::read_master_log())
                .await?;

            if output.success() {
                if let Some(command) = extract_join_command(&output.stdout) {
                    return Ok(command);
                }
            } else {
                debug!(host = master, "Master log not readable yet");
            }

            if deadline.is_expired() {
                return Err(BootstrapError::JoinTimeout {
                    host: master.to_string(),
                    waited_secs: self.options.join_timeout.as_secs(),
                });
            }
            deadline.sleep(self.options.join_poll_interval).await;
        }
    }
}
