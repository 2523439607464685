//! `kbench bootstrap`: form the testbed cluster

use clap::Args;
use kbench_bootstrap::{BootstrapEvent, ClusterBootstrapper, LogSink, ProvisionScripts, TestbedConfig};
use kbench_remote::{SshExecutor, SshOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::CliResult;
use crate::output::{print_info, print_success, print_warning};

#[derive(Debug, Args)]
pub struct BootstrapArgs {
    /// Testbed description (hosts, SSH account, vHive version)
    #[arg(short, long, env = "KBENCH_TESTBED")]
    pub testbed: PathBuf,
}

pub async fn execute(args: BootstrapArgs) -> CliResult<()> {
    let testbed = TestbedConfig::load(&args.testbed)?;
    let topology = testbed.topology()?;
    let executor = SshExecutor::for_nodes(SshOptions::default(), topology.all());
    let log = Arc::new(LogSink::create(&testbed.sys.log_filename)?);

    print_info(&format!(
        "Bootstrapping {} nodes, vHive {}, log at {}",
        topology.len(),
        testbed.sys.vhive_version,
        testbed.sys.log_filename.display()
    ));

    let mut bootstrapper = ClusterBootstrapper::new(
        Arc::new(executor),
        topology,
        ProvisionScripts::for_version(&testbed.sys.vhive_version),
        log,
    );

    let events = bootstrapper.subscribe();
    let progress = tokio::spawn(report_progress(events));

    let result = bootstrapper.run().await;
    drop(bootstrapper);
    let _ = progress.await;
    let report = result?;

    for warning in &report.warnings {
        print_warning(warning);
    }
    print_success(&format!("Cluster is {}", report.state));
    Ok(())
}

/// Print progress until the bootstrapper goes away. Returns how many events
/// were shown.
async fn report_progress(mut events: broadcast::Receiver<BootstrapEvent>) -> usize {
    let mut shown = 0;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                print_warning(&format!("{} progress events dropped", missed));
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            BootstrapEvent::StateChanged { to, .. } => print_info(&format!("{}", to)),
            BootstrapEvent::NodeFinished {
                host,
                phase,
                success: false,
            } => print_warning(&format!("{} failed on {}", phase, host)),
            BootstrapEvent::NodeFinished { .. } => {}
        }
        shown += 1;
    }
    shown
}
