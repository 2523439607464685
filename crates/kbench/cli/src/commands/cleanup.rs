//! `kbench cleanup`: remove experiment objects from the cluster

use clap::Args;
use kbench_driver::{cleanup, CleanupOptions, KbenchConfig};

use crate::error::CliResult;
use crate::output::{cleanup_table, print_success};
use crate::wiring;

#[derive(Debug, Args)]
pub struct CleanupArgs {
    /// Also force-delete every pod without a grace period
    #[arg(long)]
    pub aggressive: bool,

    /// Leave rendered manifests in the scratch directory
    #[arg(long)]
    pub keep_manifests: bool,
}

pub async fn execute(args: CleanupArgs, config: &KbenchConfig) -> CliResult<()> {
    let ctx = wiring::build_context(config, wiring::orchestrator()).await?;
    let options = CleanupOptions {
        aggressive: args.aggressive,
        keep_manifests: args.keep_manifests,
    };

    let report = cleanup(&ctx.deployer, &ctx.invoker, options).await?;
    println!("{}", cleanup_table(&report));
    print_success("Cluster cleaned up");
    Ok(())
}
