//! `kbench run`: the concurrent experiment loop

use clap::Args;
use kbench_driver::{ExperimentDriver, KbenchConfig};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{CliError, CliResult};
use crate::output::{print_info, print_success, summary_table};
use crate::wiring;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Experiment length in seconds
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Seconds between scheduling ticks
    #[arg(short, long)]
    pub tick: Option<u64>,

    /// Results file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub raw: bool,
}

pub async fn execute(args: RunArgs, config: &KbenchConfig) -> CliResult<()> {
    if config.benchmarks.is_empty() {
        return Err(CliError::NoBenchmarks);
    }

    let mut driver_config = config.driver.clone();
    if let Some(duration) = args.duration {
        driver_config.duration_secs = duration;
    }
    if let Some(tick) = args.tick {
        driver_config.tick_secs = tick;
    }
    if let Some(output) = args.output {
        driver_config.output = output;
    }
    if driver_config.tick_secs == 0 {
        return Err(CliError::InvalidArgument("tick must be at least one second".to_string()));
    }

    let ctx = wiring::build_context(config, wiring::orchestrator()).await?;
    let output = driver_config.output.clone();
    let mut driver = ExperimentDriver::new(Arc::new(ctx), config.benchmarks.clone(), driver_config);

    driver.preflight().await?;
    print_info(&format!(
        "Running {} benchmarks, results in {}",
        config.benchmarks.len(),
        output.display()
    ));

    let summary = driver.run().await?;
    if args.raw {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", summary_table(&summary));
    }
    print_success(&format!("{} records written to {}", summary.records, output.display()));
    Ok(())
}
