//! `kbench invoke`: one deploy, invoke and report cycle

use clap::Args;
use kbench_driver::{invoke_once, KbenchConfig};

use crate::error::{CliError, CliResult};
use crate::output::{print_info, print_warning, record_table};
use crate::wiring;

#[derive(Debug, Args)]
pub struct InvokeArgs {
    /// Configured benchmark to run
    #[arg(short, long)]
    pub benchmark: String,

    /// Target requests per second
    #[arg(short, long)]
    pub rps: u32,

    /// Invocation length in seconds
    #[arg(short, long)]
    pub duration: u64,

    /// Replica count; defaults to the benchmark's current count
    #[arg(long)]
    pub replicas: Option<u32>,

    /// Print the record as JSON
    #[arg(long)]
    pub raw: bool,
}

pub async fn execute(args: InvokeArgs, config: &KbenchConfig) -> CliResult<()> {
    let benchmark = config.benchmark(&args.benchmark)?;
    if args.rps == 0 || args.duration == 0 {
        return Err(CliError::InvalidArgument(
            "rps and duration must be positive".to_string(),
        ));
    }
    let replicas = args.replicas.unwrap_or(benchmark.current_replicas).max(1);

    print_info(&format!(
        "Invoking {} at {} RPS for {}s on {} replicas",
        benchmark.name, args.rps, args.duration, replicas
    ));
    let ctx = wiring::build_context(config, wiring::orchestrator()).await?;
    let record = invoke_once(&ctx, benchmark, args.rps, args.duration, replicas).await?;

    if args.raw {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", record_table(&record));
    }
    if record.sla_violated {
        print_warning(&format!("{} violated its SLA", benchmark.name));
    }
    Ok(())
}
