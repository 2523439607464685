//! kbench CLI - Serverless testbed experiment automation
//!
//! - `bootstrap`: form a Kubernetes/Knative cluster from reserved hosts
//! - `run`: deploy, scale and load benchmarks concurrently until a deadline
//! - `invoke`: a single deploy, invoke and report cycle
//! - `cleanup`: remove experiment objects and scratch files

use anyhow::Context;
use clap::{Parser, Subcommand};
use kbench_driver::KbenchConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;
mod wiring;

use commands::{bootstrap, cleanup, invoke, run};

#[derive(Parser)]
#[command(name = "kbench")]
#[command(about = "kbench - Serverless testbed experiment automation", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "KBENCH_CONFIG", global = true)]
    config: Option<String>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON logs
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision and join the testbed cluster
    Bootstrap(bootstrap::BootstrapArgs),

    /// Run experiments until the deadline
    Run(run::RunArgs),

    /// Deploy, invoke and report one benchmark
    Invoke(invoke::InvokeArgs),

    /// Delete experiment objects from the cluster
    Cleanup(cleanup::CleanupArgs),
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = KbenchConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    init_tracing(level, cli.json || config.logging.json);

    let result = match cli.command {
        Commands::Bootstrap(args) => bootstrap::execute(args).await,
        Commands::Run(args) => run::execute(args, &config).await,
        Commands::Invoke(args) => invoke::execute(args, &config).await,
        Commands::Cleanup(args) => cleanup::execute(args, &config).await,
    };

    if let Err(e) = &result {
        output::print_error(&e.to_string());
    }
    Ok(result?)
}
