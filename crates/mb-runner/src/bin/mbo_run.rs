//! mbo-run
//!
//! Drive one model-based optimization run against a remote optimizer service.
//!
//! ```bash
//! mbo-run --workflow workflow.json --experiment-cmd './measure.sh'
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mb_optimizer::{DriverConfig, HttpOptimizerClient, OptimizationLoopDriver, OptimizerServiceConfig};
use mb_runner::CommandExperiment;
use mb_types::Workflow;

/// Optimize a workflow's knobs with a remote model-based optimizer
#[derive(Parser)]
#[command(name = "mbo-run")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the workflow definition (JSON)
    #[arg(short, long)]
    workflow: PathBuf,

    /// Shell command measuring one configuration; knobs arrive as MBO_KNOB_* variables
    #[arg(short = 'c', long)]
    experiment_cmd: String,

    /// Optimizer host (overrides MBO_OPTIMIZER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Optimizer port (overrides MBO_OPTIMIZER_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Per-request timeout in seconds (overrides MBO_OPTIMIZER_TIMEOUT_SECS)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Also consider initial-design measurements when picking the best point
    #[arg(long)]
    include_initial_design: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.workflow)
        .with_context(|| format!("Failed to read workflow: {}", cli.workflow.display()))?;
    let mut workflow: Workflow = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid workflow definition: {}", cli.workflow.display()))?;

    let mut config = OptimizerServiceConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(secs) = cli.timeout_secs {
        config.request_timeout_secs = Some(secs);
    }

    let client = HttpOptimizerClient::new(config)?;
    let runner = CommandExperiment::new(cli.experiment_cmd);
    let driver_config = DriverConfig {
        include_initial_design: cli.include_initial_design,
    };

    let mut driver = OptimizationLoopDriver::new(client, runner, driver_config);
    let best = driver
        .run(&mut workflow)
        .await
        .with_context(|| format!("Optimization of workflow {} failed", workflow.id))?;

    let summary = serde_json::json!({
        "id": workflow.id,
        "knobs": best.knobs,
        "value": best.value,
        "experiments": driver.status().experiments_run,
        "halted_early": driver.status().halted_early,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
