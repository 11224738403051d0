use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use logging::Config;
use stresstest::perform_stresstest;
use workloads::WorkloadsConfig;

mod logging;
mod stresstest;
mod workloads;

/// Command line interface parser.
#[derive(Parser)]
struct Cli {
    /// Path to the workload definition file.
    #[arg(long, short, value_name = "FILE")]
    workloads: PathBuf,

    /// Duration of the stresstest.
    #[arg(long, short, value_parser = humantime::parse_duration)]
    duration: Duration,

    /// Report metrics to a local statsd sink.
    #[arg(long)]
    metrics: bool,

    /// Emit JSON logs, which are swallowed like in production.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // parse configs
    let workloads_file =
        std::fs::File::open(cli.workloads).context("failed to open workloads file")?;
    let workloads: WorkloadsConfig =
        serde_yaml::from_reader(workloads_file).context("failed to parse workloads YAML")?;

    let logging_guard = logging::init(Config {
        json_logs: cli.json_logs,
        metrics: cli.metrics,
    })?;

    if let Some(udp_sink) = logging_guard.udp_sink {
        tokio::spawn(udp_sink);
    }

    perform_stresstest(workloads, cli.duration).await
}
