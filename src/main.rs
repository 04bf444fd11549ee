//! `inference-bench` command line entry point.

use std::fs;
use std::path::PathBuf;

use clap::Parser;

use inference_bench::config::{read_config, BenchConfig};
use inference_bench::dispatch::TargetRate;
use inference_bench::lifecycle::signals::listen_for_ctrl_c;
use inference_bench::observability::{logging, metrics};
use inference_bench::{BenchmarkRunner, Shutdown};

#[derive(Parser)]
#[command(name = "inference-bench")]
#[command(about = "Latency benchmark for streaming LLM inference services", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the full report (summary and every record) as JSON.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Requests per second, or `unlimited`.
    #[arg(long)]
    rate: Option<TargetRate>,

    /// Number of requests to send.
    #[arg(long)]
    request_count: Option<u64>,

    /// Print the summary as JSON instead of the text report.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => BenchConfig::default(),
    };
    if let Some(rate) = cli.rate {
        config.load.rate = rate;
    }
    if let Some(count) = cli.request_count {
        config.load.request_count = Some(count);
    }

    if !logging::init_logging(&config.observability) {
        tracing::warn!("A global subscriber is already installed, logging settings ignored");
    }
    tracing::info!("inference-bench v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(address) = &config.observability.metrics_address {
        match address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    tracing::info!(
        base_url = %config.target.base_url,
        rate = %config.load.rate,
        request_count = ?config.load.request_count,
        span_store = config.span_store.enabled,
        "Configuration loaded"
    );

    let runner = BenchmarkRunner::new(config)?;

    let stop = Shutdown::new();
    let cancel = Shutdown::new();
    tokio::spawn(listen_for_ctrl_c(stop.clone(), cancel.clone()));

    let report = runner.run(stop.subscribe(), cancel).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
    } else {
        println!("{}", report.summary);
    }

    if let Some(path) = &cli.output {
        fs::write(path, serde_json::to_vec_pretty(&report)?)?;
        tracing::info!(path = %path.display(), records = report.records.len(), "Report written");
    }

    Ok(())
}
