//! Pulse signal engine - entry point.
//!
//! Reads snapshot, trade and inventory messages as JSON lines and writes one
//! fused market-making signal per processed snapshot.

use anyhow::Result;
use clap::Parser;
use pulse_bot::config::DEFAULT_CONFIG_PATH;
use tracing::info;

/// Market-making signal engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PULSE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Input path, `-` for stdin. Overrides the config file.
    #[arg(short, long)]
    input: Option<String>,

    /// Signal output path, `-` for stdout. Overrides the config file.
    #[arg(short, long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    pulse_telemetry::init_logging()?;

    info!("Starting pulse-bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > PULSE_CONFIG > default
    let config_path = args
        .config
        .or_else(|| std::env::var("PULSE_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!(config_path = %config_path, "Loading configuration");
    let mut config = pulse_bot::AppConfig::load(&config_path)?;
    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(output) = args.output {
        config.output = output;
    }
    info!(source = %config.source, pairs = config.pairs.len(), "Configuration loaded");

    let app = pulse_bot::Application::new(config)?;
    let summary = app.run().await?;

    info!(
        events = summary.events,
        rejected = summary.rejected,
        signals = summary.signals,
        pairs = summary.pairs,
        "Run complete"
    );
    Ok(())
}
