//! Lightning assets server daemon.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Lightning assets server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via LAS_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before the price feed connects.
    las_feed::init_crypto();

    let args = Args::parse();

    las_telemetry::init_logging()?;

    info!("Starting lasd v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > LAS_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("LAS_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = las_server::AppConfig::from_file(&config_path)?;
    info!(
        percent_margin = %config.server.percent_margin,
        hedge_mode = ?config.hedge.mode,
        api_port = config.api.port,
        "Configuration loaded"
    );

    let app = las_server::Application::new(config)?;
    app.run().await?;

    Ok(())
}
