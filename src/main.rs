use anyhow::Result;
use clap::Parser;
use pbm_exporter::{config::Settings, metrics::MetricsCollector, server::start_server, source};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// PBM Exporter - Prometheus metrics exporter for Percona Backup for MongoDB
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Port to listen on, overriding the configured listen address port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        settings.override_port(port);
    }

    // Initialize logging
    init_logging(&settings.exporter.log_level)?;

    info!("Starting PBM Exporter v{}", env!("CARGO_PKG_VERSION"));
    info!("Status source: {:?}", settings.source.kind);
    info!("Listen address: {}", settings.exporter.listen_address);

    // Create metrics collector
    let collector = Arc::new(MetricsCollector::new(source::from_settings(&settings))?);
    info!("Metrics collector initialized");

    // Warm-up collection so a broken setup shows in the logs before the first scrape
    if let Err(e) = collector.collect().await {
        warn!("Initial metrics update failed: {}", e);
    }

    // Start HTTP server
    if let Err(e) = start_server(&settings.exporter.listen_address, collector).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server exited");
    Ok(())
}

/// Initialize structured logging with tracing.
fn init_logging(log_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
