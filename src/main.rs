use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use telemetry_explorer::{
    cli::{execute_command, Commands},
    config::{Config, LogFormat},
    TelemetryClient, TraceExplorer,
};

/// Explore AI-usage telemetry: span search, trace trees, metrics and enrichment.
#[derive(Parser, Debug)]
#[command(name = "telemetry-explorer", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Telemetry explorer starting..."
    );

    let client = match TelemetryClient::new(
        &config.telemetry,
        config.request.clone(),
        config.cache.clone(),
    ) {
        Ok(c) => {
            info!(base_url = %config.telemetry.base_url, "Telemetry client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize telemetry client");
            return Err(e.into());
        }
    };

    let explorer = TraceExplorer::new(Arc::new(client));

    if let Err(e) = execute_command(cli.command, explorer, &config).await {
        error!(error = %e, "Command failed");
        return Err(e.into());
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
