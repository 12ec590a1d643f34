use std::path::PathBuf;

use clap::Parser;
use rover_gateway::config::GatewayConfig;
use rover_gateway::Gateway;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rover and gimbal control gateway
#[derive(Parser, Debug)]
#[command(name = "rover_gatewayd", about = "Rover/gimbal control and telemetry gateway")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera mode file, overrides the configured one
    #[arg(long)]
    mode_file: Option<PathBuf>,

    /// HTTP/WebSocket bind address, overrides the configured one
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rover_gateway=debug,devices=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Rover gateway starting...");

    // --- Configuration ---
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::defaults(),
    };
    if let Some(mode_file) = args.mode_file {
        config.mode_file = mode_file;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    tracing::debug!(?config, "Effective configuration");

    let mut gateway = Gateway::start(config).await?;
    tracing::info!("Gateway ready on {}", gateway.local_addr());

    // --- Graceful Shutdown ---
    shutdown_signal().await;
    tracing::info!("Shutdown signal received. Stopping services...");
    gateway.shutdown().await;
    tracing::info!("Rover gateway stopped gracefully.");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
