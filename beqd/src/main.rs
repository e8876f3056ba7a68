//! beqd - BEQ profile loader daemon
//!
//! Loads bass EQ correction profiles for the currently playing movie or
//! show into a DSP device via an ezbeq server, with codec substitution
//! fallback against the published BEQ catalogue.

use anyhow::{Context, Result};
use beqd::services::{CatalogCache, DeviceMonitor, DspClient, Orchestrator};
use beqd::state::SharedState;
use beqd::AppState;
use beqd_common::config::BeqdConfig;
use beqd_common::events::EventBus;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for beqd
#[derive(Parser, Debug)]
#[command(name = "beqd")]
#[command(about = "BEQ profile loader daemon")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "BEQD_PORT")]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long, env = "BEQD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BeqdConfig::load(args.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let port = args.port.unwrap_or(config.server.port);
    info!("Starting beqd on port {}", port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("DSP server: {}", config.device.base_url());
    info!("Catalogue: {}", config.catalog.url);

    let event_bus = EventBus::new(100);
    let shared = Arc::new(SharedState::new(event_bus));

    let dsp = Arc::new(
        DspClient::new(&config.device, &config.gains).context("Failed to build DSP client")?,
    );
    let catalog =
        Arc::new(CatalogCache::new(&config.catalog).context("Failed to build catalogue cache")?);
    let monitor = Arc::new(DeviceMonitor::new(dsp.clone(), shared.clone()));
    let orchestrator = Arc::new(Orchestrator::new(
        catalog,
        dsp,
        monitor.clone(),
        shared.clone(),
        config.substitution_rules.clone(),
    ));

    // First device snapshot, then the periodic refresh loop
    monitor.spawn_refresh();
    let refresh_secs = config.device.refresh_interval_secs;
    if refresh_secs > 0 {
        let monitor = monitor.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(refresh_secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                monitor.refresh().await;
            }
        });
    }

    let state = AppState::new(Arc::new(config), shared, orchestrator, monitor);
    let app = beqd::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
