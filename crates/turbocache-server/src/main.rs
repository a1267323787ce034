use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;

use turbocache_config::{Config, ConfigLoader};
use turbocache_observability::{init_tracing_with_config, LogConfig, LogFormat};
use turbocache_server::{create_router, serve, AppState, SHUTDOWN_GRACE};
use turbocache_storage::create_location;

/// Remote build-artifact cache server
#[derive(Parser, Debug)]
#[command(name = "turbocache-server", version, about)]
struct Args {
    /// Configuration file (TOML, YAML or JSON); environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = ConfigLoader::new()
        .load(args.config.as_deref())
        .await
        .context("invalid configuration")?;

    init_tracing_with_config(log_config(&config)?)?;
    tracing::info!("Server configuration: {:?}", config.server);

    let location = create_location(config.storage.provider, &config.storage.location_config())
        .await
        .context("failed to create storage location")?
        .with_timeout(config.server.backend_timeout());
    tracing::info!(
        "Storage backend: {} ({})",
        location.describe(),
        location.provider()
    );

    let state = AppState::from_config(&config.server, location).shared();
    let app = create_router(state);

    let bind_addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!(
        "Turbocache listening on {} (api {}, read-only: {})",
        bind_addr,
        config.server.api_version,
        config.server.read_only
    );
    tracing::info!("Press Ctrl+C to stop");

    serve(listener, app, shutdown_signal(), SHUTDOWN_GRACE).await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn log_config(config: &Config) -> Result<LogConfig> {
    let format = config.observability.log_format.parse::<LogFormat>()?;
    let mut log_config = LogConfig::new().with_format(format);
    if let Some(level) = &config.observability.log_level {
        log_config = log_config.with_level(level.as_str());
    }
    Ok(log_config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received, draining connections");
}
