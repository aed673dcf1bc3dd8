//! Stowage service binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use stowage_engine::Executor;
use stowage_server::{AppConfig, AppState, create_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stowage - a DAC bundle installation manager
#[derive(Parser, Debug)]
#[command(name = "stowaged")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "STOWAGE_CONFIG",
        default_value = "config/stowage.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Stowage v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars override everything)
    let mut figment = Figment::new();
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("STOWAGE_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Initialize the engine: directories, epoch sweep, catalog, first
    // maintenance pass.
    let executor = Arc::new(Executor::new());
    executor
        .configure(config.engine.clone())
        .await
        .context("failed to configure the installation engine")?;
    tracing::info!("Installation engine configured");

    // Mirror operationStatus notifications into the log.
    let mut events = executor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(
                handle = %event.handle,
                operation = event.operation.as_str(),
                id = %event.identity.id,
                version = %event.identity.version,
                status = event.status.as_str(),
                details = %event.details,
                "operationStatus"
            );
        }
    });

    let state = AppState::new(executor);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
