//! bamort-importer - Character import/export microservice
//!
//! Detects the format of uploaded character sheets, converts them through
//! external adapter services and stores the result with full provenance.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bamort_common::config::{self, CONFIG_ENV_VAR};
use bamort_importer::adapters::{AdapterRegistry, HttpAdapterClient};
use bamort_importer::config::ImporterSettings;
use bamort_importer::security::HostGuard;
use bamort_importer::AppState;

/// Command-line arguments for bamort-importer
#[derive(Parser, Debug)]
#[command(name = "bamort-importer")]
#[command(about = "Character import/export microservice for Bamort")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = config::load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let level = &toml_config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("bamort_importer={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting bamort-importer on port {}", toml_config.port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let settings = ImporterSettings::from_toml(&toml_config).context("Invalid configuration")?;

    let db_path = config::database_path(&toml_config);
    info!("Database: {}", db_path.display());
    let db = bamort_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let client = HttpAdapterClient::new(settings.transfer_timeout).context("Failed to build adapter HTTP client")?;
    if toml_config.security.allowed_adapter_hosts.is_empty() {
        warn!("No adapter host allow-list configured, every adapter will be rejected");
    }
    let registry = Arc::new(
        AdapterRegistry::new(Arc::new(client), settings.probe_timeout, settings.confidence_threshold)
            .with_host_guard(HostGuard::from_config(&toml_config.security)),
    );

    for endpoint in &toml_config.adapters {
        match registry.register_from_endpoint(&endpoint.id, &endpoint.base_url).await {
            Ok(()) => info!(adapter_id = %endpoint.id, base_url = %endpoint.base_url, "Adapter registered"),
            Err(e) => warn!(adapter_id = %endpoint.id, error = %e, "Adapter registration rejected"),
        }
    }
    info!("{} adapter(s) registered", registry.get_all().await.len());

    let health_checker = registry.start_health_checker(settings.health_interval);

    let state = AppState::new(db, registry, settings);
    let app = bamort_importer::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], toml_config.port));
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    health_checker.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
