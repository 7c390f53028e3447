mod api;
mod config;
mod error;
mod identity;
mod negotiator;
mod registrar;
mod registrar_handle;
mod services;
mod sessions;
mod store;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::types::RegistrarInfo;
use crate::config::{Config, StoreBackend};
use crate::negotiator::ProtocolNegotiator;
use crate::registrar::Registrar;
use crate::registrar_handle::RegistrarHandle;
use crate::store::db::SqliteStore;
use crate::store::memory::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("registrard=info"))
        )
        .init();

    tracing::info!("Starting registrard");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/registrard/registrard.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Build protocol negotiator from the configured versions
    let negotiator = ProtocolNegotiator::new(config.registrar.supported_protocols.iter().copied());
    let info = RegistrarInfo {
        supported_protocols: negotiator.supported(),
    };
    tracing::info!("Supported protocols: {:?}", info.supported_protocols);

    // Open the store and start the registrar thread
    let registrar = match config.store.backend {
        StoreBackend::Sqlite => {
            let db = Arc::new(SqliteStore::open(&config.store.db_path)?);
            tracing::info!("Opened database at {:?}", config.store.db_path);
            RegistrarHandle::spawn(Registrar::new(negotiator, db.clone(), db))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; registrations are lost on restart");
            let store = Arc::new(MemoryStore::new());
            RegistrarHandle::spawn(Registrar::new(negotiator, store.clone(), store))
        }
    };

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Build API router
    let app = api::routes::router(api::routes::AppState {
        registrar: registrar.clone(),
        info: Arc::new(info),
    });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for in-flight requests to drain
    let _ = server_handle.await;

    // Shutdown registrar thread
    if let Err(e) = registrar.shutdown().await {
        tracing::error!("Failed to shutdown registrar: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
