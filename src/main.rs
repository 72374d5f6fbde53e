//! Boxoffice HTTP server.
//!
//! Wires the store, signing key, and collaborator services from
//! configuration and serves the API with graceful shutdown.

use boxoffice::config::{Config, StoreBackend};
use boxoffice::directory::{MemoryBlobStore, StaticEventDirectory, StaticIdentityProvider};
use boxoffice::issuer::{ReferenceSigner, TicketIssuer};
use boxoffice::server::{build_router, AppState};
use boxoffice::store::{MemoryStore, PostgresStore, Store};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting boxoffice server");

    let store: Arc<dyn Store> = match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => {
            info!(url = %config.store.database_url, "Connecting to PostgreSQL");
            let store = PostgresStore::connect(
                &config.store.database_url,
                config.store.max_connections,
            )
            .await?;
            store.migrate().await?;
            Arc::new(store)
        }
    };

    // Identity, events, and blob storage are application collaborators; this
    // binary wires the in-process implementations. A production deployment
    // substitutes its own providers here.
    let identity = Arc::new(StaticIdentityProvider::new());
    let directory = Arc::new(StaticEventDirectory::new());
    let blobs = Arc::new(MemoryBlobStore::new());

    let issuer = TicketIssuer::new(ReferenceSigner::new(&config.signing.ticket_secret));
    let state = AppState::new(store, identity, directory, blobs, issuer);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves when the process receives Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
