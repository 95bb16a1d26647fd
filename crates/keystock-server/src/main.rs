//! # Keystock Server
//!
//! Binary entry point for the key inventory engine: loads configuration,
//! connects to PostgreSQL, runs migrations, and serves the API.

use keystock_api::{build_router, AppState};
use keystock_common::cipher::Cipher;
use keystock_db::Database;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = keystock_common::config::init()?;

    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keystock=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .init();

    tracing::info!("Starting Keystock v{}", env!("CARGO_PKG_VERSION"));

    // Cipher first: a bad master key must fail startup, not the first request.
    let cipher = Arc::new(Cipher::new(&config.crypto.master_key)?);

    // Connect to PostgreSQL and run migrations
    let db = Database::connect(config).await?;
    db.migrate().await?;

    let state = AppState { db, cipher };
    let router = build_router(state);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Keystock API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
