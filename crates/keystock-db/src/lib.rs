//! # keystock-db
//!
//! Database layer for Keystock. All persistence is PostgreSQL via sqlx;
//! every piece of SQL in the engine lives under [`repository`], including
//! the concurrency-critical reservation query and the transactional
//! mutation + audit units.

pub mod postgres;
pub mod repository;

use anyhow::Result;
use sqlx::PgPool;

/// Shared database state passed through Axum extractors.
#[derive(Clone)]
pub struct Database {
    pub pg: PgPool,
}

impl Database {
    /// Connect to PostgreSQL.
    pub async fn connect(config: &keystock_common::config::AppConfig) -> Result<Self> {
        tracing::info!("Connecting to PostgreSQL...");
        let pg = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect(&config.database.url)
            .await?;
        tracing::info!("Connected to PostgreSQL");

        Ok(Self { pg })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pg).await?;
        tracing::info!("Migrations complete");
        Ok(())
    }
}
