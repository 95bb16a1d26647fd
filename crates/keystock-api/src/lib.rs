//! # keystock-api
//!
//! Service surface for the key inventory engine. Three route groups:
//!
//! - seller routes (pool management, key upload/list/edit/reveal/invalidate)
//!   behind the seller-context middleware,
//! - the public offer-availability route,
//! - fulfillment routes called by the order subsystem after payment.

pub mod middleware;
pub mod routes;

use axum::Router;
use keystock_common::cipher::Cipher;
use keystock_db::Database;
use std::sync::Arc;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Process-wide code cipher, keyed from the configured master secret.
    pub cipher: Arc<Cipher>,
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(routes::pools::router())
        .merge(routes::pools::public_router())
        .merge(routes::keys::router())
        .merge(routes::fulfillment::router());

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(routes::health::router())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .with_state(Arc::new(state))
}
