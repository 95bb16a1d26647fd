//! Middleware — seller-context extraction.
//!
//! Authentication and team membership are resolved by the upstream
//! marketplace gateway; by the time a request reaches this engine the
//! caller's seller identity is carried in the `x-seller-id` header. The
//! middleware only turns that header into a typed extension — ownership
//! checks against pools happen per-handler.

use axum::{extract::Request, middleware::Next, response::Response};
use keystock_common::error::StockError;

/// Seller identity extracted from the `x-seller-id` header.
#[derive(Debug, Clone, Copy)]
pub struct SellerContext {
    pub seller_id: uuid::Uuid,
}

/// Extract and validate the seller id header.
pub async fn seller_middleware(mut request: Request, next: Next) -> Result<Response, StockError> {
    let header = request
        .headers()
        .get("x-seller-id")
        .and_then(|v| v.to_str().ok())
        .ok_or(StockError::Forbidden)?;

    let seller_id = header
        .parse::<uuid::Uuid>()
        .map_err(|_| StockError::Forbidden)?;

    // Insert seller context into request extensions for handlers to use
    request.extensions_mut().insert(SellerContext { seller_id });

    Ok(next.run(request).await)
}
