//! Pool management routes.
//!
//! POST /pools                            — Create the key pool for an offer
//! GET  /pools/{pool_id}                   — Get a pool
//! GET  /pools/{pool_id}/stats             — Per-status key counts
//! GET  /offers/{offer_id}/pool            — Resolve an offer's pool
//! GET  /offers/{offer_id}/availability    — Public stock signal (no seller context)

use axum::{
    extract::{Extension, Path, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use keystock_common::{
    error::{StockError, StockResult},
    models::pool::{CreatePoolRequest, DeliveryType, KeyPool, OfferAvailability, PoolStats},
};
use keystock_db::repository::{keys, offers, pools};
use std::sync::Arc;
use uuid::Uuid;

use crate::{middleware::SellerContext, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pools", post(create_pool))
        .route("/pools/{pool_id}", get(get_pool))
        .route("/pools/{pool_id}/stats", get(get_pool_stats))
        .route("/offers/{offer_id}/pool", get(get_pool_by_offer))
        .route_layer(middleware::from_fn(crate::middleware::seller_middleware))
}

/// Routes without seller context — buyer-facing catalog reads.
pub fn public_router() -> Router<Arc<AppState>> {
    Router::new().route("/offers/{offer_id}/availability", get(get_offer_availability))
}

/// Load a pool and verify the caller owns it.
///
/// Shared by every seller-scoped handler in this crate: absent pool is
/// NotFound, someone else's pool is Forbidden.
pub(crate) async fn owned_pool(
    state: &AppState,
    pool_id: Uuid,
    seller_id: Uuid,
) -> StockResult<KeyPool> {
    let pool = pools::find_by_id(&state.db.pg, pool_id)
        .await?
        .ok_or_else(|| StockError::not_found("Pool"))?;
    if pool.seller_id != seller_id {
        return Err(StockError::Forbidden);
    }
    Ok(pool)
}

// ============================================================
// POST /pools — Create the key pool for an offer
// ============================================================

async fn create_pool(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePoolRequest>,
) -> StockResult<Json<KeyPool>> {
    let offer = offers::find_by_id(&state.db.pg, body.offer_id)
        .await?
        .ok_or_else(|| StockError::not_found("Offer"))?;

    if offer.seller_id != seller.seller_id {
        return Err(StockError::Forbidden);
    }
    if offer.delivery_type != DeliveryType::DigitalKey {
        return Err(StockError::validation(
            "offer is not fulfilled by digital keys",
        ));
    }

    // The unique constraint on offer_id is the authoritative one-pool-per-
    // offer guard; a lost race surfaces here as Conflict.
    let pool = pools::create(&state.db.pg, offer.id, seller.seller_id)
        .await
        .map_err(|e| {
            if StockError::is_unique_violation(&e) {
                StockError::conflict("offer already has a key pool")
            } else {
                StockError::Database(e)
            }
        })?;

    tracing::info!(pool_id = %pool.id, offer_id = %offer.id, "key pool created");
    Ok(Json(pool))
}

// ============================================================
// GET /pools/{pool_id}
// ============================================================

async fn get_pool(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Path(pool_id): Path<Uuid>,
) -> StockResult<Json<KeyPool>> {
    let pool = owned_pool(&state, pool_id, seller.seller_id).await?;
    Ok(Json(pool))
}

// ============================================================
// GET /offers/{offer_id}/pool
// ============================================================

async fn get_pool_by_offer(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<Uuid>,
) -> StockResult<Json<KeyPool>> {
    let pool = pools::find_by_offer(&state.db.pg, offer_id)
        .await?
        .ok_or_else(|| StockError::not_found("Pool"))?;
    if pool.seller_id != seller.seller_id {
        return Err(StockError::Forbidden);
    }
    Ok(Json(pool))
}

// ============================================================
// GET /pools/{pool_id}/stats
// ============================================================

async fn get_pool_stats(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Path(pool_id): Path<Uuid>,
) -> StockResult<Json<PoolStats>> {
    let pool = owned_pool(&state, pool_id, seller.seller_id).await?;
    let stats = keys::count_by_status(&state.db.pg, pool.id).await?;
    Ok(Json(stats))
}

// ============================================================
// GET /offers/{offer_id}/availability — public
// ============================================================

async fn get_offer_availability(
    State(state): State<Arc<AppState>>,
    Path(offer_id): Path<Uuid>,
) -> StockResult<Json<OfferAvailability>> {
    let pool = pools::find_by_offer(&state.db.pg, offer_id).await?;

    let available = match pool {
        Some(ref pool) if pool.is_active => keys::count_available(&state.db.pg, pool.id).await?,
        // No pool yet, or deactivated: the offer simply has no stock.
        _ => 0,
    };

    Ok(Json(OfferAvailability::from_count(available)))
}
