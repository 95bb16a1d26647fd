//! Fulfillment routes — the internal surface called by the order subsystem.
//!
//! POST /fulfillment/reservations             — Claim the oldest available key
//! POST /fulfillment/deliveries               — Confirm a reserved key was handed over
//! GET  /fulfillment/orders/{order_id}/key    — Delivered code for an order
//!
//! Reservation and delivery confirmation are deliberately decoupled: a
//! crash between the two leaves the key RESERVED — recoverable by the
//! order system — never lost and never double-allocated.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use keystock_common::{
    error::{StockError, StockResult},
    models::key::{DeliverRequest, DeliveredKeyResponse, ReserveRequest, ReserveResponse},
};
use keystock_db::repository::{keys, pools};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/fulfillment/reservations", post(reserve_key))
        .route("/fulfillment/deliveries", post(deliver_key))
        .route("/fulfillment/orders/{order_id}/key", get(get_delivered_key))
}

// ============================================================
// POST /fulfillment/reservations
// ============================================================

async fn reserve_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReserveRequest>,
) -> StockResult<Json<ReserveResponse>> {
    // An unknown pool is a caller bug, distinct from an empty one.
    pools::find_by_id(&state.db.pg, body.pool_id)
        .await?
        .ok_or_else(|| StockError::not_found("Pool"))?;

    match keys::reserve_next(&state.db.pg, body.pool_id, body.order_id).await? {
        Some(key) => {
            let code = state.cipher.decrypt(&key.code_encrypted)?;
            tracing::debug!(key_id = %key.id, pool_id = %body.pool_id, "key reserved");
            Ok(Json(ReserveResponse { code: Some(code) }))
        }
        // Out of stock: a normal outcome, not an error.
        None => Ok(Json(ReserveResponse { code: None })),
    }
}

// ============================================================
// POST /fulfillment/deliveries
// ============================================================

async fn deliver_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeliverRequest>,
) -> StockResult<()> {
    if keys::confirm_delivery(&state.db.pg, body.key_id, body.order_id)
        .await?
        .is_some()
    {
        return Ok(());
    }

    // The guarded update matched nothing — tell the caller why.
    let key = keys::find_by_id(&state.db.pg, body.key_id)
        .await?
        .ok_or_else(|| StockError::not_found("Key"))?;
    if key.order_id != Some(body.order_id) {
        return Err(StockError::invalid_state(
            "key is not reserved for this order",
        ));
    }
    Err(StockError::invalid_state(
        "only a reserved key can be delivered",
    ))
}

// ============================================================
// GET /fulfillment/orders/{order_id}/key
// ============================================================

async fn get_delivered_key(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
) -> StockResult<Json<DeliveredKeyResponse>> {
    let code = match keys::find_delivered_by_order(&state.db.pg, order_id).await? {
        Some(key) => Some(state.cipher.decrypt(&key.code_encrypted)?),
        None => None,
    };
    Ok(Json(DeliveredKeyResponse { code }))
}
