//! Seller-facing key routes — upload, list, edit, reveal, invalidate.
//!
//! POST  /pools/{pool_id}/keys                       — Bulk upload codes
//! GET   /pools/{pool_id}/keys                       — Masked listing, paginated
//! PATCH /pools/{pool_id}/keys/{key_id}              — Edit an unsold key's code
//! POST  /pools/{pool_id}/keys/{key_id}/reveal       — Decrypt and return the code
//! POST  /pools/{pool_id}/keys/{key_id}/invalidate   — Pull a key from sale
//! GET   /pools/{pool_id}/keys/{key_id}/audit        — Audit trail for one key

use axum::{
    extract::{Extension, Path, Query, State},
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use keystock_common::{
    config,
    error::{StockError, StockResult},
    models::audit::{AuditAction, AuditEntry},
    models::key::{
        mask_code, EditKeyRequest, KeyPage, ListKeysQuery, MaskedKey, ProductKey, RevealResponse,
        UploadKeysRequest, UploadReport,
    },
    validation::{merge_candidates, screen_candidates, validate_request},
};
use keystock_db::repository::{audit, keys};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::{middleware::SellerContext, routes::pools::owned_pool, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/pools/{pool_id}/keys",
            post(upload_keys).get(list_keys),
        )
        .route("/pools/{pool_id}/keys/{key_id}", patch(edit_key))
        .route("/pools/{pool_id}/keys/{key_id}/reveal", post(reveal_key))
        .route(
            "/pools/{pool_id}/keys/{key_id}/invalidate",
            post(invalidate_key),
        )
        .route("/pools/{pool_id}/keys/{key_id}/audit", get(get_key_audit))
        .route_layer(middleware::from_fn(crate::middleware::seller_middleware))
}

// ============================================================
// POST /pools/{pool_id}/keys — Bulk upload
// ============================================================

async fn upload_keys(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Path(pool_id): Path<Uuid>,
    Json(body): Json<UploadKeysRequest>,
) -> StockResult<Json<UploadReport>> {
    let pool = owned_pool(&state, pool_id, seller.seller_id).await?;
    let limits = &config::get().limits;

    let candidates = merge_candidates(&body.codes, body.raw_text.as_deref());
    if candidates.is_empty() {
        return Err(StockError::validation("no keys supplied"));
    }
    if candidates.len() > limits.max_codes_per_upload as usize {
        return Err(StockError::validation(format!(
            "at most {} codes per upload",
            limits.max_codes_per_upload
        )));
    }

    let mut batch = screen_candidates(candidates, limits.max_code_length as usize, |code| {
        state.cipher.hash(code)
    });

    // Cross-system duplicate pre-check. The unique constraint backstops any
    // insert that races past this window.
    let staged_hashes: Vec<String> = batch.staged.iter().map(|s| s.hash.clone()).collect();
    let existing: HashSet<String> = keys::existing_hashes(&state.db.pg, &staged_hashes)
        .await?
        .into_iter()
        .collect();

    let mut tx = state.db.pg.begin().await?;
    let mut added = 0usize;
    for staged in &batch.staged {
        if existing.contains(&staged.hash) {
            batch.duplicates += 1;
            continue;
        }
        let ciphertext = state.cipher.encrypt(&staged.code)?;
        match keys::insert_key(&mut tx, pool.id, &ciphertext, &staged.hash).await? {
            Some(key_id) => {
                audit::append(
                    &mut tx,
                    key_id,
                    pool.id,
                    seller.seller_id,
                    AuditAction::Upload,
                    None,
                )
                .await?;
                added += 1;
            }
            // Lost the uniqueness race after the pre-check: a duplicate,
            // never a batch failure.
            None => batch.duplicates += 1,
        }
    }
    tx.commit().await?;

    let report = UploadReport {
        added,
        duplicates: batch.duplicates,
        invalid: batch.invalid,
    };
    tracing::info!(
        pool_id = %pool.id,
        added = report.added,
        duplicates = report.duplicates,
        invalid = report.invalid,
        "key upload processed"
    );
    Ok(Json(report))
}

// ============================================================
// GET /pools/{pool_id}/keys — Masked listing
// ============================================================

async fn list_keys(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Path(pool_id): Path<Uuid>,
    Query(query): Query<ListKeysQuery>,
) -> StockResult<Json<KeyPage>> {
    let pool = owned_pool(&state, pool_id, seller.seller_id).await?;
    let limits = &config::get().limits;

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(limits.default_page_size)
        .clamp(1, limits.max_page_size);
    let offset = i64::from(page - 1) * i64::from(page_size);

    let total = keys::count_filtered(&state.db.pg, pool.id, query.status).await?;
    let rows = keys::list_page(
        &state.db.pg,
        pool.id,
        query.status,
        i64::from(page_size),
        offset,
    )
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(masked_item(&state, row)?);
    }

    Ok(Json(KeyPage {
        items,
        total,
        page,
        page_size,
    }))
}

fn masked_item(state: &AppState, key: ProductKey) -> StockResult<MaskedKey> {
    let plaintext = state.cipher.decrypt(&key.code_encrypted)?;
    Ok(MaskedKey {
        id: key.id,
        masked_code: mask_code(&plaintext),
        status: key.status,
        order_id: key.order_id,
        reserved_at: key.reserved_at,
        delivered_at: key.delivered_at,
        created_at: key.created_at,
    })
}

// ============================================================
// PATCH /pools/{pool_id}/keys/{key_id} — Edit
// ============================================================

async fn edit_key(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Path((pool_id, key_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<EditKeyRequest>,
) -> StockResult<()> {
    validate_request(&body)?;
    let pool = owned_pool(&state, pool_id, seller.seller_id).await?;
    let limits = &config::get().limits;

    let new_code = body.new_code.trim();
    if new_code.is_empty() || new_code.chars().count() > limits.max_code_length as usize {
        return Err(StockError::validation("code length out of bounds"));
    }
    let new_hash = state.cipher.hash(new_code);

    let mut tx = state.db.pg.begin().await?;
    let key = keys::lock_in_pool(&mut tx, pool.id, key_id)
        .await?
        .ok_or_else(|| StockError::not_found("Key"))?;

    if !key.is_editable() {
        return Err(StockError::invalid_state(
            "only an available key with no order can be edited",
        ));
    }

    // Editing a key to its own current code is an idempotent no-op.
    if key.code_hash == new_hash {
        tx.rollback().await?;
        return Ok(());
    }

    if keys::hash_exists(&mut tx, &new_hash).await? {
        return Err(StockError::conflict("code already exists elsewhere"));
    }

    let ciphertext = state.cipher.encrypt(new_code)?;
    keys::update_code(&mut tx, key.id, &ciphertext, &new_hash)
        .await
        .map_err(|e| {
            if StockError::is_unique_violation(&e) {
                StockError::conflict("code already exists elsewhere")
            } else {
                StockError::Database(e)
            }
        })?;

    let metadata = serde_json::json!({ "prior_hash": key.code_hash });
    audit::append(
        &mut tx,
        key.id,
        pool.id,
        seller.seller_id,
        AuditAction::Edit,
        Some(&metadata),
    )
    .await?;
    tx.commit().await?;

    Ok(())
}

// ============================================================
// POST /pools/{pool_id}/keys/{key_id}/reveal
// ============================================================

async fn reveal_key(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Path((pool_id, key_id)): Path<(Uuid, Uuid)>,
) -> StockResult<Json<RevealResponse>> {
    let pool = owned_pool(&state, pool_id, seller.seller_id).await?;
    let key = keys::find_in_pool(&state.db.pg, pool.id, key_id)
        .await?
        .ok_or_else(|| StockError::not_found("Key"))?;

    // The reveal request is the sensitive event: log it once the caller's
    // ownership of an existing key is established, whatever happens next.
    let metadata = serde_json::json!({ "status_at_request": key.status });
    let mut conn = state.db.pg.acquire().await?;
    audit::append(
        &mut conn,
        key.id,
        pool.id,
        seller.seller_id,
        AuditAction::Reveal,
        Some(&metadata),
    )
    .await?;
    drop(conn);

    if !key.status.allows_reveal() {
        return Err(StockError::invalid_state(
            "reserved and delivered keys cannot be revealed",
        ));
    }

    let code = state.cipher.decrypt(&key.code_encrypted)?;
    Ok(Json(RevealResponse { code }))
}

// ============================================================
// POST /pools/{pool_id}/keys/{key_id}/invalidate
// ============================================================

async fn invalidate_key(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Path((pool_id, key_id)): Path<(Uuid, Uuid)>,
) -> StockResult<()> {
    let pool = owned_pool(&state, pool_id, seller.seller_id).await?;

    let mut tx = state.db.pg.begin().await?;
    let key = keys::lock_in_pool(&mut tx, pool.id, key_id)
        .await?
        .ok_or_else(|| StockError::not_found("Key"))?;

    if !key.status.allows_invalidate() {
        use keystock_common::models::key::KeyStatus;
        let message = match key.status {
            KeyStatus::Reserved => "key is mid-fulfillment and cannot be invalidated",
            KeyStatus::Delivered => "key has been sold and cannot be invalidated",
            KeyStatus::Invalid => "key is already invalid",
            KeyStatus::Available => unreachable!("available keys are invalidatable"),
        };
        return Err(StockError::invalid_state(message));
    }

    keys::mark_invalid(&mut tx, key.id).await?;
    audit::append(
        &mut tx,
        key.id,
        pool.id,
        seller.seller_id,
        AuditAction::Invalidate,
        None,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(key_id = %key.id, pool_id = %pool.id, "key invalidated");
    Ok(())
}

// ============================================================
// GET /pools/{pool_id}/keys/{key_id}/audit
// ============================================================

async fn get_key_audit(
    Extension(seller): Extension<SellerContext>,
    State(state): State<Arc<AppState>>,
    Path((pool_id, key_id)): Path<(Uuid, Uuid)>,
) -> StockResult<Json<Vec<AuditEntry>>> {
    let pool = owned_pool(&state, pool_id, seller.seller_id).await?;
    let key = keys::find_in_pool(&state.db.pg, pool.id, key_id)
        .await?
        .ok_or_else(|| StockError::not_found("Key"))?;

    let entries = audit::list_for_key(&state.db.pg, key.id).await?;
    Ok(Json(entries))
}
