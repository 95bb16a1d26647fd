//! Product key repository — the authoritative state machine and
//! concurrency-safe allocator for stored codes.
//!
//! Multi-statement units (ingest batch, edit, invalidate) run inside a
//! caller-owned transaction, so those functions take `&mut PgConnection`.
//! Single-statement operations are atomic on their own and take `&PgPool`.

use keystock_common::models::key::{KeyStatus, ProductKey};
use keystock_common::models::pool::PoolStats;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

// ============================================================
// Ingestion
// ============================================================

/// Which of the given digests already exist anywhere in the store.
///
/// Pre-check for the upload path; the unique constraint remains the
/// authoritative guard for inserts that race past this.
pub async fn existing_hashes(
    pool: &PgPool,
    hashes: &[String],
) -> Result<Vec<String>, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct HashRow {
        code_hash: String,
    }
    let rows = sqlx::query_as::<_, HashRow>(
        "SELECT code_hash FROM product_keys WHERE code_hash = ANY($1)",
    )
    .bind(hashes)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.code_hash).collect())
}

/// Insert one staged key as AVAILABLE.
///
/// Returns the new key's id, or `None` if another insert won the uniqueness
/// race on `code_hash` in the meantime — the caller counts that as a
/// duplicate and keeps going; it never aborts the batch.
pub async fn insert_key(
    conn: &mut PgConnection,
    pool_id: Uuid,
    code_encrypted: &str,
    code_hash: &str,
) -> Result<Option<Uuid>, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct IdRow {
        id: Uuid,
    }
    let row = sqlx::query_as::<_, IdRow>(
        r#"
        INSERT INTO product_keys (pool_id, code_encrypted, code_hash)
        VALUES ($1, $2, $3)
        ON CONFLICT (code_hash) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(pool_id)
    .bind(code_encrypted)
    .bind(code_hash)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(|r| r.id))
}

// ============================================================
// Lookup
// ============================================================

/// Find a key within a pool.
pub async fn find_in_pool(
    pool: &PgPool,
    pool_id: Uuid,
    key_id: Uuid,
) -> Result<Option<ProductKey>, sqlx::Error> {
    sqlx::query_as::<_, ProductKey>(
        "SELECT * FROM product_keys WHERE id = $1 AND pool_id = $2",
    )
    .bind(key_id)
    .bind(pool_id)
    .fetch_optional(pool)
    .await
}

/// Find a key within a pool and lock its row for the current transaction.
pub async fn lock_in_pool(
    conn: &mut PgConnection,
    pool_id: Uuid,
    key_id: Uuid,
) -> Result<Option<ProductKey>, sqlx::Error> {
    sqlx::query_as::<_, ProductKey>(
        "SELECT * FROM product_keys WHERE id = $1 AND pool_id = $2 FOR UPDATE",
    )
    .bind(key_id)
    .bind(pool_id)
    .fetch_optional(conn)
    .await
}

/// Whether a digest exists anywhere in the store.
pub async fn hash_exists(conn: &mut PgConnection, code_hash: &str) -> Result<bool, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct ExistsRow {
        exists: bool,
    }
    let row = sqlx::query_as::<_, ExistsRow>(
        "SELECT EXISTS(SELECT 1 FROM product_keys WHERE code_hash = $1) AS exists",
    )
    .bind(code_hash)
    .fetch_one(conn)
    .await?;
    Ok(row.exists)
}

// ============================================================
// Mutations (tx-scoped)
// ============================================================

/// Replace a key's ciphertext and digest. Caller has already locked the row
/// and verified it is AVAILABLE with no order attached.
pub async fn update_code(
    conn: &mut PgConnection,
    key_id: Uuid,
    code_encrypted: &str,
    code_hash: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE product_keys
        SET code_encrypted = $2,
            code_hash = $3,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(key_id)
    .bind(code_encrypted)
    .bind(code_hash)
    .execute(conn)
    .await?;
    Ok(())
}

/// AVAILABLE → INVALID. Caller has locked the row and checked the state.
pub async fn mark_invalid(conn: &mut PgConnection, key_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE product_keys SET status = 'invalid', updated_at = NOW() WHERE id = $1",
    )
    .bind(key_id)
    .execute(conn)
    .await?;
    Ok(())
}

// ============================================================
// Reservation & delivery
// ============================================================

/// Claim the oldest AVAILABLE key of a pool for an order.
///
/// FIFO by (created_at, id). `FOR UPDATE SKIP LOCKED` makes concurrent
/// claimants step past rows another transaction is mid-claim on instead of
/// queueing behind them, so throughput scales with available rows and two
/// callers can never win the same key. Returns `None` when the pool has no
/// claimable AVAILABLE row — the out-of-stock signal.
pub async fn reserve_next(
    pool: &PgPool,
    pool_id: Uuid,
    order_id: Uuid,
) -> Result<Option<ProductKey>, sqlx::Error> {
    sqlx::query_as::<_, ProductKey>(
        r#"
        UPDATE product_keys
        SET status = 'reserved',
            reserved_at = NOW(),
            order_id = $2,
            updated_at = NOW()
        WHERE id = (
            SELECT id FROM product_keys
            WHERE pool_id = $1 AND status = 'available'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING *
        "#,
    )
    .bind(pool_id)
    .bind(order_id)
    .fetch_optional(pool)
    .await
}

/// RESERVED → DELIVERED for the key tied to this order.
///
/// The status/order guard lives in the WHERE clause, so the transition is
/// atomic; `None` means the key is not in a deliverable state for this
/// order (or does not exist — callers distinguish the two).
pub async fn confirm_delivery(
    pool: &PgPool,
    key_id: Uuid,
    order_id: Uuid,
) -> Result<Option<ProductKey>, sqlx::Error> {
    sqlx::query_as::<_, ProductKey>(
        r#"
        UPDATE product_keys
        SET status = 'delivered',
            delivered_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND order_id = $2 AND status = 'reserved'
        RETURNING *
        "#,
    )
    .bind(key_id)
    .bind(order_id)
    .fetch_optional(pool)
    .await
}

/// Find a key by bare ID — used to tell NotFound from InvalidState after a
/// guarded delivery update matched nothing.
pub async fn find_by_id(pool: &PgPool, key_id: Uuid) -> Result<Option<ProductKey>, sqlx::Error> {
    sqlx::query_as::<_, ProductKey>("SELECT * FROM product_keys WHERE id = $1")
        .bind(key_id)
        .fetch_optional(pool)
        .await
}

/// The DELIVERED key tied to an order, if any — buyer-side retrieval.
pub async fn find_delivered_by_order(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<Option<ProductKey>, sqlx::Error> {
    sqlx::query_as::<_, ProductKey>(
        "SELECT * FROM product_keys WHERE order_id = $1 AND status = 'delivered'",
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await
}

// ============================================================
// Listing & counts
// ============================================================

/// One page of a pool's keys, newest-first for stable pagination.
pub async fn list_page(
    pool: &PgPool,
    pool_id: Uuid,
    status: Option<KeyStatus>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ProductKey>, sqlx::Error> {
    if let Some(status) = status {
        sqlx::query_as::<_, ProductKey>(
            r#"
            SELECT * FROM product_keys
            WHERE pool_id = $1 AND status = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(pool_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    } else {
        sqlx::query_as::<_, ProductKey>(
            r#"
            SELECT * FROM product_keys
            WHERE pool_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(pool_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}

/// Total row count for the listing filter.
pub async fn count_filtered(
    pool: &PgPool,
    pool_id: Uuid,
    status: Option<KeyStatus>,
) -> Result<i64, sqlx::Error> {
    let row: (i64,) = if let Some(status) = status {
        sqlx::query_as("SELECT COUNT(*) FROM product_keys WHERE pool_id = $1 AND status = $2")
            .bind(pool_id)
            .bind(status)
            .fetch_one(pool)
            .await?
    } else {
        sqlx::query_as("SELECT COUNT(*) FROM product_keys WHERE pool_id = $1")
            .bind(pool_id)
            .fetch_one(pool)
            .await?
    };
    Ok(row.0)
}

/// Per-status counts plus total for a pool.
pub async fn count_by_status(pool: &PgPool, pool_id: Uuid) -> Result<PoolStats, sqlx::Error> {
    #[derive(sqlx::FromRow)]
    struct CountRow {
        status: KeyStatus,
        count: i64,
    }
    let rows = sqlx::query_as::<_, CountRow>(
        "SELECT status, COUNT(*) AS count FROM product_keys WHERE pool_id = $1 GROUP BY status",
    )
    .bind(pool_id)
    .fetch_all(pool)
    .await?;

    let mut stats = PoolStats::default();
    for row in rows {
        match row.status {
            KeyStatus::Available => stats.available = row.count,
            KeyStatus::Reserved => stats.reserved = row.count,
            KeyStatus::Delivered => stats.delivered = row.count,
            KeyStatus::Invalid => stats.invalid = row.count,
        }
        stats.total += row.count;
    }
    Ok(stats)
}

/// AVAILABLE count for a pool — the public stock signal.
pub async fn count_available(pool: &PgPool, pool_id: Uuid) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM product_keys WHERE pool_id = $1 AND status = 'available'",
    )
    .bind(pool_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}
