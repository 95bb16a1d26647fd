//! Key pool repository.
//!
//! The one-pool-per-offer rule is enforced by the `offer_id` unique
//! constraint; callers map the violation to a Conflict rather than relying
//! on a racy check-then-insert.

use keystock_common::models::pool::KeyPool;
use sqlx::PgPool;
use uuid::Uuid;

/// Create a pool for an offer. Fails with a unique violation if the offer
/// already has one.
pub async fn create(
    pool: &PgPool,
    offer_id: Uuid,
    seller_id: Uuid,
) -> Result<KeyPool, sqlx::Error> {
    sqlx::query_as::<_, KeyPool>(
        r#"
        INSERT INTO key_pools (offer_id, seller_id)
        VALUES ($1, $2)
        RETURNING *
        "#,
    )
    .bind(offer_id)
    .bind(seller_id)
    .fetch_one(pool)
    .await
}

/// Find a pool by ID.
pub async fn find_by_id(pool: &PgPool, pool_id: Uuid) -> Result<Option<KeyPool>, sqlx::Error> {
    sqlx::query_as::<_, KeyPool>("SELECT * FROM key_pools WHERE id = $1")
        .bind(pool_id)
        .fetch_optional(pool)
        .await
}

/// Find the pool backing an offer.
pub async fn find_by_offer(pool: &PgPool, offer_id: Uuid) -> Result<Option<KeyPool>, sqlx::Error> {
    sqlx::query_as::<_, KeyPool>("SELECT * FROM key_pools WHERE offer_id = $1")
        .bind(offer_id)
        .fetch_optional(pool)
        .await
}
