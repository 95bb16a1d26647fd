//! Offer repository — read-only access to reference data owned by the
//! external offer subsystem.

use keystock_common::models::pool::Offer;
use sqlx::PgPool;
use uuid::Uuid;

/// Find an offer by ID.
pub async fn find_by_id(pool: &PgPool, offer_id: Uuid) -> Result<Option<Offer>, sqlx::Error> {
    sqlx::query_as::<_, Offer>("SELECT * FROM offers WHERE id = $1")
        .bind(offer_id)
        .fetch_optional(pool)
        .await
}
