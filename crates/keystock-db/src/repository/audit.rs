//! Audit log repository — append-only.
//!
//! No UPDATE or DELETE exists here on purpose. UPLOAD / EDIT / INVALIDATE
//! entries must be appended on the same transaction as the mutation they
//! document, so `append` takes `&mut PgConnection`.

use keystock_common::models::audit::{AuditAction, AuditEntry};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Append one audit entry.
pub async fn append(
    conn: &mut PgConnection,
    key_id: Uuid,
    pool_id: Uuid,
    seller_id: Uuid,
    action: AuditAction,
    metadata: Option<&serde_json::Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO key_audit_log (key_id, pool_id, seller_id, action, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(key_id)
    .bind(pool_id)
    .bind(seller_id)
    .bind(action)
    .bind(metadata)
    .execute(conn)
    .await?;
    Ok(())
}

/// Full trail for one key, oldest-first.
pub async fn list_for_key(pool: &PgPool, key_id: Uuid) -> Result<Vec<AuditEntry>, sqlx::Error> {
    sqlx::query_as::<_, AuditEntry>(
        "SELECT * FROM key_audit_log WHERE key_id = $1 ORDER BY created_at ASC",
    )
    .bind(key_id)
    .fetch_all(pool)
    .await
}
