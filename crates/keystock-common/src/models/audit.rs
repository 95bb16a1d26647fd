//! Audit trail models.
//!
//! Every sensitive action against a key leaves exactly one append-only
//! record. UPLOAD / EDIT / INVALIDATE entries are written inside the same
//! transaction as the mutation they document; REVEAL entries are written
//! unconditionally once the request is authorized, since showing a raw
//! secret is itself the loggable event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Upload,
    Edit,
    Reveal,
    Invalidate,
}

/// One immutable audit fact. Referenced by key for lookup, never for
/// ownership.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub key_id: Uuid,
    pub pool_id: Uuid,
    pub seller_id: Uuid,
    pub action: AuditAction,
    /// Action-specific context, e.g. `{"prior_hash": …}` on EDIT.
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
