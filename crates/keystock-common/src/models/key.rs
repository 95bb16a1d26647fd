//! Product key model, status state machine, and listing DTOs.
//!
//! A key moves through a small monotonic state machine:
//!
//! ```text
//! AVAILABLE --edit-------> AVAILABLE   (same status, new code)
//! AVAILABLE --reserve----> RESERVED    (order_id set, never cleared)
//! RESERVED  --deliver----> DELIVERED
//! AVAILABLE --invalidate-> INVALID
//! ```
//!
//! DELIVERED and INVALID are terminal; RESERVED's only successor is
//! DELIVERED. The predicates on [`KeyStatus`] encode which seller-facing
//! operations each state admits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Number of trailing plaintext characters left visible in masked listings.
const MASK_VISIBLE_SUFFIX: usize = 4;

// ============================================================
// Keys
// ============================================================

/// A stored redeemable code.
///
/// `code_encrypted` is the reversible ciphertext; `code_hash` the
/// deterministic digest, globally unique across all pools.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductKey {
    pub id: Uuid,
    pub pool_id: Uuid,
    pub code_encrypted: String,
    pub code_hash: String,
    pub status: KeyStatus,
    pub reserved_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Set once at reservation time; never cleared or reassigned.
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Available,
    Reserved,
    Delivered,
    Invalid,
}

impl KeyStatus {
    /// Editing is only possible while the code has not been promised to
    /// anyone. Callers must additionally check that no order_id is set.
    pub fn allows_edit(self) -> bool {
        matches!(self, Self::Available)
    }

    /// RESERVED keys are mid-fulfillment and DELIVERED keys are sold;
    /// neither can be retroactively invalidated. INVALID again fails too.
    pub fn allows_invalidate(self) -> bool {
        matches!(self, Self::Available)
    }

    /// Reveal is permitted for unsold stock and for forensics on
    /// invalidated keys. Never for in-flight or delivered keys, whose
    /// secret now belongs to a buyer (or is about to).
    pub fn allows_reveal(self) -> bool {
        matches!(self, Self::Available | Self::Invalid)
    }
}

impl ProductKey {
    /// True while the key is AVAILABLE and unassigned to any order.
    pub fn is_editable(&self) -> bool {
        self.status.allows_edit() && self.order_id.is_none()
    }
}

/// Mask a plaintext code for listings: only the last four characters stay
/// visible; codes of four characters or fewer are fully masked.
pub fn mask_code(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    if chars.len() <= MASK_VISIBLE_SUFFIX {
        return "****".to_string();
    }
    let suffix: String = chars[chars.len() - MASK_VISIBLE_SUFFIX..].iter().collect();
    format!("****{suffix}")
}

// ============================================================
// API Request / Response shapes
// ============================================================

/// Upload candidate codes — an explicit list, a raw text block, or both.
#[derive(Debug, Default, Deserialize)]
pub struct UploadKeysRequest {
    #[serde(default)]
    pub codes: Vec<String>,
    pub raw_text: Option<String>,
}

/// Outcome of one upload batch. Duplicate counts are best-effort under
/// truly parallel cross-pool ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub added: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

/// Listing query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListKeysQuery {
    pub status: Option<KeyStatus>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// One masked listing entry — the plaintext never leaves the server here.
#[derive(Debug, Serialize)]
pub struct MaskedKey {
    pub id: Uuid,
    pub masked_code: String,
    pub status: KeyStatus,
    pub order_id: Option<Uuid>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A page of masked keys, newest-first, with the total row count for the
/// applied filter.
#[derive(Debug, Serialize)]
pub struct KeyPage {
    pub items: Vec<MaskedKey>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

/// Replace the code of an unsold key.
#[derive(Debug, Deserialize, Validate)]
pub struct EditKeyRequest {
    #[validate(length(min = 1, message = "new_code must not be empty"))]
    pub new_code: String,
}

/// Decrypted code returned by an explicit reveal.
#[derive(Debug, Serialize)]
pub struct RevealResponse {
    pub code: String,
}

// ============================================================
// Fulfillment shapes (order subsystem surface)
// ============================================================

/// Claim the oldest available key of a pool for a paid order.
#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub pool_id: Uuid,
    pub order_id: Uuid,
}

/// `code` is `None` when the pool is out of stock — a normal outcome,
/// not an error.
#[derive(Debug, Serialize)]
pub struct ReserveResponse {
    pub code: Option<String>,
}

/// Confirm that a reserved key was actually handed to the buyer.
#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    pub key_id: Uuid,
    pub order_id: Uuid,
}

/// Buyer-side retrieval of an already-delivered code.
#[derive(Debug, Serialize)]
pub struct DeliveredKeyResponse {
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_short_codes_fully() {
        assert_eq!(mask_code(""), "****");
        assert_eq!(mask_code("AB"), "****");
        assert_eq!(mask_code("ABCD"), "****");
    }

    #[test]
    fn masking_keeps_last_four() {
        assert_eq!(mask_code("ABCDE"), "****BCDE");
        assert_eq!(mask_code("ABCDEFGH"), "****EFGH");
    }

    #[test]
    fn masking_is_char_based_not_byte_based() {
        assert_eq!(mask_code("ключ-αβγδ"), "****αβγδ");
    }

    #[test]
    fn status_predicates_follow_state_machine() {
        assert!(KeyStatus::Available.allows_edit());
        assert!(KeyStatus::Available.allows_invalidate());
        assert!(KeyStatus::Available.allows_reveal());

        assert!(!KeyStatus::Reserved.allows_edit());
        assert!(!KeyStatus::Reserved.allows_invalidate());
        assert!(!KeyStatus::Reserved.allows_reveal());

        assert!(!KeyStatus::Delivered.allows_edit());
        assert!(!KeyStatus::Delivered.allows_invalidate());
        assert!(!KeyStatus::Delivered.allows_reveal());

        assert!(!KeyStatus::Invalid.allows_edit());
        assert!(!KeyStatus::Invalid.allows_invalidate());
        assert!(KeyStatus::Invalid.allows_reveal(), "forensic reveal");
    }

    #[test]
    fn editability_requires_no_order() {
        let mut key = ProductKey {
            id: Uuid::new_v4(),
            pool_id: Uuid::new_v4(),
            code_encrypted: String::new(),
            code_hash: String::new(),
            status: KeyStatus::Available,
            reserved_at: None,
            delivered_at: None,
            order_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(key.is_editable());
        key.order_id = Some(Uuid::new_v4());
        assert!(!key.is_editable());
    }
}
