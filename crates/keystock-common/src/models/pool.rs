//! Key pool and offer reference models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================
// Offers (reference data)
// ============================================================

/// An offer as seen by the inventory engine.
///
/// Offers are owned by the external offer subsystem; the engine only reads
/// them to validate pool creation and to resolve offer → pool lookups.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Offer {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub delivery_type: DeliveryType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How an offer is fulfilled. Only `DigitalKey` offers carry a key pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    DigitalKey,
    Manual,
    Shipment,
}

// ============================================================
// Key pools
// ============================================================

/// A pool of redeemable codes backing exactly one offer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct KeyPool {
    pub id: Uuid,
    /// 1:1 with the offer — enforced by a unique constraint, not just code.
    pub offer_id: Uuid,
    pub seller_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================
// API Request / Response shapes
// ============================================================

/// Create a key pool for an offer the caller owns.
#[derive(Debug, Deserialize)]
pub struct CreatePoolRequest {
    pub offer_id: Uuid,
}

/// Per-status key counts for a pool — stock display and seller dashboards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub available: i64,
    pub reserved: i64,
    pub delivered: i64,
    pub invalid: i64,
    pub total: i64,
}

/// Public stock signal for an offer, seller-agnostic.
#[derive(Debug, Serialize)]
pub struct OfferAvailability {
    pub available_count: i64,
    pub availability: Availability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    OutOfStock,
}

impl OfferAvailability {
    pub fn from_count(available_count: i64) -> Self {
        let availability = if available_count > 0 {
            Availability::InStock
        } else {
            Availability::OutOfStock
        };
        Self {
            available_count,
            availability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_flips_on_zero() {
        assert_eq!(
            OfferAvailability::from_count(3).availability,
            Availability::InStock
        );
        assert_eq!(
            OfferAvailability::from_count(0).availability,
            Availability::OutOfStock
        );
    }
}
