//! Centralized error types for Keystock.
//!
//! Uses `thiserror` for ergonomic error definitions and provides HTTP-friendly
//! error variants that can be directly converted to API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::cipher::CipherError;

/// Core application error type used across all Keystock services.
///
/// Out-of-stock is deliberately NOT a variant — reservation returns
/// `Option::None` for an empty pool, since an empty pool is a normal
/// business outcome rather than a fault.
#[derive(Debug, thiserror::Error)]
pub enum StockError {
    // === Resource errors ===
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Forbidden")]
    Forbidden,

    // === State machine errors ===
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    // === Uniqueness errors ===
    #[error("Conflict: {message}")]
    Conflict { message: String },

    // === Validation errors ===
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // === Infrastructure errors ===
    #[error("Cipher error: {0}")]
    Decryption(#[from] CipherError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body sent to clients.
#[derive(Serialize)]
struct ErrorResponse {
    code: u16,
    error: String,
    message: String,
}

impl StockError {
    /// Convenience constructor for NotFound.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Convenience constructor for InvalidState.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Convenience constructor for Conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Convenience constructor for Validation.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Map error to HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidState { .. } => StatusCode::CONFLICT,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Decryption(_) | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Error code string for programmatic handling by clients.
    pub fn error_code(&self) -> &str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Conflict { .. } => "CONFLICT",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Decryption(_) => "CIPHER_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True if this database error is a unique-constraint violation.
    ///
    /// Used by ingestion and edit paths, which must fold uniqueness races
    /// into duplicates / Conflict instead of failing the whole request.
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err.as_database_error().map(|db| db.kind()),
            Some(sqlx::error::ErrorKind::UniqueViolation)
        )
    }
}

impl IntoResponse for StockError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details to clients
        let message = match &self {
            StockError::Decryption(e) => {
                tracing::error!("Cipher error: {e}");
                "An internal error occurred".to_string()
            }
            StockError::Database(e) => {
                tracing::error!("Database error: {e}");
                "An internal error occurred".to_string()
            }
            StockError::Internal(e) => {
                tracing::error!("Internal error: {e}");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            code: status.as_u16(),
            error: self.error_code().to_string(),
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Convenience type alias for Results using StockError.
pub type StockResult<T> = Result<T, StockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_distinct_http_statuses() {
        assert_eq!(
            StockError::not_found("Pool").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(StockError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            StockError::invalid_state("key is reserved").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            StockError::conflict("code already exists").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            StockError::validation("no codes supplied").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn state_and_uniqueness_conflicts_stay_distinguishable() {
        // Both map to 409 but carry different machine-readable codes.
        assert_eq!(
            StockError::invalid_state("x").error_code(),
            "INVALID_STATE"
        );
        assert_eq!(StockError::conflict("x").error_code(), "CONFLICT");
    }
}
