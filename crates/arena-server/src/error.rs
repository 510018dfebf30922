//! Engine error taxonomy
//!
//! Every error the engine surfaces to callers is typed here. Join failures
//! carry a stable `code` that clients display verbatim; settlement failures
//! are admin-facing and safe to retry because every multi-step operation is
//! CAS- or idempotency-marker-gated.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    // ========== Validation (rejected synchronously, no side effect) ==========
    #[error("team count out of bounds: {0}")]
    InvalidTeamCount(String),

    #[error("selection must star exactly one fixture")]
    InvalidStarSelection,

    #[error("user already joined this competition")]
    DuplicateJoin,

    #[error("{0}")]
    Validation(String),

    // ========== Conflicts (partial reservations compensated) ==========
    #[error("competition is at capacity")]
    CapacityExceeded,

    #[error("star fixture already taken in this competition")]
    StarFixtureTaken,

    #[error("competition already settled")]
    AlreadySettled,

    #[error("not all proof steps are verified")]
    NotAllProofsVerified,

    // ========== Funds ==========
    #[error("insufficient wallet balance")]
    InsufficientBalance,

    // ========== Access ==========
    #[error("authentication required: {0}")]
    Unauthorized(String),

    #[error("forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    // ========== Escalations ==========
    /// A compensating action failed after a partial reservation. Logged and
    /// audited for manual reconciliation, never retried silently.
    #[error("compensation failed, manual reconciliation required: {0}")]
    Corruption(String),

    /// Transient storage failure; the whole operation is safe to retry from
    /// the top.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable code, used verbatim by clients.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidTeamCount(_) => "invalid_team_count",
            EngineError::InvalidStarSelection => "invalid_star_selection",
            EngineError::DuplicateJoin => "duplicate_join",
            EngineError::Validation(_) => "validation_failed",
            EngineError::CapacityExceeded => "capacity_exceeded",
            EngineError::StarFixtureTaken => "star_fixture_taken",
            EngineError::AlreadySettled => "already_settled",
            EngineError::NotAllProofsVerified => "not_all_proofs_verified",
            EngineError::InsufficientBalance => "insufficient_balance",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::Forbidden => "forbidden",
            EngineError::NotFound(_) => "not_found",
            EngineError::Corruption(_) => "corruption_alert",
            EngineError::Storage(_) => "storage_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::InvalidTeamCount(_)
            | EngineError::InvalidStarSelection
            | EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::Forbidden => StatusCode::FORBIDDEN,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::DuplicateJoin
            | EngineError::CapacityExceeded
            | EngineError::StarFixtureTaken
            | EngineError::AlreadySettled
            | EngineError::NotAllProofsVerified => StatusCode::CONFLICT,
            EngineError::Corruption(_) | EngineError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(code = body.code, "{}", body.message);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_error_codes_are_stable() {
        assert_eq!(
            EngineError::InvalidTeamCount("min 3".into()).code(),
            "invalid_team_count"
        );
        assert_eq!(EngineError::CapacityExceeded.code(), "capacity_exceeded");
        assert_eq!(EngineError::StarFixtureTaken.code(), "star_fixture_taken");
        assert_eq!(
            EngineError::InsufficientBalance.code(),
            "insufficient_balance"
        );
        assert_eq!(EngineError::DuplicateJoin.code(), "duplicate_join");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            EngineError::InvalidStarSelection.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::InsufficientBalance.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(EngineError::CapacityExceeded.status(), StatusCode::CONFLICT);
        assert_eq!(
            EngineError::NotFound("competition".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::Corruption("orphaned star".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
