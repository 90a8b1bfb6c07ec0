//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Teller not found: {0}")]
    TellerNotFound(String),

    #[error("Remittance not found: {0}")]
    RemittanceNotFound(String),

    #[error("Idempotency conflict: key already used")]
    IdempotencyConflict,

    #[error("Version conflict: concurrent modification detected")]
    VersionConflict,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<crate::event_store::EventStoreError> for AppError {
    fn from(err: crate::event_store::EventStoreError) -> Self {
        use crate::event_store::EventStoreError;
        match err {
            EventStoreError::ConcurrencyConflict { .. } | EventStoreError::MaxRetriesExceeded => {
                AppError::VersionConflict
            }
            EventStoreError::IdempotencyKeyExists(_) => AppError::IdempotencyConflict,
            EventStoreError::AggregateNotFound(id) => AppError::TellerNotFound(id.to_string()),
            EventStoreError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<crate::projection::ProjectionError> for AppError {
    fn from(err: crate::projection::ProjectionError) -> Self {
        use crate::projection::ProjectionError;
        match err {
            ProjectionError::TellerNotFound(id) => AppError::TellerNotFound(id.to_string()),
            ProjectionError::RemittanceNotFound(reference) => {
                AppError::RemittanceNotFound(reference)
            }
            ProjectionError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<crate::posting::PostingError> for AppError {
    fn from(err: crate::posting::PostingError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => {
                (StatusCode::UNAUTHORIZED, "invalid_api_key", None)
            }

            // 403 Forbidden
            AppError::PermissionDenied => {
                (StatusCode::FORBIDDEN, "permission_denied", None)
            }
            AppError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone()))
            }

            // 404 Not Found
            AppError::TellerNotFound(id) => {
                (StatusCode::NOT_FOUND, "teller_not_found", Some(id.clone()))
            }
            AppError::RemittanceNotFound(reference) => {
                (StatusCode::NOT_FOUND, "remittance_not_found", Some(reference.clone()))
            }

            // 409 Conflict
            AppError::IdempotencyConflict => {
                (StatusCode::CONFLICT, "idempotency_conflict", None)
            }
            AppError::VersionConflict => {
                (StatusCode::CONFLICT, "version_conflict", None)
            }

            // 429 Too Many Requests
            AppError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", None)
            }

            // 400 Missing Header
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::InsufficientTillCash { .. } => {
                        (StatusCode::BAD_REQUEST, "insufficient_till_cash", Some(domain_err.to_string()))
                    }
                    DomainError::InsufficientDenomination { .. } => {
                        (StatusCode::BAD_REQUEST, "insufficient_denomination", Some(domain_err.to_string()))
                    }
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                    DomainError::InvalidDenomination(face) => {
                        (StatusCode::BAD_REQUEST, "invalid_denomination", Some(face.to_string()))
                    }
                    DomainError::DrawerAmountMismatch { .. } => {
                        (StatusCode::BAD_REQUEST, "drawer_amount_mismatch", Some(domain_err.to_string()))
                    }
                    DomainError::InvalidStatusTransition { .. } => {
                        (StatusCode::CONFLICT, "invalid_status_transition", Some(domain_err.to_string()))
                    }
                    DomainError::AlreadyCollected => {
                        (StatusCode::CONFLICT, "already_collected", None)
                    }
                    DomainError::WrongPickupCode => {
                        (StatusCode::FORBIDDEN, "wrong_pickup_code", None)
                    }
                    DomainError::WrongPayingBranch => {
                        (StatusCode::FORBIDDEN, "wrong_paying_branch", None)
                    }
                    DomainError::WrongSourceBranch => {
                        (StatusCode::FORBIDDEN, "wrong_source_branch", None)
                    }
                    DomainError::SameBranchRemittance => {
                        (StatusCode::BAD_REQUEST, "same_branch_remittance", None)
                    }
                    DomainError::TellerClosed => {
                        (StatusCode::BAD_REQUEST, "teller_closed", None)
                    }
                    DomainError::TellerNotFound(id) => {
                        (StatusCode::NOT_FOUND, "teller_not_found", Some(id.clone()))
                    }
                    DomainError::RemittanceNotFound(reference) => {
                        (StatusCode::NOT_FOUND, "remittance_not_found", Some(reference.clone()))
                    }
                    DomainError::InvalidCommissionShares(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_commission_shares", Some(msg.clone()))
                    }
                    DomainError::BusinessRuleViolation(msg) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "business_rule_violation", Some(msg.clone()))
                    }
                    DomainError::VersionConflict { expected, found } => {
                        (StatusCode::CONFLICT, "version_conflict", Some(format!("expected {}, found {}", expected, found)))
                    }
                    DomainError::DuplicateOperation { key } => {
                        (StatusCode::CONFLICT, "duplicate_operation", Some(key.clone()))
                    }
                }
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
