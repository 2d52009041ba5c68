//! Centralized error handling for VendCredit
//!
//! `CreditError` is the domain taxonomy every service returns. `ApiError` is the
//! HTTP envelope handlers return, with proper status code mapping and JSON
//! error bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Postgres SQLSTATE for unique_violation
const PG_UNIQUE_VIOLATION: &str = "23505";

/// Domain error taxonomy for the credit lifecycle and wallet ledger
#[derive(Error, Debug)]
pub enum CreditError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Idempotency guard tripped. Callers treat this as success.
    #[error("Duplicate transaction reference: {0}")]
    DuplicateTransaction(String),

    #[error("Insufficient funds in wallet {wallet_id}: balance {balance}, debit {amount}")]
    InsufficientFunds {
        wallet_id: uuid::Uuid,
        balance: i64,
        amount: i64,
    },

    #[error("No chargeable mandate for customer {customer_id} and business {business_id}")]
    MandateNotReady {
        customer_id: uuid::Uuid,
        business_id: uuid::Uuid,
    },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Timeouts and 5xx answers. Outcome unknown, retriable.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The request never reached the provider. Retriable, nothing happened.
    #[error("Provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("Provider rejected request ({status}): {message}")]
    ProviderRejected { status: u16, message: String },

    /// An invariant is broken. Never auto-repaired.
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl CreditError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CreditError::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CreditError::StateConflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CreditError::Validation(msg.into())
    }

    /// Whether the operation may succeed if retried later
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            CreditError::ProviderUnavailable(_)
                | CreditError::ProviderUnreachable(_)
                | CreditError::Database(_)
        )
    }

    /// Whether the provider may have acted on a request that did not answer
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, CreditError::ProviderUnavailable(_))
    }

    /// Whether a unique constraint rejected the write
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => db.code().as_deref() == Some(PG_UNIQUE_VIOLATION),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for CreditError {
    fn from(err: sqlx::Error) -> Self {
        if CreditError::is_unique_violation(&err) {
            return CreditError::StateConflict(err.to_string());
        }
        match err {
            sqlx::Error::RowNotFound => CreditError::NotFound("Resource not found".to_string()),
            _ => CreditError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for CreditError {
    fn from(err: validator::ValidationErrors) -> Self {
        CreditError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for CreditError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            return CreditError::ProviderUnreachable(err.to_string());
        }
        if err.is_timeout() {
            return CreditError::ProviderUnavailable(err.to_string());
        }
        match err.status() {
            Some(status) if status.is_server_error() => {
                CreditError::ProviderUnavailable(err.to_string())
            }
            Some(status) => CreditError::ProviderRejected {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => CreditError::ProviderUnavailable(err.to_string()),
        }
    }
}

/// Result type alias using CreditError
pub type CreditResult<T> = Result<T, CreditError>;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::UnprocessableEntity(_) => "UNPROCESSABLE_ENTITY",
            ApiError::TooManyRequests => "TOO_MANY_REQUESTS",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // Log server errors
        match &self {
            ApiError::InternalError(_)
            | ApiError::DatabaseError(_)
            | ApiError::ServiceUnavailable(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<CreditError> for ApiError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::Validation(m) => ApiError::ValidationError(m),
            CreditError::NotFound(m) => ApiError::NotFound(m),
            CreditError::StateConflict(m) => ApiError::Conflict(m),
            // Handlers normally intercept duplicates as success; if one leaks it is a conflict.
            CreditError::DuplicateTransaction(r) => {
                ApiError::Conflict(format!("Transaction {} already applied", r))
            }
            e @ CreditError::InsufficientFunds { .. } => {
                ApiError::UnprocessableEntity(e.to_string())
            }
            e @ CreditError::MandateNotReady { .. } => ApiError::Conflict(e.to_string()),
            CreditError::InvalidSignature => {
                ApiError::Unauthorized("Invalid webhook signature".to_string())
            }
            CreditError::ProviderUnavailable(m) | CreditError::ProviderUnreachable(m) => {
                ApiError::ServiceUnavailable(m)
            }
            e @ CreditError::ProviderRejected { .. } => ApiError::ExternalServiceError(e.to_string()),
            CreditError::IntegrityViolation(m) => ApiError::InternalError(m),
            CreditError::Database(m) => ApiError::DatabaseError(m),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        CreditError::from(err).into()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;
