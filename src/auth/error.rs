// Authentication and authorization error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, warn};

/// Authentication and authorization error types
///
/// Every failure the core can produce is a distinct variant so transport
/// layers map outcomes to status codes without inspecting messages.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Wrong secret, inactive account, or unknown identifier
    #[error("Invalid username/email or password")]
    InvalidCredentials,

    /// Too many consecutive failures; rejected until `until`
    #[error("Account is locked until {until}")]
    LockedOut { until: DateTime<Utc> },

    #[error("Username already exists")]
    UsernameConflict,

    #[error("Email already exists")]
    EmailConflict,

    /// Unknown, expired, or revoked refresh token
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// Identifier did not resolve to an account; converted to
    /// `InvalidCredentials` before it reaches a caller
    #[error("Account not found")]
    NotFound,

    /// The store failed while a rotation was being committed
    #[error("Refresh token rotation could not be completed")]
    PartialRotationFailure,

    /// The record store could not be reached or rejected the operation
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Missing authentication token")]
    MissingToken,

    /// Caller lacks the named role or permission
    #[error("Insufficient permissions: requires '{required}'")]
    InsufficientPermissions { required: String },

    #[error("Password hashing error")]
    PasswordHashError,

    #[error("Token generation error: {0}")]
    TokenGenerationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::StorageUnavailable(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AuthError::ValidationError(errors.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::StorageUnavailable(msg) => error!("Storage failure in auth: {}", msg),
            AuthError::PartialRotationFailure => error!("Refresh token rotation failed mid-commit"),
            AuthError::PasswordHashError => error!("Password hashing error"),
            AuthError::TokenGenerationError(msg) => error!("Token generation error: {}", msg),
            AuthError::ConfigError(msg) => error!("Authentication configuration error: {}", msg),
            AuthError::InvalidToken => warn!("Invalid token attempt"),
            AuthError::ExpiredToken => warn!("Expired token attempt"),
            AuthError::MissingToken => warn!("Missing token in request"),
            AuthError::InsufficientPermissions { required } => {
                warn!("Authorization failed: requires '{}'", required)
            }
            _ => {}
        }

        let status = self.status_code();
        let body = match &self {
            AuthError::LockedOut { until } => json!({
                "error": self.error_message(),
                "locked_until": until,
            }),
            _ => json!({
                "error": self.error_message(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::LockedOut { .. } => StatusCode::LOCKED,
            AuthError::UsernameConflict => StatusCode::CONFLICT,
            AuthError::EmailConflict => StatusCode::CONFLICT,
            AuthError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            AuthError::NotFound => StatusCode::UNAUTHORIZED,
            AuthError::PartialRotationFailure => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::ExpiredToken => StatusCode::UNAUTHORIZED,
            AuthError::MissingToken => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            AuthError::PasswordHashError => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::TokenGenerationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a descriptive error message for this error
    /// This message is safe to send to clients (no sensitive data)
    pub fn error_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials | AuthError::NotFound => {
                "Invalid username/email or password".to_string()
            }
            AuthError::LockedOut { until } => format!(
                "Account is locked due to too many failed login attempts. Try again after {}",
                until.to_rfc3339()
            ),
            AuthError::UsernameConflict => "Username already exists".to_string(),
            AuthError::EmailConflict => "Email already exists".to_string(),
            AuthError::InvalidRefreshToken => "Invalid refresh token".to_string(),
            AuthError::PartialRotationFailure | AuthError::StorageUnavailable(_) => {
                "Service temporarily unavailable, please retry".to_string()
            }
            AuthError::ValidationError(msg) => msg.clone(),
            AuthError::InvalidToken => "Invalid token".to_string(),
            AuthError::ExpiredToken => "Token has expired".to_string(),
            AuthError::MissingToken => "Missing authentication token".to_string(),
            AuthError::InsufficientPermissions { required } => {
                format!("Insufficient permissions: requires '{}'", required)
            }
            AuthError::PasswordHashError
            | AuthError::TokenGenerationError(_)
            | AuthError::ConfigError(_) => "Internal server error".to_string(),
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::StorageUnavailable(_) | AuthError::PartialRotationFailure
        )
    }
}
