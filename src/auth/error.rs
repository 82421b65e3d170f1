//! Authentication and authorization errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use super::password::PasswordError;
use super::token::TokenError;
use crate::storage::StorageError;

/// Every failure the auth core can surface to a caller
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Email and password are required")]
    MissingCredentials,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is locked due to too many failed login attempts")]
    AccountLocked,

    #[error("User account is not active")]
    AccountInactive,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session is not valid")]
    SessionInvalid,

    #[error("Session has expired")]
    SessionExpired,

    #[error("Invalid or expired token")]
    Token(#[source] TokenError),

    #[error("Authorization header is required")]
    MissingToken,

    #[error("Invalid authorization format")]
    InvalidAuthorizationFormat,

    #[error("Invalid token")]
    SubjectMismatch,

    #[error("User not found in context")]
    MissingIdentity,

    #[error("Access denied: insufficient permissions")]
    Forbidden,

    #[error("Password hashing failed: {0}")]
    Hashing(#[from] PasswordError),

    #[error("Token signing failed")]
    Signing,

    #[error("Internal failure: {0}")]
    Internal(&'static str),

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl AuthError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::DuplicateEmail => "DUPLICATE_EMAIL",
            AuthError::MissingCredentials => "MISSING_CREDENTIALS",
            AuthError::InvalidCredentials => "AUTH_FAILED",
            AuthError::AccountLocked => "ACCOUNT_LOCKED",
            AuthError::AccountInactive => "ACCOUNT_INACTIVE",
            AuthError::SessionNotFound => "SESSION_NOT_FOUND",
            AuthError::SessionInvalid => "SESSION_INVALID",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::Token(TokenError::Expired) => "TOKEN_EXPIRED",
            AuthError::Token(TokenError::SignatureInvalid) => "TOKEN_SIGNATURE_INVALID",
            AuthError::Token(_) => "TOKEN_MALFORMED",
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidAuthorizationFormat => "INVALID_AUTH_FORMAT",
            AuthError::SubjectMismatch => "INVALID_TOKEN",
            AuthError::MissingIdentity => "MISSING_IDENTITY",
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::Storage(e) if e.is_unavailable() => "SERVICE_UNAVAILABLE",
            AuthError::Hashing(_)
            | AuthError::Signing
            | AuthError::Internal(_)
            | AuthError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::DuplicateEmail | AuthError::MissingCredentials => {
                StatusCode::BAD_REQUEST
            }
            AuthError::InvalidCredentials
            | AuthError::AccountLocked
            | AuthError::AccountInactive
            | AuthError::SessionNotFound
            | AuthError::SessionInvalid
            | AuthError::SessionExpired
            | AuthError::Token(_)
            | AuthError::MissingToken
            | AuthError::InvalidAuthorizationFormat
            | AuthError::SubjectMismatch
            | AuthError::MissingIdentity => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Storage(e) if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Hashing(_)
            | AuthError::Signing
            | AuthError::Internal(_)
            | AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Dependency failures keep their detail in the logs only
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            if status == StatusCode::SERVICE_UNAVAILABLE {
                "Service temporarily unavailable".to_string()
            } else {
                "Internal error".to_string()
            }
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}
