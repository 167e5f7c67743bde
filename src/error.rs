//! Authentication Error Types
//!
//! Centralized error handling for all authentication operations.
//! Security-sensitive variants carry deliberately uninformative messages.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;

/// Authentication errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many failed login attempts. Please try again later.")]
    AccountLocked,

    #[error("Please verify your email before logging in. Check your inbox for the verification link.")]
    EmailNotVerified,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Refresh token missing")]
    MissingRefreshToken,

    #[error("Invalid or expired verification token")]
    InvalidVerificationToken,

    #[error("Email already verified. You can login now!")]
    AlreadyVerified,

    #[error("User not found")]
    UserNotFound,

    #[error("Email already registered")]
    EmailExists,

    #[error("Too many requests. Try again later.")]
    RateLimited { retry_after: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// HTTP status this error surfaces as
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::InvalidVerificationToken
            | AuthError::AlreadyVerified => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::MissingRefreshToken => StatusCode::UNAUTHORIZED,
            AuthError::AccountLocked | AuthError::EmailNotVerified => StatusCode::FORBIDDEN,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::EmailExists => StatusCode::CONFLICT,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Store(_)
            | AuthError::Database(_)
            | AuthError::Config(_)
            | AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountLocked => "account_locked",
            AuthError::EmailNotVerified => "email_not_verified",
            AuthError::InvalidToken | AuthError::MissingRefreshToken => "invalid_token",
            AuthError::InvalidVerificationToken => "invalid_verification_token",
            AuthError::AlreadyVerified => "already_verified",
            AuthError::UserNotFound => "user_not_found",
            AuthError::EmailExists => "email_exists",
            AuthError::RateLimited { .. } => "rate_limited",
            AuthError::Validation(_) => "validation_error",
            AuthError::Store(_)
            | AuthError::Database(_)
            | AuthError::Config(_)
            | AuthError::Internal => "internal_error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::Validation(msg) => msg.clone(),
            AuthError::Store(_)
            | AuthError::Database(_)
            | AuthError::Config(_)
            | AuthError::Internal => "An internal error occurred".to_string(),
            _ => self.to_string(),
        };

        if let AuthError::RateLimited { retry_after } = &self {
            let retry_after = *retry_after;
            return (
                status,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(serde_json::json!({
                    "success": false,
                    "error": self.code(),
                    "message": message,
                    "retry_after_seconds": retry_after
                })),
            )
                .into_response();
        }

        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": self.code(),
                "message": message
            })),
        )
            .into_response()
    }
}

/// Keyed counter store failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("corrupt value under key {0}")]
    Corrupt(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Store error: {}", err);
        AuthError::Store(err.to_string())
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Internal
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!("JWT error: {:?}", err);
        AuthError::InvalidToken
    }
}
