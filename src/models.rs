//! Authentication Models
//!
//! Data structures for authentication requests, responses, token claims and
//! credential store records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Credential store user identifier
pub type UserId = i64;

// ============================================
// Credential Store Records
// ============================================

/// User role enum matching database type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User record as returned by the credential store (never carries the password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub verified: bool,
}

/// Account to create in the credential store
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

// ============================================
// Request DTOs
// ============================================

/// Registration request
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,

    #[serde(default)]
    #[validate(email(message = "A valid email is required"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Verification resend request
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ResendVerificationRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
}

/// `GET /verify-email?token=` query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}

// ============================================
// JWT Claims
// ============================================

/// Identity embedded in both token kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: UserId,
    pub email: String,
    pub role: UserRole,
}

impl From<&UserRecord> for TokenSubject {
    fn from(user: &UserRecord) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// JWT claims for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: UserId,
    pub email: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    /// JWT ID (unique identifier)
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn subject(&self) -> TokenSubject {
        TokenSubject {
            user_id: self.sub,
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// JWT claims for refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (user ID)
    pub sub: UserId,
    pub email: String,
    pub role: UserRole,
    /// Client IP recorded at issuance
    pub ip: String,
    /// Session ID (keys the server-side refresh record)
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub jti: String,
}

impl RefreshTokenClaims {
    pub fn subject(&self) -> TokenSubject {
        TokenSubject {
            user_id: self.sub,
            email: self.email.clone(),
            role: self.role,
        }
    }
}

// ============================================
// Sessions
// ============================================

/// A live login on one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub session_id: String,
    pub ip: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Everything a successful login, verification or refresh hands back
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub access_token: String,
    /// Delivered only through the refresh cookie
    pub refresh_token: String,
    pub session: Session,
    pub expires_in: i64,
}

/// Outcome of a login or email verification
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserRecord,
    pub grant: SessionGrant,
}

// ============================================
// Response DTOs
// ============================================

/// User response (public user data)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub is_verified: bool,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            is_verified: user.verified,
        }
    }
}

/// Access token body returned next to the refresh cookie
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl From<&SessionGrant> for TokenResponse {
    fn from(grant: &SessionGrant) -> Self {
        Self {
            access_token: grant.access_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: grant.expires_in,
        }
    }
}

/// Profile derived from a verified access token
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_id: UserId,
    pub email: String,
    pub role: UserRole,
}
