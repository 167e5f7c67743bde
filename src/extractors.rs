//! Authentication Extractors
//!
//! Axum extractors for authentication and request metadata.

use crate::error::AuthError;
use crate::handlers::AuthState;
use crate::models::{AccessTokenClaims, UserId, UserRole};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use std::net::SocketAddr;

/// Authenticated user, taken from claims the bearer middleware verified
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn from_claims(claims: &AccessTokenClaims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email.clone(),
            role: claims.role,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessTokenClaims>()
            .map(AuthUser::from_claims)
            .ok_or(AuthError::InvalidToken)
    }
}

/// Client information (IP, user agent)
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
}

/// Resolve the client IP.
///
/// Forwarded headers are honored only when `trust_proxy` is set; otherwise
/// the socket peer address is used.
pub fn client_ip(parts: &Parts, trust_proxy: bool) -> String {
    let forwarded = || {
        parts
            .headers
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                parts
                    .headers
                    .get("X-Real-IP")
                    .and_then(|h| h.to_str().ok())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
    };

    trust_proxy
        .then(forwarded)
        .flatten()
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthState::from_ref(state);
        let ip = client_ip(parts, auth.config().trust_proxy);

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(String::from);

        Ok(ClientInfo { ip, user_agent })
    }
}

/// Value of the named cookie from the `Cookie` headers
pub fn get_cookie_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// The refresh cookie, if the request carries one
#[derive(Debug, Clone)]
pub struct RefreshCookie(pub Option<String>);

pub const REFRESH_COOKIE: &str = "refreshToken";

#[async_trait]
impl<S> FromRequestParts<S> for RefreshCookie
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RefreshCookie(get_cookie_value(parts, REFRESH_COOKIE)))
    }
}
