//! Authentication Middleware
//!
//! Bearer token validation for protected routes.

use crate::error::AuthError;
use crate::handlers::AuthState;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header_value: Option<&str>) -> Result<&str, AuthError> {
    header_value
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidToken)
}

/// Require authenticated user
///
/// Verifies the access token and stores its claims in request extensions
/// for the [`AuthUser`](crate::extractors::AuthUser) extractor.
pub async fn require_auth(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let claims = auth.authenticate(bearer_token(auth_header)?)?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
