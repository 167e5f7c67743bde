//! Authentication HTTP Handlers
//!
//! REST API endpoints for the authentication flows. The access token is
//! returned in the body; the refresh token only ever travels in the
//! `refreshToken` cookie.

use crate::error::AuthError;
use crate::extractors::{AuthUser, ClientInfo, RefreshCookie, REFRESH_COOKIE};
use crate::middleware;
use crate::models::*;
use crate::service::AuthService;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

/// Shared auth service state
pub type AuthState = Arc<AuthService>;

// ============================================
// Route Builder
// ============================================

/// Create authentication routes
pub fn create_routes(auth_service: Arc<AuthService>) -> Router {
    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", get(refresh))
        .route("/verify-email", get(verify_email))
        .route("/resend-verification", post(resend_verification))
        .route("/logout", post(logout));

    let protected = Router::new()
        .route("/profile", get(profile))
        .layer(axum_middleware::from_fn_with_state(
            auth_service.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(auth_service)
}

// ============================================
// Cookies
// ============================================

/// `Set-Cookie` value carrying a refresh token
pub fn refresh_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{REFRESH_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the refresh cookie
pub fn clear_refresh_cookie(secure: bool) -> String {
    refresh_cookie("", 0, secure)
}

fn grant_cookie(auth: &AuthService, grant: &SessionGrant) -> String {
    let config = auth.config();
    refresh_cookie(
        &grant.refresh_token,
        config.refresh_token_expiration,
        config.cookie_secure,
    )
}

fn login_body(message: &str, outcome: LoginOutcome) -> serde_json::Value {
    let token = TokenResponse::from(&outcome.grant);
    serde_json::json!({
        "success": true,
        "message": message,
        "data": {
            "user": UserResponse::from(outcome.user),
            "accessToken": token.access_token,
            "tokenType": token.token_type,
            "expiresIn": token.expires_in
        }
    })
}

// ============================================
// Registration
// ============================================

/// POST /register
pub async fn register(
    State(auth): State<AuthState>,
    ClientInfo { ip, .. }: ClientInfo,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let user = auth.register(req, &ip).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "User registered successfully. Please check your email to verify your account.",
            "data": { "user": UserResponse::from(user) }
        })),
    ))
}

// ============================================
// Login / Logout
// ============================================

/// POST /login
pub async fn login(
    State(auth): State<AuthState>,
    ClientInfo { ip, user_agent }: ClientInfo,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let outcome = auth.login(req, &ip).await?;

    tracing::debug!(
        user_id = %outcome.user.id,
        user_agent = user_agent.as_deref().unwrap_or("-"),
        "Login response issued"
    );

    let cookie = grant_cookie(&auth, &outcome.grant);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(login_body("Login successful", outcome)),
    ))
}

/// POST /logout
///
/// Always clears the refresh cookie.
pub async fn logout(
    State(auth): State<AuthState>,
    RefreshCookie(token): RefreshCookie,
) -> Result<impl IntoResponse, AuthError> {
    auth.logout(token.as_deref()).await?;

    Ok((
        [(header::SET_COOKIE, clear_refresh_cookie(auth.config().cookie_secure))],
        Json(serde_json::json!({
            "success": true,
            "message": "Logged out successfully"
        })),
    ))
}

// ============================================
// Token Refresh
// ============================================

/// GET /refresh
pub async fn refresh(
    State(auth): State<AuthState>,
    ClientInfo { ip, .. }: ClientInfo,
    RefreshCookie(token): RefreshCookie,
) -> Result<impl IntoResponse, AuthError> {
    let grant = auth.refresh(token.as_deref(), &ip).await?;

    let cookie = grant_cookie(&auth, &grant);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({
            "success": true,
            "message": "Token refreshed",
            "data": TokenResponse::from(&grant)
        })),
    ))
}

// ============================================
// Email Verification
// ============================================

/// GET /verify-email?token=
pub async fn verify_email(
    State(auth): State<AuthState>,
    ClientInfo { ip, .. }: ClientInfo,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<impl IntoResponse, AuthError> {
    let outcome = auth.verify_email(query.token.as_deref(), &ip).await?;

    let cookie = grant_cookie(&auth, &outcome.grant);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(login_body("Email verified successfully", outcome)),
    ))
}

/// POST /resend-verification
pub async fn resend_verification(
    State(auth): State<AuthState>,
    ClientInfo { ip, .. }: ClientInfo,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<impl IntoResponse, AuthError> {
    auth.resend_verification(req, &ip).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "If an unverified account with that email exists, a verification email has been sent."
    })))
}

// ============================================
// User Profile
// ============================================

/// GET /profile
pub async fn profile(user: AuthUser) -> Result<impl IntoResponse, AuthError> {
    Ok(Json(serde_json::json!({
        "success": true,
        "data": ProfileResponse {
            user_id: user.id,
            email: user.email,
            role: user.role,
        }
    })))
}
