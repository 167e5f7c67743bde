//! Sentinel Authentication
//!
//! Credential and session security subsystem providing:
//! - Access and refresh JWTs signed with separate secrets
//! - Server-side refresh sessions with rotation on every refresh
//! - Single-use email verification tickets
//! - Per-IP and per-identity rate limiting
//! - Brute-force lockout per identity
//! - Argon2id password hashing
//!
//! All cross-request state lives in a [`KeyedStore`]; user records live in
//! a [`CredentialStore`].
//!
//! # Configuration
//!
//! Loaded from environment variables by [`AuthConfig::from_env`]:
//! - `ACCESS_TOKEN_SECRET` / `REFRESH_TOKEN_SECRET` - HS256 keys (required, min 32 chars, distinct)
//! - `JWT_ACCESS_EXPIRATION` - Access token lifetime in seconds (default: 900)
//! - `JWT_REFRESH_EXPIRATION` - Refresh token and session lifetime in seconds (default: 604800)
//! - `JWT_ISSUER` / `JWT_AUDIENCE` - (default: "sentinel-auth" / "sentinel-auth-users")
//! - `LOGIN_RATE_LIMIT` / `SIGNUP_RATE_LIMIT` / `RESEND_RATE_LIMIT` - per 15 minute window
//! - `MAX_LOGIN_ATTEMPTS` / `LOCKOUT_DURATION` - brute-force lockout
//! - `TRUST_PROXY` - read the client IP from forwarded headers (default: false)
//!
//! # Usage
//!
//! ```rust,ignore
//! use sentinel_auth::{Argon2Hasher, AuthConfig, AuthService, LogMailSender, MemoryStore, PgCredentialStore};
//!
//! let config = AuthConfig::from_env()?;
//! let credentials = PgCredentialStore::new(pool, Argon2Hasher::from_config(&config)?);
//! credentials.migrate().await?;
//!
//! let auth = Arc::new(AuthService::new(
//!     config.clone(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(credentials),
//!     Arc::new(LogMailSender::new(config.app_url.clone())),
//! ));
//! let app = sentinel_auth::create_routes(auth);
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod extractors;
pub mod guard;
pub mod handlers;
pub mod keys;
pub mod limiter;
pub mod mail;
pub mod middleware;
pub mod models;
pub mod service;
pub mod sessions;
pub mod store;
pub mod tickets;
pub mod tokens;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{AuthConfig, LockoutConfig, RateLimitConfig};
pub use credentials::{Argon2Hasher, CredentialStore, MemoryCredentialStore, PgCredentialStore};
pub use error::{AuthError, StoreError};
pub use extractors::{AuthUser, ClientInfo};
pub use guard::{AttemptGuard, AttemptState};
pub use handlers::{create_routes, AuthState};
pub use limiter::{RateDecision, RateLimiter};
pub use mail::{LogMailSender, MailSender};
pub use models::*;
pub use service::AuthService;
pub use sessions::SessionRegistry;
pub use store::{KeyedStore, MemoryStore, TimeoutStore};
pub use tickets::TicketStore;
pub use tokens::TokenAuthority;
