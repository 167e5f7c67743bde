//! Authentication Configuration
//!
//! All configuration values are loaded from environment variables and handed
//! to each component's constructor. No process-wide defaults are consulted
//! after startup.

use crate::error::AuthError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Request-volume throttling settings shared by login, signup and resend
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Counter window (from RATE_LIMIT_WINDOW env var, seconds)
    pub window: Duration,

    /// Login requests per window, applied to both IP and identity (from LOGIN_RATE_LIMIT)
    pub login_limit: u64,

    /// Signup requests per IP per window (from SIGNUP_RATE_LIMIT)
    pub signup_limit: u64,

    /// Verification resend requests per IP per window (from RESEND_RATE_LIMIT)
    pub resend_limit: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            login_limit: 10,
            signup_limit: 5,
            resend_limit: 5,
        }
    }
}

/// Credential-failure lockout settings
#[derive(Debug, Clone)]
pub struct LockoutConfig {
    /// Failures before the cooldown flag is set (from MAX_LOGIN_ATTEMPTS)
    pub max_failures: i64,

    /// Lifetime of the failure counter, started at the first failure (from FAILURE_WINDOW)
    pub failure_window: Duration,

    /// Lifetime of the cooldown flag (from LOCKOUT_DURATION)
    pub cooldown: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            failure_window: Duration::from_secs(15 * 60),
            cooldown: Duration::from_secs(10 * 60),
        }
    }
}

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 key for access tokens (from ACCESS_TOKEN_SECRET env var)
    pub access_token_secret: String,

    /// HS256 key for refresh tokens (from REFRESH_TOKEN_SECRET env var)
    pub refresh_token_secret: String,

    /// Access token lifetime in seconds (from JWT_ACCESS_EXPIRATION env var)
    pub access_token_expiration: i64,

    /// Refresh token and session record lifetime in seconds (from JWT_REFRESH_EXPIRATION env var)
    pub refresh_token_expiration: i64,

    /// JWT issuer (from JWT_ISSUER env var)
    pub jwt_issuer: String,

    /// JWT audience (from JWT_AUDIENCE env var)
    pub jwt_audience: String,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,

    /// Verification ticket lifetime in seconds (from EMAIL_VERIFICATION_EXPIRATION env var)
    pub email_verification_expiration: i64,

    pub rate_limit: RateLimitConfig,

    pub lockout: LockoutConfig,

    /// Reject refreshes presented from a different IP than the one recorded
    /// at issuance (from REJECT_ON_IP_MISMATCH env var)
    pub reject_on_ip_mismatch: bool,

    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP` instead of the
    /// socket peer. Only safe behind a proxy that overwrites those headers
    /// (from TRUST_PROXY env var)
    pub trust_proxy: bool,

    /// Mark the refresh cookie `Secure` (from COOKIE_SECURE env var)
    pub cookie_secure: bool,

    /// Base URL used to build verification links (from APP_URL env var)
    pub app_url: String,

    /// Upper bound on each keyed store call (from STORE_TIMEOUT_MS env var)
    pub store_timeout: Duration,
}

impl AuthConfig {
    /// Build a configuration with default lifetimes and limits
    pub fn new(access_token_secret: impl Into<String>, refresh_token_secret: impl Into<String>) -> Self {
        Self {
            access_token_secret: access_token_secret.into(),
            refresh_token_secret: refresh_token_secret.into(),
            access_token_expiration: 900,     // 15 minutes
            refresh_token_expiration: 604800, // 7 days
            jwt_issuer: "sentinel-auth".to_string(),
            jwt_audience: "sentinel-auth-users".to_string(),
            argon2_memory_cost: 65536, // 64 MiB
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            email_verification_expiration: 86400, // 24 hours
            rate_limit: RateLimitConfig::default(),
            lockout: LockoutConfig::default(),
            reject_on_ip_mismatch: false,
            trust_proxy: false,
            cookie_secure: true,
            app_url: "http://localhost:3000".to_string(),
            store_timeout: Duration::from_millis(500),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AuthError> {
        let access_secret = env::var("ACCESS_TOKEN_SECRET").map_err(|_| {
            AuthError::Config("ACCESS_TOKEN_SECRET environment variable must be set".to_string())
        })?;
        let refresh_secret = env::var("REFRESH_TOKEN_SECRET").map_err(|_| {
            AuthError::Config("REFRESH_TOKEN_SECRET environment variable must be set".to_string())
        })?;

        let defaults = Self::new(access_secret, refresh_secret);

        Ok(Self {
            access_token_expiration: env_or("JWT_ACCESS_EXPIRATION", defaults.access_token_expiration),
            refresh_token_expiration: env_or(
                "JWT_REFRESH_EXPIRATION",
                defaults.refresh_token_expiration,
            ),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| defaults.jwt_issuer.clone()),
            jwt_audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| defaults.jwt_audience.clone()),
            argon2_memory_cost: env_or("ARGON2_MEMORY_COST", defaults.argon2_memory_cost),
            argon2_time_cost: env_or("ARGON2_TIME_COST", defaults.argon2_time_cost),
            argon2_parallelism: env_or("ARGON2_PARALLELISM", defaults.argon2_parallelism),
            email_verification_expiration: env_or(
                "EMAIL_VERIFICATION_EXPIRATION",
                defaults.email_verification_expiration,
            ),
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(env_or(
                    "RATE_LIMIT_WINDOW",
                    defaults.rate_limit.window.as_secs(),
                )),
                login_limit: env_or("LOGIN_RATE_LIMIT", defaults.rate_limit.login_limit),
                signup_limit: env_or("SIGNUP_RATE_LIMIT", defaults.rate_limit.signup_limit),
                resend_limit: env_or("RESEND_RATE_LIMIT", defaults.rate_limit.resend_limit),
            },
            lockout: LockoutConfig {
                max_failures: env_or("MAX_LOGIN_ATTEMPTS", defaults.lockout.max_failures),
                failure_window: Duration::from_secs(env_or(
                    "FAILURE_WINDOW",
                    defaults.lockout.failure_window.as_secs(),
                )),
                cooldown: Duration::from_secs(env_or(
                    "LOCKOUT_DURATION",
                    defaults.lockout.cooldown.as_secs(),
                )),
            },
            reject_on_ip_mismatch: env_flag("REJECT_ON_IP_MISMATCH", defaults.reject_on_ip_mismatch),
            trust_proxy: env_flag("TRUST_PROXY", defaults.trust_proxy),
            cookie_secure: env_flag("COOKIE_SECURE", defaults.cookie_secure),
            app_url: env::var("APP_URL").unwrap_or_else(|_| defaults.app_url.clone()),
            store_timeout: Duration::from_millis(env_or(
                "STORE_TIMEOUT_MS",
                defaults.store_timeout.as_millis() as u64,
            )),
            ..defaults
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_token_secret.len() < 32 || self.refresh_token_secret.len() < 32 {
            return Err(AuthError::Config(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must be at least 32 characters"
                    .to_string(),
            ));
        }

        if self.access_token_secret == self.refresh_token_secret {
            return Err(AuthError::Config(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ".to_string(),
            ));
        }

        if self.access_token_expiration <= 0 {
            return Err(AuthError::Config(
                "JWT_ACCESS_EXPIRATION must be positive".to_string(),
            ));
        }

        if self.refresh_token_expiration <= self.access_token_expiration {
            return Err(AuthError::Config(
                "JWT_REFRESH_EXPIRATION must be greater than JWT_ACCESS_EXPIRATION".to_string(),
            ));
        }

        if self.email_verification_expiration <= 0 {
            return Err(AuthError::Config(
                "EMAIL_VERIFICATION_EXPIRATION must be positive".to_string(),
            ));
        }

        if self.rate_limit.window.is_zero() || self.lockout.failure_window.is_zero() {
            return Err(AuthError::Config(
                "RATE_LIMIT_WINDOW and FAILURE_WINDOW must be positive".to_string(),
            ));
        }

        if self.lockout.max_failures < 1 || self.lockout.cooldown.is_zero() {
            return Err(AuthError::Config(
                "MAX_LOGIN_ATTEMPTS and LOCKOUT_DURATION must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Refresh token lifetime as a `Duration`
    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_expiration.max(0) as u64)
    }

    /// Verification ticket lifetime as a `Duration`
    pub fn verification_ttl(&self) -> Duration {
        Duration::from_secs(self.email_verification_expiration.max(0) as u64)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}
