//! Rate Limiter
//!
//! Fixed-window request counters per scope and dimension. The first
//! increment in a window attaches the window TTL; a count above the limit
//! is denied with the counter's remaining TTL as the retry hint. Counters
//! are reset only by expiry, never by a successful request.
//!
//! Outage policy: fail OPEN. If the store cannot be reached the request is
//! allowed and a warning is logged.

use crate::config::RateLimitConfig;
use crate::error::{AuthError, StoreError};
use crate::keys::{self, Dimension, Scope};
use crate::store::KeyedStore;

use std::sync::Arc;
use std::time::Duration;

/// Result of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }

    /// Convert a denial into [`AuthError::RateLimited`]
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            RateDecision::Allowed => Ok(()),
            RateDecision::Denied { retry_after } => Err(AuthError::RateLimited {
                retry_after: retry_after.as_secs().max(1),
            }),
        }
    }
}

/// Request-volume throttle shared by login, signup and resend
pub struct RateLimiter {
    store: Arc<dyn KeyedStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyedStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn limit_for(&self, scope: Scope) -> u64 {
        match scope {
            Scope::Login => self.config.login_limit,
            Scope::Signup => self.config.signup_limit,
            Scope::Resend => self.config.resend_limit,
        }
    }

    /// Count one request against a single counter
    pub async fn check(&self, scope: Scope, dimension: Dimension, key: &str) -> RateDecision {
        match self.hit(scope, dimension, key).await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(
                    scope = %scope,
                    dimension = %dimension,
                    error = %err,
                    "Rate limiter unavailable, allowing request"
                );
                RateDecision::Allowed
            }
        }
    }

    /// Login is counted per IP and per normalized identity; either one over
    /// the limit denies.
    pub async fn check_login(&self, ip: &str, identity: &str) -> RateDecision {
        let normalized = keys::normalize_identity(identity);
        let by_ip = self.check(Scope::Login, Dimension::Ip, ip).await;
        let by_identity = self
            .check(Scope::Login, Dimension::Identity, &normalized)
            .await;
        longest_denial(by_ip, by_identity)
    }

    pub async fn check_signup(&self, ip: &str) -> RateDecision {
        self.check(Scope::Signup, Dimension::Ip, ip).await
    }

    pub async fn check_resend(&self, ip: &str) -> RateDecision {
        self.check(Scope::Resend, Dimension::Ip, ip).await
    }

    async fn hit(
        &self,
        scope: Scope,
        dimension: Dimension,
        key: &str,
    ) -> Result<RateDecision, StoreError> {
        let counter = keys::rate_counter(scope, dimension, key);
        let count = self.store.incr(&counter).await?;

        if count == 1 {
            self.store.expire(&counter, self.config.window).await?;
        }

        if count as u64 <= self.limit_for(scope) {
            return Ok(RateDecision::Allowed);
        }

        let retry_after = match self.store.ttl(&counter).await? {
            Some(remaining) => remaining,
            None => {
                // Counter lost its TTL (first expire never landed); start a fresh window.
                self.store.expire(&counter, self.config.window).await?;
                self.config.window
            }
        };

        tracing::info!(
            scope = %scope,
            dimension = %dimension,
            count,
            retry_after_secs = retry_after.as_secs(),
            "Rate limit exceeded"
        );
        Ok(RateDecision::Denied { retry_after })
    }
}

fn longest_denial(a: RateDecision, b: RateDecision) -> RateDecision {
    match (a, b) {
        (RateDecision::Denied { retry_after: x }, RateDecision::Denied { retry_after: y }) => {
            RateDecision::Denied {
                retry_after: x.max(y),
            }
        }
        (denied @ RateDecision::Denied { .. }, _) | (_, denied @ RateDecision::Denied { .. }) => {
            denied
        }
        _ => RateDecision::Allowed,
    }
}
