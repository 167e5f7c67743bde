//! Attempt Guard
//!
//! Brute-force lockout per identity, independent of request-volume
//! throttling:
//!
//! ```text
//! Clean ──record_failure──▶ Accumulating ──(count ≥ limit)──▶ Locked
//!   ▲                              │                             │
//!   └─────────── clear_failures ───┴─────────────────────────────┘
//! ```
//!
//! The failure counter expires `failure_window` after the first failure,
//! forgiving stale failures. The cooldown flag has its own TTL and is only
//! lifted by that TTL or by `clear_failures`.
//!
//! Outage policy: fail CLOSED. Store errors propagate to the caller.

use crate::config::LockoutConfig;
use crate::error::AuthError;
use crate::keys;
use crate::store::KeyedStore;

use std::sync::Arc;
use std::time::Duration;

/// Lockout state of one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Clean,
    Accumulating { failures: i64 },
    Locked,
}

/// Tracks consecutive credential failures
pub struct AttemptGuard {
    store: Arc<dyn KeyedStore>,
    config: LockoutConfig,
}

impl AttemptGuard {
    pub fn new(store: Arc<dyn KeyedStore>, config: LockoutConfig) -> Self {
        Self { store, config }
    }

    /// Count a failed login and trip the cooldown once the limit is reached
    pub async fn record_failure(&self, identity: &str) -> Result<AttemptState, AuthError> {
        let normalized = keys::normalize_identity(identity);
        let failures_key = keys::failures(&normalized);

        let failures = self.store.incr(&failures_key).await?;
        // A counter left without a TTL by an earlier failed expire gets one now
        if failures == 1 || self.store.ttl(&failures_key).await?.is_none() {
            self.store
                .expire(&failures_key, self.config.failure_window)
                .await?;
        }

        tracing::debug!(identity = %normalized, failures, "Failed login attempt recorded");

        if failures >= self.config.max_failures {
            self.store
                .set_ex(&keys::cooldown(&normalized), "1", self.config.cooldown)
                .await?;
            tracing::warn!(
                identity = %normalized,
                failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                "Login lockout triggered"
            );
            return Ok(AttemptState::Locked);
        }

        Ok(AttemptState::Accumulating { failures })
    }

    /// Forget all failures and lift any lockout
    pub async fn clear_failures(&self, identity: &str) -> Result<(), AuthError> {
        let normalized = keys::normalize_identity(identity);
        let failures_key = keys::failures(&normalized);
        let cooldown_key = keys::cooldown(&normalized);

        self.store
            .del(&[failures_key.as_str(), cooldown_key.as_str()])
            .await?;
        Ok(())
    }

    /// Whether the cooldown flag is set
    pub async fn is_blocked(&self, identity: &str) -> Result<bool, AuthError> {
        let normalized = keys::normalize_identity(identity);
        Ok(self.store.exists(&keys::cooldown(&normalized)).await?)
    }

    /// Time until the cooldown lifts, `None` when not locked
    pub async fn lockout_remaining(&self, identity: &str) -> Result<Option<Duration>, AuthError> {
        let normalized = keys::normalize_identity(identity);
        Ok(self.store.ttl(&keys::cooldown(&normalized)).await?)
    }

    pub async fn state(&self, identity: &str) -> Result<AttemptState, AuthError> {
        if self.is_blocked(identity).await? {
            return Ok(AttemptState::Locked);
        }

        let normalized = keys::normalize_identity(identity);
        let failures = self
            .store
            .get(&keys::failures(&normalized))
            .await?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);

        Ok(if failures == 0 {
            AttemptState::Clean
        } else {
            AttemptState::Accumulating { failures }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{DownStore, FirstExpireFails};

    fn guard() -> AttemptGuard {
        AttemptGuard::new(Arc::new(MemoryStore::new()), LockoutConfig::default())
    }

    #[tokio::test]
    async fn test_limit_failures_lock() {
        let guard = guard();
        for n in 1..5 {
            assert_eq!(
                guard.record_failure("b@x.com").await.unwrap(),
                AttemptState::Accumulating { failures: n }
            );
            assert!(!guard.is_blocked("b@x.com").await.unwrap());
        }

        assert_eq!(
            guard.record_failure("b@x.com").await.unwrap(),
            AttemptState::Locked
        );
        assert!(guard.is_blocked("b@x.com").await.unwrap());
        assert!(guard.is_blocked("B@X.COM").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_resets_both_counter_and_flag() {
        let guard = guard();
        for _ in 0..7 {
            guard.record_failure("b@x.com").await.unwrap();
        }

        guard.clear_failures("b@x.com").await.unwrap();
        assert!(!guard.is_blocked("b@x.com").await.unwrap());
        assert_eq!(guard.state("b@x.com").await.unwrap(), AttemptState::Clean);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockout_lifts_after_cooldown() {
        let guard = guard();
        for _ in 0..5 {
            guard.record_failure("b@x.com").await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert!(guard.is_blocked("b@x.com").await.unwrap());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!guard.is_blocked("b@x.com").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_failures_are_forgiven() {
        let guard = guard();
        for _ in 0..4 {
            guard.record_failure("c@x.com").await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(15 * 60)).await;
        assert_eq!(
            guard.record_failure("c@x.com").await.unwrap(),
            AttemptState::Accumulating { failures: 1 }
        );
        assert!(!guard.is_blocked("c@x.com").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockout_outlives_counter_independently() {
        let config = LockoutConfig {
            max_failures: 2,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(600),
        };
        let guard = AttemptGuard::new(Arc::new(MemoryStore::new()), config);
        guard.record_failure("d@x.com").await.unwrap();
        guard.record_failure("d@x.com").await.unwrap();

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(guard.is_blocked("d@x.com").await.unwrap());
        assert_eq!(
            guard.lockout_remaining("d@x.com").await.unwrap(),
            Some(Duration::from_secs(480))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_regains_window_after_failed_expire() {
        let guard = AttemptGuard::new(Arc::new(FirstExpireFails::new()), LockoutConfig::default());
        assert!(guard.record_failure("e@x.com").await.is_err());

        assert_eq!(
            guard.record_failure("e@x.com").await.unwrap(),
            AttemptState::Accumulating { failures: 2 }
        );
        let key = keys::failures(&keys::normalize_identity("e@x.com"));
        assert_eq!(
            guard.store.ttl(&key).await.unwrap(),
            Some(Duration::from_secs(15 * 60))
        );

        tokio::time::advance(Duration::from_secs(15 * 60)).await;
        assert_eq!(guard.state("e@x.com").await.unwrap(), AttemptState::Clean);
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed() {
        let guard = AttemptGuard::new(Arc::new(DownStore), LockoutConfig::default());
        assert!(matches!(
            guard.is_blocked("a@x.com").await,
            Err(AuthError::Store(_))
        ));
        assert!(guard.record_failure("a@x.com").await.is_err());
    }
}
