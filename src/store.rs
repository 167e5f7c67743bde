//! Keyed Counter Store
//!
//! Interface to the shared key-value store holding all cross-request state:
//! counters, flags, session fingerprints and verification tickets. Every
//! operation is atomic per key, mirroring the Redis commands of the same
//! name, so concurrent requests for one identity never undercount.
//!
//! [`MemoryStore`] is a single-process implementation; [`TimeoutStore`]
//! bounds every call of an inner store.

use crate::error::StoreError;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Atomic keyed store with per-key TTL
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Increment the integer under `key`, creating it at zero without a TTL
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Attach a TTL to an existing key. Returns `false` when the key is absent
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining lifetime, `None` when the key is absent or has no TTL
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally store `value` with a TTL
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Store `value` only when `key` is absent. Returns whether it was written
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Atomically read and remove `key`
    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Remove `key` only while it still holds `expected`
    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Remove keys, returning how many existed
    async fn del(&self, keys: &[&str]) -> Result<u64, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process keyed store
///
/// A single mutex serializes every command, which gives the same per-key
/// atomicity a Redis server provides. Expired entries are dropped lazily.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn live<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match live(&mut entries, key, now) {
            Some(entry) => {
                let current: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| StoreError::Corrupt(key.to_string()))?;
                let next = current + 1;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        Ok(match live(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        Ok(live(&mut entries, key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key, now).map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if live(&mut entries, key, now).is_some() {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(entries
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let matches = live(&mut entries, key, now).is_some_and(|entry| entry.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(*key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key, now).is_some())
    }
}

/// Bounds every call of the wrapped store
///
/// A call that does not finish in time fails with [`StoreError::Timeout`].
/// The inner operation is dropped at that point, not cancelled on the server.
pub struct TimeoutStore {
    inner: Arc<dyn KeyedStore>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn KeyedStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>> + Send,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.limit, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.limit))?
    }
}

#[async_trait]
impl KeyedStore for TimeoutStore {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.bounded(self.inner.incr(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.bounded(self.inner.expire(key, ttl)).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.bounded(self.inner.ttl(key)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded(self.inner.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.bounded(self.inner.set_ex(key, value, ttl)).await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.bounded(self.inner.set_nx_ex(key, value, ttl)).await
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded(self.inner.get_del(key)).await
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.bounded(self.inner.del_if_eq(key, expected)).await
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, StoreError> {
        self.bounded(self.inner.del(keys)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.bounded(self.inner.exists(key)).await
    }
}
