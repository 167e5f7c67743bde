//! Test doubles shared by the unit tests

use crate::config::AuthConfig;
use crate::credentials::{Argon2Hasher, MemoryCredentialStore};
use crate::error::{AuthError, StoreError};
use crate::mail::MailSender;
use crate::service::AuthService;
use crate::store::{KeyedStore, MemoryStore};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Store whose every call fails as if the server were unreachable
pub struct DownStore;

fn refused() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl KeyedStore for DownStore {
    async fn incr(&self, _key: &str) -> Result<i64, StoreError> {
        Err(refused())
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool, StoreError> {
        Err(refused())
    }

    async fn ttl(&self, _key: &str) -> Result<Option<Duration>, StoreError> {
        Err(refused())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(refused())
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), StoreError> {
        Err(refused())
    }

    async fn set_nx_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool, StoreError> {
        Err(refused())
    }

    async fn get_del(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(refused())
    }

    async fn del_if_eq(&self, _key: &str, _expected: &str) -> Result<bool, StoreError> {
        Err(refused())
    }

    async fn del(&self, _keys: &[&str]) -> Result<u64, StoreError> {
        Err(refused())
    }

    async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
        Err(refused())
    }
}

/// In-memory store whose first `expire` call fails
pub struct FirstExpireFails {
    inner: MemoryStore,
    failed: AtomicBool,
}

impl FirstExpireFails {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl KeyedStore for FirstExpireFails {
    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.inner.incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(refused());
        }
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.inner.ttl(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.inner.set_ex(key, value, ttl).await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.set_nx_ex(key, value, ttl).await
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_del(key).await
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.inner.del_if_eq(key, expected).await
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, StoreError> {
        self.inner.del(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }
}

/// A captured verification mail
#[derive(Debug, Clone)]
pub struct SentMail {
    pub email: String,
    pub secret: String,
    pub name: String,
}

/// Records verification mails instead of sending them
#[derive(Default)]
pub struct RecordingMailSender {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailSender {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_secret(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|m| m.secret.clone())
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send_verification(&self, email: &str, secret: &str, name: &str) -> Result<(), AuthError> {
        self.sent.lock().unwrap().push(SentMail {
            email: email.to_string(),
            secret: secret.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }
}

/// Mail sender that always fails
pub struct FailingMailSender;

#[async_trait]
impl MailSender for FailingMailSender {
    async fn send_verification(&self, _email: &str, _secret: &str, _name: &str) -> Result<(), AuthError> {
        Err(AuthError::Internal)
    }
}

/// Config with valid secrets and cheap Argon2 parameters
pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::new("a".repeat(32), "b".repeat(32));
    config.argon2_memory_cost = 1024;
    config.argon2_time_cost = 1;
    config.argon2_parallelism = 1;
    config
}

pub fn build_service(
    config: AuthConfig,
    store: Arc<dyn KeyedStore>,
    mailer: Arc<dyn MailSender>,
) -> AuthService {
    let hasher = Argon2Hasher::from_config(&config).unwrap();
    let credentials = Arc::new(MemoryCredentialStore::new(hasher));
    AuthService::new(config, store, credentials, mailer)
}

pub fn test_service_with(store: Arc<dyn KeyedStore>, mailer: Arc<dyn MailSender>) -> AuthService {
    build_service(test_config(), store, mailer)
}

/// A service together with direct handles on its backing stores
pub struct TestHarness {
    pub auth: AuthService,
    pub store: Arc<MemoryStore>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub mail: Arc<RecordingMailSender>,
}

pub fn test_harness() -> TestHarness {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let credentials = Arc::new(MemoryCredentialStore::new(
        Argon2Hasher::from_config(&config).unwrap(),
    ));
    let mail = Arc::new(RecordingMailSender::default());
    let auth = AuthService::new(config, store.clone(), credentials.clone(), mail.clone());
    TestHarness {
        auth,
        store,
        credentials,
        mail,
    }
}

/// Service over a fresh in-memory store, plus the mailbox it sends to
pub fn test_service() -> (AuthService, Arc<RecordingMailSender>) {
    let mail = Arc::new(RecordingMailSender::default());
    let service = test_service_with(Arc::new(MemoryStore::new()), mail.clone());
    (service, mail)
}
