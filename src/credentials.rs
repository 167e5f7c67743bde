//! Credential Store
//!
//! The user-record collaborator the orchestrator calls into. Passwords are
//! hashed with Argon2id by both implementations; callers only ever see
//! [`UserRecord`]s.

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::{NewUser, UserId, UserRecord};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// User record lookup, creation and verification
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_identity(&self, email: &str) -> Result<Option<UserRecord>, AuthError>;

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError>;

    /// Create an unverified account. Fails with [`AuthError::EmailExists`] on a duplicate.
    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, AuthError>;

    /// Return the user when `password` matches; `None` for an unknown email
    /// or a wrong password alike.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, AuthError>;

    /// Flag the account verified, returning the updated record or `None` if it no longer exists
    async fn mark_verified(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError>;
}

// ============================================
// Password Hashing
// ============================================

/// Argon2id hasher with configured cost parameters
#[derive(Clone)]
pub struct Argon2Hasher {
    params: Params,
    /// Hash of a random password under the same parameters, verified against
    /// when no account matches so a miss costs one full verification
    dummy_hash: String,
}

impl Argon2Hasher {
    pub fn new(memory_cost: u32, time_cost: u32, parallelism: u32) -> Result<Self, AuthError> {
        let params = Params::new(memory_cost, time_cost, parallelism, None)
            .map_err(|e| AuthError::Config(format!("invalid Argon2 parameters: {e}")))?;
        let mut hasher = Self {
            params,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(SaltString::generate(&mut OsRng).as_str())?;
        Ok(hasher)
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::new(
            config.argon2_memory_cost,
            config.argon2_time_cost,
            config.argon2_parallelism,
        )
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password using Argon2id
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .argon2()
            .hash_password(password.as_bytes(), &salt)?
            .to_string())
    }

    /// Verify a password against a PHC hash string
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::Internal)?;
        Ok(self
            .argon2()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Run a verification for an email with no account; always `false`
    pub fn verify_missing(&self, password: &str) -> Result<bool, AuthError> {
        self.verify(password, &self.dummy_hash)?;
        Ok(false)
    }
}

// ============================================
// Postgres
// ============================================

#[derive(FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: UserRecord,
    password_hash: String,
}

/// Credential store backed by the `users` table
pub struct PgCredentialStore {
    db: PgPool,
    hasher: Argon2Hasher,
}

impl PgCredentialStore {
    pub fn new(db: PgPool, hasher: Argon2Hasher) -> Self {
        Self { db, hasher }
    }

    /// Create the role type and users table if missing
    pub async fn migrate(&self) -> Result<(), AuthError> {
        tracing::info!("Running credential store migrations");

        sqlx::query(
            r#"
            DO $$ BEGIN
                CREATE TYPE user_role AS ENUM ('user', 'admin');
            EXCEPTION
                WHEN duplicate_object THEN null;
            END $$;
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role user_role NOT NULL DEFAULT 'user',
                verified BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&self.db)
        .await?;

        tracing::info!("Credential store migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_identity(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, role, verified FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, role, verified FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, AuthError> {
        let password_hash = self.hasher.hash(&new_user.password)?;

        let inserted = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, role, verified
            "#,
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&password_hash)
        .bind(new_user.role)
        .fetch_one(&self.db)
        .await;

        match inserted {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AuthError::EmailExists)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT id, name, email, role, verified, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            self.hasher.verify_missing(password)?;
            return Ok(None);
        };

        if self.hasher.verify(password, &row.password_hash)? {
            Ok(Some(row.user))
        } else {
            Ok(None)
        }
    }

    async fn mark_verified(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users SET verified = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, role, verified
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}

// ============================================
// In-memory
// ============================================

#[derive(Default)]
struct MemoryUsers {
    next_id: UserId,
    users: HashMap<UserId, (UserRecord, String)>,
}

/// Process-local credential store
pub struct MemoryCredentialStore {
    hasher: Argon2Hasher,
    inner: RwLock<MemoryUsers>,
}

impl MemoryCredentialStore {
    pub fn new(hasher: Argon2Hasher) -> Self {
        Self {
            hasher,
            inner: RwLock::new(MemoryUsers::default()),
        }
    }

    /// Remove an account, as an administrator deleting it mid-flow would
    pub async fn remove(&self, user_id: UserId) -> bool {
        self.inner.write().await.users.remove(&user_id).is_some()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_identity(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|(user, _)| user.email == email)
            .map(|(user, _)| user.clone()))
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&user_id).map(|(user, _)| user.clone()))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserRecord, AuthError> {
        let password_hash = self.hasher.hash(&new_user.password)?;
        let mut inner = self.inner.write().await;

        if inner.users.values().any(|(user, _)| user.email == new_user.email) {
            return Err(AuthError::EmailExists);
        }

        inner.next_id += 1;
        let user = UserRecord {
            id: inner.next_id,
            name: new_user.name,
            email: new_user.email,
            role: new_user.role,
            verified: false,
        };
        inner.users.insert(user.id, (user.clone(), password_hash));
        Ok(user)
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        let found = {
            let inner = self.inner.read().await;
            inner
                .users
                .values()
                .find(|(user, _)| user.email == email)
                .cloned()
        };

        match found {
            Some((user, hash)) if self.hasher.verify(password, &hash)? => Ok(Some(user)),
            Some(_) => Ok(None),
            None => {
                self.hasher.verify_missing(password)?;
                Ok(None)
            }
        }
    }

    async fn mark_verified(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(&user_id).map(|(user, _)| {
            user.verified = true;
            user.clone()
        }))
    }
}
