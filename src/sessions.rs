//! Session Registry
//!
//! Maps `(user, session)` to the SHA-256 fingerprint of the refresh token
//! issued for it. The raw token is never stored. All store failures
//! propagate (fail closed).

use crate::error::AuthError;
use crate::keys;
use crate::models::UserId;
use crate::store::KeyedStore;

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Hash a refresh token for storage
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fresh globally unique session identifier
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Server-side refresh token records
pub struct SessionRegistry {
    store: Arc<dyn KeyedStore>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn KeyedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Persist the fingerprint for a new session.
    ///
    /// Session IDs are unique; finding the key already taken is an internal
    /// error, never an overwrite.
    pub async fn create_session(
        &self,
        user_id: UserId,
        session_id: &str,
        refresh_token_hash: &str,
    ) -> Result<(), AuthError> {
        let key = keys::refresh_session(user_id, session_id);
        let created = self.store.set_nx_ex(&key, refresh_token_hash, self.ttl).await?;

        if !created {
            tracing::error!(user_id = %user_id, session_id = %session_id, "Session ID collision");
            return Err(AuthError::Internal);
        }

        tracing::debug!(user_id = %user_id, session_id = %session_id, "Session created");
        Ok(())
    }

    /// Check a presented refresh token against the stored fingerprint.
    ///
    /// A missing record and a mismatching one both yield `false`.
    pub async fn verify_session(
        &self,
        user_id: UserId,
        session_id: &str,
        presented_token: &str,
    ) -> Result<bool, AuthError> {
        let key = keys::refresh_session(user_id, session_id);
        let presented_hash = hash_refresh_token(presented_token);

        let Some(stored_hash) = self.store.get(&key).await? else {
            return Ok(false);
        };

        Ok(presented_hash.as_bytes().ct_eq(stored_hash.as_bytes()).into())
    }

    /// Replace `old_session_id` with `new_session_id`.
    ///
    /// The old record is claimed with a compare-and-delete on `old_hash`, so
    /// of two racing rotations of the same token only one gets `true`; the
    /// loser sees the session as gone. If the new record cannot be written
    /// after the claim, the old record is put back before the error is
    /// returned.
    pub async fn rotate_session(
        &self,
        user_id: UserId,
        old_session_id: &str,
        old_hash: &str,
        new_session_id: &str,
        new_hash: &str,
    ) -> Result<bool, AuthError> {
        let old_key = keys::refresh_session(user_id, old_session_id);

        if !self.store.del_if_eq(&old_key, old_hash).await? {
            tracing::warn!(
                user_id = %user_id,
                session_id = %old_session_id,
                "Rotation lost: session already rotated or revoked"
            );
            return Ok(false);
        }

        if let Err(err) = self.create_session(user_id, new_session_id, new_hash).await {
            // Restore with the full TTL; the refresh token's own expiry still bounds it.
            if let Err(restore_err) = self.store.set_ex(&old_key, old_hash, self.ttl).await {
                tracing::error!(
                    user_id = %user_id,
                    session_id = %old_session_id,
                    error = %restore_err,
                    "Failed to restore session after aborted rotation"
                );
            }
            return Err(err);
        }

        tracing::debug!(
            user_id = %user_id,
            old_session_id = %old_session_id,
            new_session_id = %new_session_id,
            "Session rotated"
        );
        Ok(true)
    }

    /// Delete a session record
    pub async fn revoke_session(&self, user_id: UserId, session_id: &str) -> Result<bool, AuthError> {
        let key = keys::refresh_session(user_id, session_id);
        let removed = self.store.del(&[key.as_str()]).await? > 0;

        tracing::debug!(user_id = %user_id, session_id = %session_id, removed, "Session revoked");
        Ok(removed)
    }
}
