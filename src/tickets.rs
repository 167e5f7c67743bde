//! Verification Ticket Store
//!
//! Single-use email verification secrets. A ticket maps a 256-bit random
//! secret to a user ID; redeeming it removes it in the same store command.
//! Issuing a ticket replaces the user's previous outstanding one.

use crate::error::AuthError;
use crate::keys;
use crate::models::UserId;
use crate::store::KeyedStore;

use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;

const SECRET_BYTES: usize = 32;

/// Issues and redeems verification tickets
pub struct TicketStore {
    store: Arc<dyn KeyedStore>,
    ttl: Duration,
}

impl TicketStore {
    pub fn new(store: Arc<dyn KeyedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create a ticket for `user_id` and return its secret
    pub async fn issue_ticket(&self, user_id: UserId) -> Result<String, AuthError> {
        let secret = generate_secret();
        let user_key = keys::verification_user(user_id);

        if let Some(previous) = self.store.get_del(&user_key).await? {
            self.store
                .del(&[keys::verification_ticket(&previous).as_str()])
                .await?;
            tracing::debug!(user_id = %user_id, "Previous verification ticket invalidated");
        }

        self.store
            .set_ex(&keys::verification_ticket(&secret), &user_id.to_string(), self.ttl)
            .await?;
        self.store.set_ex(&user_key, &secret, self.ttl).await?;

        tracing::info!(user_id = %user_id, "Verification ticket issued");
        Ok(secret)
    }

    /// Redeem a ticket.
    ///
    /// Unknown, expired and already redeemed secrets all fail with
    /// [`AuthError::InvalidVerificationToken`].
    pub async fn consume_ticket(&self, secret: &str) -> Result<UserId, AuthError> {
        let value = self
            .store
            .get_del(&keys::verification_ticket(secret))
            .await?
            .ok_or(AuthError::InvalidVerificationToken)?;

        let user_id: UserId = value.parse().map_err(|_| {
            tracing::error!("Verification ticket holds a non-numeric user ID");
            AuthError::Internal
        })?;

        self.store
            .del_if_eq(&keys::verification_user(user_id), secret)
            .await?;

        tracing::info!(user_id = %user_id, "Verification ticket redeemed");
        Ok(user_id)
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
