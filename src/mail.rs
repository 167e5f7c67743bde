//! Verification mail delivery

use crate::error::AuthError;

use async_trait::async_trait;

/// Delivers verification links. Delivery is best-effort: the orchestrator
/// logs a failed send and carries on.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send_verification(&self, email: &str, secret: &str, name: &str) -> Result<(), AuthError>;
}

/// Link the user follows to redeem a verification ticket
pub fn verification_link(app_url: &str, secret: &str) -> String {
    format!("{}/verify-email?token={}", app_url.trim_end_matches('/'), secret)
}

pub fn render_verification_body(name: &str, link: &str) -> String {
    format!(
        "Hi {name},\n\n\
         Please confirm your email address by opening the link below:\n\n\
         {link}\n\n\
         The link expires in 24 hours. If you did not create an account, ignore this email.\n"
    )
}

/// Shortened form of a ticket secret, safe to write to logs
pub fn redact_secret(secret: &str) -> String {
    format!("{}...", secret.get(..8).unwrap_or(""))
}

/// Writes the verification mail to the log instead of sending it.
///
/// The secret in the logged link is redacted; a log reader cannot redeem it.
pub struct LogMailSender {
    app_url: String,
}

impl LogMailSender {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into(),
        }
    }
}

#[async_trait]
impl MailSender for LogMailSender {
    async fn send_verification(&self, email: &str, secret: &str, name: &str) -> Result<(), AuthError> {
        let link = verification_link(&self.app_url, &redact_secret(secret));
        tracing::info!(
            to = %email,
            body = %render_verification_body(name, &link),
            "Verification email"
        );
        Ok(())
    }
}
