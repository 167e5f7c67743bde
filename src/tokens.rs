//! Token Authority
//!
//! Issues and verifies the two signed token kinds. Access tokens are
//! stateless and short-lived; refresh tokens carry the session identity so
//! they can be checked against (and revoked through) the session registry.
//! Each kind is signed with its own secret.

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::models::{AccessTokenClaims, RefreshTokenClaims, TokenSubject};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

/// Signs and verifies access and refresh tokens
pub struct TokenAuthority {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
    audience: String,
}

impl TokenAuthority {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_ttl: Duration::seconds(config.access_token_expiration),
            refresh_ttl: Duration::seconds(config.refresh_token_expiration),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
        }
    }

    /// Access token lifetime in seconds
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Sign an access token expiring after the configured access lifetime
    pub fn issue_access_token(&self, subject: &TokenSubject) -> Result<String, AuthError> {
        self.issue_access_token_at(subject, Utc::now())
    }

    pub(crate) fn issue_access_token_at(
        &self,
        subject: &TokenSubject,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = AccessTokenClaims {
            sub: subject.user_id,
            email: subject.email.clone(),
            role: subject.role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        Ok(encode(&Header::default(), &claims, &self.access_encoding)?)
    }

    /// Sign a refresh token bound to `session_id` and the client IP.
    ///
    /// Returns the token and its expiry.
    pub fn issue_refresh_token(
        &self,
        subject: &TokenSubject,
        ip: &str,
        session_id: &str,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        self.issue_refresh_token_at(subject, ip, session_id, Utc::now())
    }

    pub(crate) fn issue_refresh_token_at(
        &self,
        subject: &TokenSubject,
        ip: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let expires_at = now + self.refresh_ttl;
        let claims = RefreshTokenClaims {
            sub: subject.user_id,
            email: subject.email.clone(),
            role: subject.role,
            ip: ip.to_string(),
            sid: session_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.refresh_encoding)?;
        Ok((token, expires_at))
    }

    /// Verify signature, issuer, audience and expiry of an access token.
    ///
    /// Every failure is reported as [`AuthError::InvalidToken`].
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let token_data = decode::<AccessTokenClaims>(token, &self.access_decoding, &self.validation())?;
        Ok(token_data.claims)
    }

    /// Verify a refresh token. Server-side session state is checked separately.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, AuthError> {
        let token_data =
            decode::<RefreshTokenClaims>(token, &self.refresh_decoding, &self.validation())?;
        Ok(token_data.claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        // Expiry is exact: a token is dead the second its lifetime ends.
        validation.leeway = 0;
        validation
    }
}
