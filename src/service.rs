//! Authentication Service
//!
//! Orchestrates the credential store, token authority, session registry,
//! ticket store, rate limiter and attempt guard into the public flows:
//! register, login, verify-email, refresh, resend-verification and logout.

use crate::config::AuthConfig;
use crate::credentials::CredentialStore;
use crate::error::AuthError;
use crate::guard::{AttemptGuard, AttemptState};
use crate::keys;
use crate::limiter::RateLimiter;
use crate::mail::MailSender;
use crate::models::*;
use crate::sessions::{hash_refresh_token, new_session_id, SessionRegistry};
use crate::store::{KeyedStore, TimeoutStore};
use crate::tickets::TicketStore;
use crate::tokens::TokenAuthority;

use std::sync::Arc;
use validator::Validate;

/// Authentication service
pub struct AuthService {
    config: AuthConfig,
    tokens: TokenAuthority,
    sessions: SessionRegistry,
    tickets: TicketStore,
    limiter: RateLimiter,
    guard: AttemptGuard,
    credentials: Arc<dyn CredentialStore>,
    mailer: Arc<dyn MailSender>,
}

impl AuthService {
    /// Create a new authentication service.
    ///
    /// Every store call is bounded by `config.store_timeout`.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn KeyedStore>,
        credentials: Arc<dyn CredentialStore>,
        mailer: Arc<dyn MailSender>,
    ) -> Self {
        let store: Arc<dyn KeyedStore> = Arc::new(TimeoutStore::new(store, config.store_timeout));

        Self {
            tokens: TokenAuthority::new(&config),
            sessions: SessionRegistry::new(store.clone(), config.refresh_ttl()),
            tickets: TicketStore::new(store.clone(), config.verification_ttl()),
            limiter: RateLimiter::new(store.clone(), config.rate_limit.clone()),
            guard: AttemptGuard::new(store, config.lockout.clone()),
            credentials,
            mailer,
            config,
        }
    }

    /// Get reference to config
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    // ============================================
    // Registration
    // ============================================

    /// Create an unverified account and send its verification link.
    ///
    /// The signup limit is charged before the request is validated, so
    /// malformed requests count too.
    pub async fn register(&self, req: RegisterRequest, ip: &str) -> Result<UserRecord, AuthError> {
        self.limiter.check_signup(ip).await.into_result()?;

        req.validate()
            .map_err(|e| AuthError::Validation(e.to_string()))?;

        let user = self
            .credentials
            .create_user(NewUser {
                name: req.name.trim().to_string(),
                email: keys::canonical_email(&req.email),
                password: req.password,
                role: UserRole::User,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");

        let secret = self.tickets.issue_ticket(user.id).await?;
        self.deliver_verification(&user, &secret).await;

        Ok(user)
    }

    // ============================================
    // Login
    // ============================================

    /// Authenticate with email and password and open a new session
    pub async fn login(&self, req: LoginRequest, ip: &str) -> Result<LoginOutcome, AuthError> {
        req.validate()
            .map_err(|e| AuthError::Validation(e.to_string()))?;

        let email = keys::canonical_email(&req.email);

        self.limiter.check_login(ip, &email).await.into_result()?;

        if self.guard.is_blocked(&email).await? {
            tracing::warn!(identity = %keys::normalize_identity(&email), ip = %ip, "Login attempt while locked out");
            return Err(AuthError::AccountLocked);
        }

        let Some(user) = self
            .credentials
            .verify_credentials(&email, &req.password)
            .await?
        else {
            let locked = self.guard.record_failure(&email).await? == AttemptState::Locked;
            tracing::info!(ip = %ip, locked, "Login failed: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        };

        self.guard.clear_failures(&email).await?;

        if !user.verified {
            tracing::info!(user_id = %user.id, "Login refused: email not verified");
            return Err(AuthError::EmailNotVerified);
        }

        let grant = self.open_session(&user, ip).await?;

        tracing::info!(user_id = %user.id, session_id = %grant.session.session_id, ip = %ip, "User logged in");

        Ok(LoginOutcome { user, grant })
    }

    // ============================================
    // Email Verification
    // ============================================

    /// Redeem a verification ticket, mark the account verified and log the
    /// user straight in.
    ///
    /// A valid ticket held by an account that is already verified still logs
    /// the user in; the ticket is consumed either way.
    pub async fn verify_email(&self, token: Option<&str>, ip: &str) -> Result<LoginOutcome, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::Validation("Verification token is required".to_string()))?;

        let user_id = self.tickets.consume_ticket(token).await?;

        let user = self
            .credentials
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let user = if user.verified {
            tracing::debug!(user_id = %user.id, "Ticket redeemed by an already verified account");
            user
        } else {
            let user = self
                .credentials
                .mark_verified(user_id)
                .await?
                .ok_or(AuthError::UserNotFound)?;
            tracing::info!(user_id = %user.id, "Email verified");
            user
        };

        let grant = self.open_session(&user, ip).await?;
        Ok(LoginOutcome { user, grant })
    }

    /// Issue a fresh ticket, replacing any outstanding one.
    ///
    /// An unknown email reports success without sending anything.
    pub async fn resend_verification(
        &self,
        req: ResendVerificationRequest,
        ip: &str,
    ) -> Result<(), AuthError> {
        self.limiter.check_resend(ip).await.into_result()?;

        req.validate()
            .map_err(|e| AuthError::Validation(e.to_string()))?;

        let email = keys::canonical_email(&req.email);

        let Some(user) = self.credentials.find_by_identity(&email).await? else {
            tracing::debug!(ip = %ip, "Verification resend for unknown email");
            return Ok(());
        };

        if user.verified {
            return Err(AuthError::AlreadyVerified);
        }

        let secret = self.tickets.issue_ticket(user.id).await?;
        self.deliver_verification(&user, &secret).await;
        Ok(())
    }

    async fn deliver_verification(&self, user: &UserRecord, secret: &str) {
        if let Err(err) = self
            .mailer
            .send_verification(&user.email, secret, &user.name)
            .await
        {
            tracing::error!(user_id = %user.id, error = %err, "Failed to send verification email");
        }
    }

    // ============================================
    // Token Refresh
    // ============================================

    /// Exchange a refresh token for a new access token and a rotated
    /// refresh token. The presented token is dead afterwards.
    pub async fn refresh(&self, refresh_token: Option<&str>, ip: &str) -> Result<SessionGrant, AuthError> {
        let presented = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingRefreshToken)?;

        let claims = self.tokens.verify_refresh_token(presented)?;

        if claims.ip != ip {
            tracing::warn!(
                user_id = %claims.sub,
                session_id = %claims.sid,
                issued_ip = %claims.ip,
                ip = %ip,
                "Refresh from a different IP than the session was issued to"
            );
            if self.config.reject_on_ip_mismatch {
                return Err(AuthError::InvalidToken);
            }
        }

        if !self
            .sessions
            .verify_session(claims.sub, &claims.sid, presented)
            .await?
        {
            tracing::warn!(
                user_id = %claims.sub,
                session_id = %claims.sid,
                "Refresh token not recognized for session"
            );
            return Err(AuthError::InvalidToken);
        }

        let subject = claims.subject();
        let access_token = self.tokens.issue_access_token(&subject)?;
        let session_id = new_session_id();
        let (refresh_token, expires_at) = self
            .tokens
            .issue_refresh_token(&subject, ip, &session_id)?;

        let rotated = self
            .sessions
            .rotate_session(
                claims.sub,
                &claims.sid,
                &hash_refresh_token(presented),
                &session_id,
                &hash_refresh_token(&refresh_token),
            )
            .await?;

        if !rotated {
            return Err(AuthError::InvalidToken);
        }

        tracing::info!(
            user_id = %claims.sub,
            old_session_id = %claims.sid,
            session_id = %session_id,
            "Tokens refreshed"
        );

        Ok(SessionGrant {
            access_token,
            refresh_token,
            session: Session {
                user_id: claims.sub,
                session_id,
                ip: ip.to_string(),
                issued_at: chrono::Utc::now(),
                expires_at,
            },
            expires_in: self.tokens.access_ttl_secs(),
        })
    }

    // ============================================
    // Logout
    // ============================================

    /// Revoke the session behind a refresh token.
    ///
    /// Missing or unverifiable tokens are a no-op; the caller clears the
    /// cookie either way.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        let Some(token) = refresh_token.filter(|t| !t.is_empty()) else {
            return Ok(());
        };

        let claims = match self.tokens.verify_refresh_token(token) {
            Ok(claims) => claims,
            Err(_) => {
                tracing::debug!("Logout with an invalid refresh token");
                return Ok(());
            }
        };

        if self.sessions.verify_session(claims.sub, &claims.sid, token).await? {
            self.sessions.revoke_session(claims.sub, &claims.sid).await?;
            tracing::info!(user_id = %claims.sub, session_id = %claims.sid, "User logged out");
        }

        Ok(())
    }

    // ============================================
    // Access
    // ============================================

    /// Verify a bearer access token
    pub fn authenticate(&self, access_token: &str) -> Result<AccessTokenClaims, AuthError> {
        self.tokens.verify_access_token(access_token)
    }

    async fn open_session(&self, user: &UserRecord, ip: &str) -> Result<SessionGrant, AuthError> {
        let subject = TokenSubject::from(user);
        let access_token = self.tokens.issue_access_token(&subject)?;

        let session_id = new_session_id();
        let (refresh_token, expires_at) = self
            .tokens
            .issue_refresh_token(&subject, ip, &session_id)?;

        self.sessions
            .create_session(user.id, &session_id, &hash_refresh_token(&refresh_token))
            .await?;

        Ok(SessionGrant {
            access_token,
            refresh_token,
            session: Session {
                user_id: user.id,
                session_id,
                ip: ip.to_string(),
                issued_at: chrono::Utc::now(),
                expires_at,
            },
            expires_in: self.tokens.access_ttl_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{
        build_service, test_config, test_harness, test_service, test_service_with, DownStore,
        FailingMailSender, RecordingMailSender,
    };
    use crate::credentials::CredentialStore;
    use tokio_test::assert_ok;

    const IP: &str = "203.0.113.7";

    fn register_req(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ada".to_string(),
            email: email.to_string(),
            password: "correct horse".to_string(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_sends_link_and_blocks_login_until_verified() {
        let (auth, mail) = test_service();
        let user = auth.register(register_req("Ada@X.com"), IP).await.unwrap();
        assert_eq!(user.email, "ada@x.com");
        assert_eq!(user.role, UserRole::User);
        assert!(!user.verified);
        assert_eq!(mail.sent().len(), 1);

        assert!(matches!(
            auth.login(login_req("ada@x.com", "correct horse"), IP).await,
            Err(AuthError::EmailNotVerified)
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_email_conflicts() {
        let (auth, _) = test_service();
        auth.register(register_req("a@x.com"), IP).await.unwrap();
        assert!(matches!(
            auth.register(register_req("A@x.com"), IP).await,
            Err(AuthError::EmailExists)
        ));
    }

    #[tokio::test]
    async fn test_register_survives_mail_failure() {
        let auth = test_service_with(Arc::new(MemoryStore::new()), Arc::new(FailingMailSender));
        assert_ok!(auth.register(register_req("a@x.com"), IP).await);
    }

    #[tokio::test]
    async fn test_signup_limit_counts_invalid_requests() {
        let (auth, _) = test_service();
        for _ in 0..5 {
            assert!(matches!(
                auth.register(RegisterRequest::default(), IP).await,
                Err(AuthError::Validation(_))
            ));
        }
        assert!(matches!(
            auth.register(register_req("a@x.com"), IP).await,
            Err(AuthError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_verify_email_logs_in_and_ticket_is_single_use() {
        let (auth, mail) = test_service();
        auth.register(register_req("a@x.com"), IP).await.unwrap();
        let secret = mail.last_secret().unwrap();

        let outcome = auth.verify_email(Some(&secret), IP).await.unwrap();
        assert!(outcome.user.verified);
        assert!(auth.authenticate(&outcome.grant.access_token).is_ok());

        assert!(matches!(
            auth.verify_email(Some(&secret), IP).await,
            Err(AuthError::InvalidVerificationToken)
        ));
        assert!(auth
            .login(login_req("a@x.com", "correct horse"), IP)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_verify_email_for_vanished_account_is_not_found() {
        let harness = test_harness();
        let user = harness
            .auth
            .register(register_req("gone@x.com"), IP)
            .await
            .unwrap();
        let secret = harness.mail.last_secret().unwrap();
        assert!(harness.credentials.remove(user.id).await);

        let err = harness
            .auth
            .verify_email(Some(&secret), IP)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);

        // Ticket consumed and no session written; only the signup counter is left
        assert_eq!(harness.store.len().await, 1);
        assert!(harness
            .store
            .exists(&keys::rate_counter(keys::Scope::Signup, keys::Dimension::Ip, IP))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_verify_email_for_already_verified_account_logs_in() {
        let harness = test_harness();
        let user = harness
            .auth
            .register(register_req("a@x.com"), IP)
            .await
            .unwrap();
        let secret = harness.mail.last_secret().unwrap();
        harness.credentials.mark_verified(user.id).await.unwrap();

        let outcome = assert_ok!(harness.auth.verify_email(Some(&secret), IP).await);
        assert_eq!(outcome.user.id, user.id);
        assert!(outcome.user.verified);
        assert!(harness.auth.authenticate(&outcome.grant.access_token).is_ok());

        assert!(matches!(
            harness.auth.verify_email(Some(&secret), IP).await,
            Err(AuthError::InvalidVerificationToken)
        ));
    }

    #[tokio::test]
    async fn test_verify_email_requires_token() {
        let (auth, _) = test_service();
        assert!(matches!(
            auth.verify_email(None, IP).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            auth.verify_email(Some("deadbeef"), IP).await,
            Err(AuthError::InvalidVerificationToken)
        ));
    }

    #[tokio::test]
    async fn test_resend_replaces_ticket() {
        let (auth, mail) = test_service();
        auth.register(register_req("a@x.com"), IP).await.unwrap();
        let first = mail.last_secret().unwrap();

        auth.resend_verification(
            ResendVerificationRequest {
                email: "A@X.com".to_string(),
            },
            IP,
        )
        .await
        .unwrap();
        let second = mail.last_secret().unwrap();
        assert_ne!(first, second);

        assert!(auth.verify_email(Some(&first), IP).await.is_err());
        assert!(auth.verify_email(Some(&second), IP).await.is_ok());

        assert!(matches!(
            auth.resend_verification(
                ResendVerificationRequest {
                    email: "a@x.com".to_string(),
                },
                IP,
            )
            .await,
            Err(AuthError::AlreadyVerified)
        ));
    }

    #[tokio::test]
    async fn test_resend_unknown_email_is_silent() {
        let (auth, mail) = test_service();
        auth.resend_verification(
            ResendVerificationRequest {
                email: "ghost@x.com".to_string(),
            },
            IP,
        )
        .await
        .unwrap();
        assert!(mail.sent().is_empty());
    }

    async fn verified_user(auth: &AuthService, mail: &RecordingMailSender, email: &str) -> LoginOutcome {
        auth.register(register_req(email), IP).await.unwrap();
        let secret = mail.last_secret().unwrap();
        auth.verify_email(Some(&secret), IP).await.unwrap()
    }

    #[tokio::test]
    async fn test_lockout_after_five_failures_even_with_correct_password() {
        let (auth, mail) = test_service();
        verified_user(&auth, &mail, "b@x.com").await;

        for _ in 0..5 {
            assert!(matches!(
                auth.login(login_req("b@x.com", "wrong"), "10.0.0.1").await,
                Err(AuthError::InvalidCredentials)
            ));
        }

        assert!(matches!(
            auth.login(login_req("b@x.com", "correct horse"), "10.0.0.2").await,
            Err(AuthError::AccountLocked)
        ));
    }

    #[tokio::test]
    async fn test_success_clears_failures() {
        let (auth, mail) = test_service();
        verified_user(&auth, &mail, "c@x.com").await;

        for _ in 0..4 {
            auth.login(login_req("c@x.com", "wrong"), IP).await.unwrap_err();
        }
        auth.login(login_req("c@x.com", "correct horse"), IP)
            .await
            .unwrap();
        for _ in 0..4 {
            auth.login(login_req("c@x.com", "wrong"), IP).await.unwrap_err();
        }
        assert!(auth
            .login(login_req("c@x.com", "correct horse"), IP)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_look_alike() {
        let (auth, mail) = test_service();
        verified_user(&auth, &mail, "d@x.com").await;

        let unknown = auth
            .login(login_req("nobody@x.com", "pw"), IP)
            .await
            .unwrap_err();
        let wrong = auth.login(login_req("d@x.com", "pw"), IP).await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(unknown.status(), wrong.status());
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_old_token_dies() {
        let (auth, mail) = test_service();
        let outcome = verified_user(&auth, &mail, "e@x.com").await;
        let old = outcome.grant.refresh_token;

        let grant = auth.refresh(Some(&old), IP).await.unwrap();
        assert_ne!(grant.refresh_token, old);
        assert_ne!(grant.session.session_id, outcome.grant.session.session_id);
        assert!(auth.authenticate(&grant.access_token).is_ok());

        assert!(matches!(
            auth.refresh(Some(&old), IP).await,
            Err(AuthError::InvalidToken)
        ));
        assert!(auth.refresh(Some(&grant.refresh_token), IP).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_missing_cookie() {
        let (auth, _) = test_service();
        assert!(matches!(
            auth.refresh(None, IP).await,
            Err(AuthError::MissingRefreshToken)
        ));
        assert!(matches!(
            auth.refresh(Some("not-a-jwt"), IP).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_only_one_wins() {
        let (auth, mail) = test_service();
        let outcome = verified_user(&auth, &mail, "f@x.com").await;
        let auth = Arc::new(auth);
        let token = outcome.grant.refresh_token;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let auth = auth.clone();
                let token = token.clone();
                tokio::spawn(async move { auth.refresh(Some(&token), IP).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert!(matches!(err, AuthError::InvalidToken)),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_ip_mismatch_allowed_by_default() {
        let (auth, mail) = test_service();
        let outcome = verified_user(&auth, &mail, "g@x.com").await;
        let grant = auth
            .refresh(Some(&outcome.grant.refresh_token), "198.51.100.1")
            .await
            .unwrap();
        assert_eq!(grant.session.ip, "198.51.100.1");
    }

    #[tokio::test]
    async fn test_ip_mismatch_rejected_when_configured() {
        let mut config = test_config();
        config.reject_on_ip_mismatch = true;
        let mail = Arc::new(RecordingMailSender::default());
        let auth = build_service(config, Arc::new(MemoryStore::new()), mail.clone());
        let outcome = verified_user(&auth, &mail, "h@x.com").await;

        assert!(matches!(
            auth.refresh(Some(&outcome.grant.refresh_token), "198.51.100.1").await,
            Err(AuthError::InvalidToken)
        ));
        assert!(auth
            .refresh(Some(&outcome.grant.refresh_token), IP)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_logout_revokes_session_only() {
        let (auth, mail) = test_service();
        let first = verified_user(&auth, &mail, "i@x.com").await;
        let second = auth
            .login(login_req("i@x.com", "correct horse"), IP)
            .await
            .unwrap();

        auth.logout(Some(&first.grant.refresh_token)).await.unwrap();
        assert!(auth.refresh(Some(&first.grant.refresh_token), IP).await.is_err());
        assert!(auth.refresh(Some(&second.grant.refresh_token), IP).await.is_ok());

        assert_ok!(auth.logout(None).await);
        assert_ok!(auth.logout(Some("garbage")).await);
    }

    #[tokio::test]
    async fn test_login_limited_per_identity() {
        let (auth, mail) = test_service();
        verified_user(&auth, &mail, "j@x.com").await;

        for i in 0..10 {
            let _ = auth
                .login(login_req("j@x.com", "wrong"), &format!("10.1.0.{i}"))
                .await;
        }
        assert!(matches!(
            auth.login(login_req("j@x.com", "correct horse"), "10.2.0.1").await,
            Err(AuthError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_outage_fails_closed_for_login() {
        let auth = test_service_with(Arc::new(DownStore), Arc::new(FailingMailSender));
        let err = auth
            .login(login_req("a@x.com", "pw"), IP)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Store(_)));
    }

    #[tokio::test]
    async fn test_grant_reports_access_lifetime() {
        let (auth, mail) = test_service();
        let outcome = verified_user(&auth, &mail, "k@x.com").await;
        assert_eq!(outcome.grant.expires_in, 900);
        assert!(outcome.grant.session.expires_at > outcome.grant.session.issued_at);
    }
}
