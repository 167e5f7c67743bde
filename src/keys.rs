//! Store key layout
//!
//! ```text
//! verification_token:<secret>                  → userId            (24h)
//! verification_user:<userId>                   → current secret    (24h)
//! refreshToken:<userId>:<sessionId>            → sha256(refresh)   (7d)
//! auth:failures:<normalizedIdentity>           → failure count     (15m from first failure)
//! auth:cooldown:<normalizedIdentity>           → "1"               (10m)
//! ratelimit:<scope>:<dimension>:<key>          → request count     (15m from first request)
//! ```

use crate::models::UserId;
use std::fmt;

/// Normalize an email into the identity key namespace.
///
/// Lower-cases and replaces `@` and `.` with `_`, so every spelling of one
/// logical address maps to a single key.
pub fn normalize_identity(identity: &str) -> String {
    identity
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '@' || c == '.' { '_' } else { c })
        .collect()
}

/// Canonical form of an email as handed to the credential store
pub fn canonical_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn verification_ticket(secret: &str) -> String {
    format!("verification_token:{secret}")
}

pub fn verification_user(user_id: UserId) -> String {
    format!("verification_user:{user_id}")
}

pub fn refresh_session(user_id: UserId, session_id: &str) -> String {
    format!("refreshToken:{user_id}:{session_id}")
}

pub fn failures(normalized: &str) -> String {
    format!("auth:failures:{normalized}")
}

pub fn cooldown(normalized: &str) -> String {
    format!("auth:cooldown:{normalized}")
}

/// Which flow a rate counter throttles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Login,
    Signup,
    Resend,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Login => "login",
            Scope::Signup => "signup",
            Scope::Resend => "resend",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a rate counter is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Ip,
    Identity,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Ip => "ip",
            Dimension::Identity => "identity",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub fn rate_counter(scope: Scope, dimension: Dimension, key: &str) -> String {
    format!("ratelimit:{scope}:{dimension}:{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_identity_is_stable() {
        assert_eq!(normalize_identity("A.B@X.com"), "a_b_x_com");
        assert_eq!(normalize_identity(" a.b@x.com "), "a_b_x_com");
        assert_eq!(
            normalize_identity(&normalize_identity("a.b@x.com")),
            "a_b_x_com"
        );
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(refresh_session(42, "sid"), "refreshToken:42:sid");
        assert_eq!(failures("a_x_com"), "auth:failures:a_x_com");
        assert_eq!(cooldown("a_x_com"), "auth:cooldown:a_x_com");
        assert_eq!(
            rate_counter(Scope::Login, Dimension::Identity, "a_x_com"),
            "ratelimit:login:identity:a_x_com"
        );
        assert_eq!(verification_ticket("abc"), "verification_token:abc");
    }
}
