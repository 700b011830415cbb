//! Validated token claims.
//!
//! A [`Claims`] value exists only after signature, issuer, audience and time
//! checks have passed; the constructor is crate-private and the type has no
//! `Deserialize` impl. The subject is redacted in Debug output.

use std::fmt;

/// Claims of a fully validated token.
#[derive(Clone, PartialEq, Eq)]
pub struct Claims {
    subject: String,
    issuer: String,
    audience: Vec<String>,
    expires_at: i64,
    issued_at: Option<i64>,
}

impl Claims {
    pub(crate) fn new(
        subject: String,
        issuer: String,
        audience: Vec<String>,
        expires_at: i64,
        issued_at: Option<i64>,
    ) -> Self {
        Self {
            subject,
            issuer,
            audience,
            expires_at,
            issued_at,
        }
    }

    /// Subject (`sub`), the opaque user key at the identity provider.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Audience values as presented in the token (one or more).
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// Expiration timestamp (Unix epoch seconds).
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Issued-at timestamp (Unix epoch seconds), if present.
    pub fn issued_at(&self) -> Option<i64> {
        self.issued_at
    }
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("subject", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expires_at", &self.expires_at)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_debug_redacts_subject() {
        let claims = Claims::new(
            "secret-user-id".to_string(),
            "trust-issuer".to_string(),
            vec!["trust-aud".to_string()],
            1_234_567_890,
            Some(1_234_567_800),
        );

        let debug_str = format!("{:?}", claims);

        assert!(
            !debug_str.contains("secret-user-id"),
            "Debug output should not contain the subject"
        );
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("trust-issuer"));
    }

    #[test]
    fn test_claims_accessors() {
        let claims = Claims::new(
            "user-42".to_string(),
            "trust-issuer".to_string(),
            vec!["a".to_string(), "trust-aud".to_string()],
            1_700_000_000,
            None,
        );

        assert_eq!(claims.subject(), "user-42");
        assert_eq!(claims.issuer(), "trust-issuer");
        assert_eq!(claims.audience(), ["a", "trust-aud"]);
        assert_eq!(claims.expires_at(), 1_700_000_000);
        assert_eq!(claims.issued_at(), None);
    }
}
