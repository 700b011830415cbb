//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating bearer token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer used by default in test tokens and test gateway configs.
pub const TEST_ISSUER: &str = "trust-issuer";

/// Audience used by default in test tokens and test gateway configs.
pub const TEST_AUDIENCE: &str = "trust-aud";

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("user-42")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    iss: String,
    aud: Value,
    exp: i64,
    iat: Option<i64>,
    nbf: Option<i64>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new builder: trusted issuer and audience, one hour lifetime.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            iss: TEST_ISSUER.to_string(),
            aud: Value::String(TEST_AUDIENCE.to_string()),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: Some(now.timestamp()),
            nbf: None,
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set a single-string audience
    pub fn for_audience(mut self, audience: &str) -> Self {
        self.aud = Value::String(audience.to_string());
        self
    }

    /// Set an array audience
    pub fn for_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = json!(audiences);
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set an absolute expiration timestamp
    pub fn expires_at(mut self, timestamp: i64) -> Self {
        self.exp = timestamp;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = Some(timestamp);
        self
    }

    /// Omit the issued-at claim
    pub fn without_issued_at(mut self) -> Self {
        self.iat = None;
        self
    }

    /// Set not-before timestamp
    pub fn not_before(mut self, timestamp: i64) -> Self {
        self.nbf = Some(timestamp);
        self
    }

    /// Add an arbitrary extra claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        claims.insert("sub".to_string(), Value::String(self.sub));
        claims.insert("iss".to_string(), Value::String(self.iss));
        claims.insert("aud".to_string(), self.aud);
        claims.insert("exp".to_string(), json!(self.exp));
        if let Some(iat) = self.iat {
            claims.insert("iat".to_string(), json!(iat));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
