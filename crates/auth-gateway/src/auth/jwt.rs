//! Bearer token validation.
//!
//! Verifies a compact JWS against an already resolved [`VerificationKey`] and
//! checks its registered claims.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header `alg` must belong to the key's declared family (and match its
//!   pinned algorithm, if any); `none` and HS* are never accepted
//! - The signature is verified before any claim is inspected
//! - Issuer and audience must match exactly; `exp` must be strictly in the
//!   future with no leeway
//! - `iat` and `nbf` may be at most the clock skew in the future

use crate::auth::claims::Claims;
use crate::auth::jwks::parse_algorithm;
use crate::auth::keys::VerificationKey;
use crate::config::GatewayConfig;
use crate::errors::AuthError;
use common::jwt::{extract_header, validate_not_after_now_at, DEFAULT_CLOCK_SKEW};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Validation};
use serde::Deserialize;
use std::time::Duration;

/// `aud` as either a single string or an array of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn into_vec(self) -> Vec<String> {
        match self {
            Audience::One(aud) => vec![aud],
            Audience::Many(auds) => auds,
        }
    }
}

/// Signature-verified but not yet checked claims. Never leaves this module.
#[derive(Deserialize)]
struct UncheckedClaims {
    sub: String,
    iss: String,
    #[serde(default)]
    aud: Option<Audience>,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
}

/// Validates tokens for one trusted issuer and audience.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    issuer: String,
    audience: String,
    clock_skew: Duration,
}

impl TokenValidator {
    /// Create a validator.
    ///
    /// # Arguments
    ///
    /// * `issuer` - The only accepted `iss` value
    /// * `audience` - The only accepted `aud` value
    /// * `clock_skew` - Tolerance for `iat` / `nbf` in the future
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, clock_skew: Duration) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            clock_skew,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.trusted_issuer.clone(),
            config.trusted_audience.clone(),
            config.jwt_clock_skew,
        )
    }

    /// Validator with [`DEFAULT_CLOCK_SKEW`].
    pub fn with_default_skew(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self::new(issuer, audience, DEFAULT_CLOCK_SKEW)
    }

    /// Validate `token` against `key` at the current time.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] for the first failed check.
    pub fn validate(&self, token: &str, key: &VerificationKey) -> Result<Claims, AuthError> {
        self.validate_at(token, key, chrono::Utc::now().timestamp())
    }

    /// Validate `token` against `key` as of `now` (Unix epoch seconds).
    ///
    /// # Security Checks
    ///
    /// 1. Size and header structure
    /// 2. Header `alg` compatible with the key
    /// 3. Signature
    /// 4. Issuer, then audience
    /// 5. `exp > now`
    /// 6. `nbf` and `iat` not beyond `now + clock_skew`
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] for the first failed check.
    pub fn validate_at(
        &self,
        token: &str,
        key: &VerificationKey,
        now: i64,
    ) -> Result<Claims, AuthError> {
        let header = extract_header(token).map_err(|e| {
            tracing::debug!(target: "gateway.auth.validator", error = ?e, "Token header rejected");
            AuthError::Malformed
        })?;

        let alg = parse_algorithm(&header.alg)
            .filter(|alg| key.accepts(*alg))
            .ok_or_else(|| {
                tracing::debug!(
                    target: "gateway.auth.validator",
                    alg = %header.alg,
                    kid = %key.kid(),
                    family = ?key.family(),
                    "Token algorithm incompatible with key"
                );
                AuthError::AlgorithmMismatch
            })?;

        let claims = verify_signature(token, key, alg)?;

        if claims.iss != self.issuer {
            tracing::debug!(target: "gateway.auth.validator", "Token issuer mismatch");
            return Err(AuthError::IssuerMismatch);
        }

        let audience = claims.aud.map(Audience::into_vec).unwrap_or_default();
        if !audience.iter().any(|aud| *aud == self.audience) {
            tracing::debug!(target: "gateway.auth.validator", "Token audience mismatch");
            return Err(AuthError::AudienceMismatch);
        }

        if claims.exp <= now {
            tracing::debug!(
                target: "gateway.auth.validator",
                exp = claims.exp,
                now = now,
                "Token expired"
            );
            return Err(AuthError::Expired);
        }

        for timestamp in [claims.nbf, claims.iat].into_iter().flatten() {
            validate_not_after_now_at(timestamp, self.clock_skew, now)
                .map_err(|_| AuthError::NotYetValid)?;
        }

        tracing::debug!(target: "gateway.auth.validator", "Token validated successfully");
        Ok(Claims::new(
            claims.sub,
            claims.iss,
            audience,
            claims.exp,
            claims.iat,
        ))
    }
}

/// Verify the signature and decode the payload. Registered claims are checked
/// by the caller, so jsonwebtoken's own claim validation is disabled.
fn verify_signature(
    token: &str,
    key: &VerificationKey,
    alg: jsonwebtoken::Algorithm,
) -> Result<UncheckedClaims, AuthError> {
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.required_spec_claims.clear();

    decode::<UncheckedClaims>(token, key.decoding_key(), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(target: "gateway.auth.validator", error = %e, "Token verification failed");
            match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidEcdsaKey
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::InvalidKeyFormat
                | ErrorKind::Crypto(_) => AuthError::SignatureInvalid,
                ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::MissingAlgorithm => AuthError::AlgorithmMismatch,
                _ => AuthError::Malformed,
            }
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::verification_key_from_jwk;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use gateway_test_utils::{
        TestEcKey, TestEcP384Key, TestEd25519Key, TestRsaKey, TestSigningKey, TestTokenBuilder,
        TEST_AUDIENCE, TEST_ISSUER,
    };
    use jsonwebtoken::{Algorithm, Header};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn key_for(signer: &dyn TestSigningKey) -> VerificationKey {
        verification_key_from_jwk(serde_json::from_value(signer.jwk()).unwrap()).unwrap()
    }

    fn validator() -> TokenValidator {
        TokenValidator::with_default_skew(TEST_ISSUER, TEST_AUDIENCE)
    }

    fn claims_at_now() -> TestTokenBuilder {
        TestTokenBuilder::new()
            .for_user("user-42")
            .issued_at(NOW)
            .expires_at(NOW + 3600)
    }

    #[test]
    fn test_valid_token_yields_claims() {
        let signer = TestEd25519Key::new(1, "k1");
        let token = signer.sign(&claims_at_now().build());

        let claims = validator().validate_at(&token, &key_for(&signer), NOW).unwrap();
        assert_eq!(claims.subject(), "user-42");
        assert_eq!(claims.issuer(), TEST_ISSUER);
        assert_eq!(claims.expires_at(), NOW + 3600);
        assert_eq!(claims.issued_at(), Some(NOW));
    }

    #[test]
    fn test_wrong_signing_key_is_signature_invalid() {
        let signer = TestEd25519Key::new(1, "k1");
        let impostor = TestEd25519Key::new(2, "k1");
        // Claims are otherwise invalid too; the signature must fail first
        let token = impostor.sign(&claims_at_now().issued_by("evil").build());

        assert_eq!(
            validator().validate_at(&token, &key_for(&signer), NOW),
            Err(AuthError::SignatureInvalid)
        );
    }

    #[test]
    fn test_tampered_payload_is_signature_invalid() {
        let signer = TestEd25519Key::new(1, "k1");
        let token = signer.sign(&claims_at_now().build());
        let (header, rest) = token.split_once('.').unwrap();
        let (_, signature) = rest.split_once('.').unwrap();
        let forged_payload =
            URL_SAFE_NO_PAD.encode(claims_at_now().for_user("admin").build().to_string());
        let forged = format!("{header}.{forged_payload}.{signature}");

        assert_eq!(
            validator().validate_at(&forged, &key_for(&signer), NOW),
            Err(AuthError::SignatureInvalid)
        );
    }

    #[test]
    fn test_algorithm_family_mismatch() {
        let ed = TestEd25519Key::new(1, "shared");
        let ec = TestEcKey::new("shared");
        let token = ec.sign(&claims_at_now().build());

        assert_eq!(
            validator().validate_at(&token, &key_for(&ed), NOW),
            Err(AuthError::AlgorithmMismatch)
        );
    }

    #[test]
    fn test_symmetric_and_none_algorithms_rejected() {
        let signer = TestEd25519Key::new(1, "k1");
        let key = key_for(&signer);
        let payload = URL_SAFE_NO_PAD.encode(claims_at_now().build().to_string());

        for alg in ["HS256", "none"] {
            let header = URL_SAFE_NO_PAD.encode(json!({"alg": alg, "kid": "k1"}).to_string());
            let token = format!("{header}.{payload}.c2ln");
            assert_eq!(
                validator().validate_at(&token, &key, NOW),
                Err(AuthError::AlgorithmMismatch),
                "alg {alg}"
            );
        }
    }

    #[test]
    fn test_malformed_tokens() {
        let signer = TestEd25519Key::new(1, "k1");
        let key = key_for(&signer);
        let oversized = "x".repeat(9000);

        for token in ["", "abc", "a.b", "a.b.c.d", oversized.as_str()] {
            assert_eq!(
                validator().validate_at(token, &key, NOW),
                Err(AuthError::Malformed)
            );
        }
    }

    #[test]
    fn test_missing_exp_is_malformed() {
        let signer = TestEd25519Key::new(1, "k1");
        let token = signer.sign(&json!({
            "sub": "user-42",
            "iss": TEST_ISSUER,
            "aud": TEST_AUDIENCE
        }));

        assert_eq!(
            validator().validate_at(&token, &key_for(&signer), NOW),
            Err(AuthError::Malformed)
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let signer = TestEd25519Key::new(1, "k1");
        let key = key_for(&signer);

        let at_now = signer.sign(&claims_at_now().expires_at(NOW).build());
        assert_eq!(
            validator().validate_at(&at_now, &key, NOW),
            Err(AuthError::Expired)
        );

        let one_second_left = signer.sign(&claims_at_now().expires_at(NOW + 1).build());
        assert!(validator().validate_at(&one_second_left, &key, NOW).is_ok());
    }

    #[test]
    fn test_issuer_must_match_exactly() {
        let signer = TestEd25519Key::new(1, "k1");
        let key = key_for(&signer);

        for issuer in ["trust-issuer-2", "trust", "TRUST-ISSUER", ""] {
            let token = signer.sign(&claims_at_now().issued_by(issuer).build());
            assert_eq!(
                validator().validate_at(&token, &key, NOW),
                Err(AuthError::IssuerMismatch),
                "issuer {issuer:?}"
            );
        }
    }

    #[test]
    fn test_audience_superset_rejected() {
        let signer = TestEd25519Key::new(1, "k1");
        let key = key_for(&signer);

        for audience in ["trust-aud-extended", "trust-aud ", "trust"] {
            let token = signer.sign(&claims_at_now().for_audience(audience).build());
            assert_eq!(
                validator().validate_at(&token, &key, NOW),
                Err(AuthError::AudienceMismatch),
                "audience {audience:?}"
            );
        }
    }

    #[test]
    fn test_audience_array_forms() {
        let signer = TestEd25519Key::new(1, "k1");
        let key = key_for(&signer);

        let containing = signer.sign(
            &claims_at_now()
                .for_audiences(&["other", TEST_AUDIENCE])
                .build(),
        );
        let claims = validator().validate_at(&containing, &key, NOW).unwrap();
        assert_eq!(claims.audience(), ["other", TEST_AUDIENCE]);

        let lacking = signer.sign(&claims_at_now().for_audiences(&["other"]).build());
        assert_eq!(
            validator().validate_at(&lacking, &key, NOW),
            Err(AuthError::AudienceMismatch)
        );

        let empty = signer.sign(&claims_at_now().for_audiences(&[]).build());
        assert_eq!(
            validator().validate_at(&empty, &key, NOW),
            Err(AuthError::AudienceMismatch)
        );
    }

    #[test]
    fn test_issued_at_and_not_before_skew() {
        let signer = TestEd25519Key::new(1, "k1");
        let key = key_for(&signer);

        let iat_at_limit = signer.sign(&claims_at_now().issued_at(NOW + 300).build());
        assert!(validator().validate_at(&iat_at_limit, &key, NOW).is_ok());

        let iat_beyond = signer.sign(&claims_at_now().issued_at(NOW + 301).build());
        assert_eq!(
            validator().validate_at(&iat_beyond, &key, NOW),
            Err(AuthError::NotYetValid)
        );

        let nbf_beyond = signer.sign(&claims_at_now().not_before(NOW + 600).build());
        assert_eq!(
            validator().validate_at(&nbf_beyond, &key, NOW),
            Err(AuthError::NotYetValid)
        );

        let no_iat = signer.sign(&claims_at_now().without_issued_at().build());
        assert!(validator().validate_at(&no_iat, &key, NOW).is_ok());
    }

    #[test]
    fn test_pinned_key_accepts_its_algorithm() {
        let signer = TestEcKey::new("ec-1");
        let mut jwk = signer.jwk();
        jwk["alg"] = json!("ES256");
        let key = verification_key_from_jwk(serde_json::from_value(jwk).unwrap()).unwrap();

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some("ec-1".to_string());
        let token = signer.sign_with_header(&header, &claims_at_now().build());
        assert!(validator().validate_at(&token, &key, NOW).is_ok());
    }

    #[test]
    fn test_es384_token_validates() {
        let signer = TestEcP384Key::new("ec-384");
        let key = key_for(&signer);
        let token = signer.sign(&claims_at_now().build());

        let claims = validator().validate_at(&token, &key, NOW).unwrap();
        assert_eq!(claims.subject(), "user-42");

        // ES256 is the wrong curve for a P-384 key
        let p256 = TestEcKey::new("ec-384");
        let token = p256.sign(&claims_at_now().build());
        assert_eq!(
            validator().validate_at(&token, &key, NOW),
            Err(AuthError::AlgorithmMismatch)
        );
    }

    #[test]
    fn test_rsa_tokens_validate() {
        for alg in [Algorithm::RS256, Algorithm::PS256] {
            let signer = TestRsaKey::new("rsa-1", alg);
            let token = signer.sign(&claims_at_now().build());

            let claims = validator()
                .validate_at(&token, &key_for(&signer), NOW)
                .unwrap();
            assert_eq!(claims.subject(), "user-42", "{alg:?}");
        }
    }

    #[test]
    fn test_unpinned_rsa_key_accepts_any_rsa_algorithm() {
        let signer = TestRsaKey::new("rsa-1", Algorithm::RS256);
        let key = verification_key_from_jwk(serde_json::from_value(signer.unpinned_jwk()).unwrap())
            .unwrap();

        for alg in [Algorithm::RS256, Algorithm::RS512, Algorithm::PS256, Algorithm::PS384] {
            let mut header = Header::new(alg);
            header.kid = Some("rsa-1".to_string());
            let token = signer.sign_with_header(&header, &claims_at_now().build());
            assert!(validator().validate_at(&token, &key, NOW).is_ok(), "{alg:?}");
        }
    }

    #[test]
    fn test_rsa_key_pinned_to_pss_rejects_pkcs1_token() {
        let signer = TestRsaKey::new("rsa-1", Algorithm::PS256);
        let key = key_for(&signer);

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("rsa-1".to_string());
        let token = signer.sign_with_header(&header, &claims_at_now().build());

        assert_eq!(
            validator().validate_at(&token, &key, NOW),
            Err(AuthError::AlgorithmMismatch)
        );
    }

    #[test]
    fn test_rsa_signature_from_other_key_is_invalid() {
        let rsa = TestRsaKey::new("k1", Algorithm::RS256);
        let key = key_for(&rsa);
        // EdDSA signature bytes under an RS256 header
        let ed = TestEd25519Key::new(1, "k1");
        let ed_token = ed.sign(&claims_at_now().build());
        let (_, rest) = ed_token.split_once('.').unwrap();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("k1".to_string());
        let rs_header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let forged = format!("{rs_header}.{rest}");

        assert_eq!(
            validator().validate_at(&forged, &key, NOW),
            Err(AuthError::SignatureInvalid)
        );
    }

    #[test]
    fn test_validate_uses_wall_clock() {
        let signer = TestEd25519Key::new(1, "k1");
        let token = signer.sign(&TestTokenBuilder::new().expires_in(60).build());
        assert!(validator().validate(&token, &key_for(&signer)).is_ok());

        let expired = signer.sign(&TestTokenBuilder::new().expires_in(-60).build());
        assert_eq!(
            validator().validate(&expired, &key_for(&signer)),
            Err(AuthError::Expired)
        );
    }
}
