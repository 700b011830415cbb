//! JWKS document parsing and fetching.
//!
//! The key-set endpoint serves `{"keys": [...]}`. Each signing key is
//! validated into a [`VerificationKey`] with an explicit [`KeyFamily`]. A
//! document is accepted or rejected as a whole: one malformed signing key
//! rejects the fetch and the previously trusted set stays in place.
//!
//! # Security
//!
//! - Response bodies are capped at [`MAX_JWKS_RESPONSE_BYTES`]
//! - Every fetch is bounded by a timeout
//! - Keys marked `"use": "enc"` are never trusted for signatures
//! - HTTPS should be used in production (enforced by deployment config)

use crate::auth::keys::{KeyFamily, KeyMaterial, VerificationKey};
use crate::errors::KeyResolutionError;
use async_trait::async_trait;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Maximum accepted key-set response size (1 MiB).
pub const MAX_JWKS_RESPONSE_BYTES: usize = 1_048_576;

/// JSON Web Key as served by the key-set endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: "OKP", "EC" or "RSA".
    pub kty: String,

    /// Key ID. Required for signing keys.
    #[serde(default)]
    pub kid: Option<String>,

    /// Curve name for OKP and EC keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// Public key or x coordinate (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Optional algorithm pin.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// Key-set document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Why a key-set document was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySetError {
    #[error("Invalid key set document: {0}")]
    InvalidDocument(String),

    #[error("Signing key without kid")]
    MissingKid,

    #[error("Duplicate kid '{0}'")]
    DuplicateKid(String),

    #[error("Key '{kid}' has unsupported key type '{kty}'")]
    UnsupportedKeyType { kid: String, kty: String },

    #[error("Key '{kid}' has unsupported curve '{crv}'")]
    UnsupportedCurve { kid: String, crv: String },

    #[error("Key '{kid}' pins unsupported algorithm '{alg}'")]
    UnsupportedAlgorithm { kid: String, alg: String },

    #[error("Key '{kid}' pins algorithm '{alg}' outside its family")]
    AlgorithmFamilyMismatch { kid: String, alg: String },

    #[error("Key '{kid}' is missing '{member}'")]
    MissingKeyMaterial { kid: String, member: &'static str },

    #[error("Key '{kid}' has invalid key material: {reason}")]
    InvalidKeyMaterial { kid: String, reason: String },
}

/// Parse and validate a key-set document.
///
/// Returns every signing key in document order. An empty `keys` array is a
/// valid, empty set.
///
/// # Errors
///
/// Returns the first [`KeySetError`] found; no partial set is returned.
pub fn parse_jwks(body: &[u8]) -> Result<Vec<VerificationKey>, KeySetError> {
    let document: JwksResponse =
        serde_json::from_slice(body).map_err(|e| KeySetError::InvalidDocument(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(document.keys.len());

    for jwk in document.keys {
        if jwk.key_use.as_deref() == Some("enc") {
            tracing::debug!(
                target: "gateway.auth.jwks",
                kid = ?jwk.kid,
                "Skipping encryption key"
            );
            continue;
        }

        let key = verification_key_from_jwk(jwk)?;
        if !seen.insert(key.kid().to_string()) {
            return Err(KeySetError::DuplicateKid(key.kid().to_string()));
        }
        keys.push(key);
    }

    Ok(keys)
}

/// Validate one signing JWK.
///
/// # Errors
///
/// Returns a [`KeySetError`] describing the first problem with the entry.
pub fn verification_key_from_jwk(jwk: Jwk) -> Result<VerificationKey, KeySetError> {
    let kid = jwk
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or(KeySetError::MissingKid)?;

    let require = |value: Option<String>, member: &'static str| {
        value.ok_or_else(|| KeySetError::MissingKeyMaterial {
            kid: kid.clone(),
            member,
        })
    };

    let material = match jwk.kty.as_str() {
        "OKP" => match jwk.crv.as_deref() {
            Some("Ed25519") => KeyMaterial::Ed25519 {
                x: require(jwk.x, "x")?,
            },
            other => {
                return Err(KeySetError::UnsupportedCurve {
                    kid,
                    crv: other.unwrap_or_default().to_string(),
                })
            }
        },
        "EC" => match jwk.crv.as_deref() {
            Some("P-256") => KeyMaterial::EcP256 {
                x: require(jwk.x, "x")?,
                y: require(jwk.y, "y")?,
            },
            Some("P-384") => KeyMaterial::EcP384 {
                x: require(jwk.x, "x")?,
                y: require(jwk.y, "y")?,
            },
            other => {
                return Err(KeySetError::UnsupportedCurve {
                    kid,
                    crv: other.unwrap_or_default().to_string(),
                })
            }
        },
        "RSA" => KeyMaterial::Rsa {
            n: require(jwk.n, "n")?,
            e: require(jwk.e, "e")?,
        },
        other => {
            return Err(KeySetError::UnsupportedKeyType {
                kid,
                kty: other.to_string(),
            })
        }
    };

    let pinned_algorithm = match jwk.alg.as_deref() {
        None => None,
        Some(alg) => Some(parse_algorithm(alg).ok_or_else(|| {
            KeySetError::UnsupportedAlgorithm {
                kid: kid.clone(),
                alg: alg.to_string(),
            }
        })?),
    };

    VerificationKey::new(kid, material, pinned_algorithm)
}

/// Parse an asymmetric JWS algorithm name.
///
/// Symmetric (HS*) names and anything jsonwebtoken does not know return
/// `None`.
pub fn parse_algorithm(name: &str) -> Option<Algorithm> {
    let alg = Algorithm::from_str(name).ok()?;
    is_asymmetric(alg).then_some(alg)
}

fn is_asymmetric(alg: Algorithm) -> bool {
    [
        KeyFamily::Ed25519,
        KeyFamily::EcP256,
        KeyFamily::EcP384,
        KeyFamily::Rsa,
    ]
    .into_iter()
    .any(|family| family.permits(alg))
}

/// Source of trusted verification keys.
///
/// The resolver calls this on refresh; tests substitute in-process sources.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch and validate the complete current key set.
    async fn fetch_keys(&self) -> Result<Vec<VerificationKey>, KeyResolutionError>;
}

/// Fetches the key set from an HTTP(S) JWKS endpoint.
pub struct HttpKeySetSource {
    jwks_url: String,
    http_client: reqwest::Client,
}

impl HttpKeySetSource {
    /// Create a source for `jwks_url` whose requests time out after `timeout`.
    pub fn new(jwks_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gateway.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url: jwks_url.into(),
            http_client,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    async fn read_capped_body(
        &self,
        mut response: reqwest::Response,
    ) -> Result<Vec<u8>, KeyResolutionError> {
        if let Some(length) = response.content_length() {
            if length > MAX_JWKS_RESPONSE_BYTES as u64 {
                tracing::error!(
                    target: "gateway.auth.jwks",
                    content_length = length,
                    max_size = MAX_JWKS_RESPONSE_BYTES,
                    "JWKS response too large"
                );
                return Err(KeyResolutionError::FetchFailed(
                    "response too large".to_string(),
                ));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
            if body.len() + chunk.len() > MAX_JWKS_RESPONSE_BYTES {
                tracing::error!(
                    target: "gateway.auth.jwks",
                    max_size = MAX_JWKS_RESPONSE_BYTES,
                    "JWKS response too large"
                );
                return Err(KeyResolutionError::FetchFailed(
                    "response too large".to_string(),
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    #[instrument(skip(self), fields(url = %self.jwks_url))]
    async fn fetch_keys(&self) -> Result<Vec<VerificationKey>, KeyResolutionError> {
        tracing::debug!(target: "gateway.auth.jwks", "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gateway.auth.jwks", error = %e, "Failed to fetch JWKS");
                map_reqwest_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "gateway.auth.jwks",
                status = %status,
                "JWKS endpoint returned error"
            );
            return Err(KeyResolutionError::FetchFailed(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let body = self.read_capped_body(response).await?;

        let keys = parse_jwks(&body).map_err(|e| {
            tracing::error!(target: "gateway.auth.jwks", error = %e, "Rejected JWKS document");
            KeyResolutionError::FetchFailed(e.to_string())
        })?;

        tracing::info!(
            target: "gateway.auth.jwks",
            key_count = keys.len(),
            "JWKS fetched"
        );

        Ok(keys)
    }
}

fn map_reqwest_error(error: reqwest::Error) -> KeyResolutionError {
    if error.is_timeout() {
        KeyResolutionError::Timeout
    } else {
        KeyResolutionError::FetchFailed(error.to_string())
    }
}
