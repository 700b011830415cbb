//! Verification keys.
//!
//! A [`VerificationKey`] is built once from a JWK and never changes. Its
//! [`KeyFamily`] is explicit: the algorithms a key may verify are decided here,
//! at key-set parse time, and not inferred from key shape during signature
//! verification.

use crate::auth::jwks::KeySetError;
use common::jwt::decode_base64url;
use jsonwebtoken::{Algorithm, DecodingKey};
use std::fmt;

/// Minimum accepted RSA modulus length in bytes (2048 bits).
pub const MIN_RSA_MODULUS_BYTES: usize = 256;

/// Signature scheme family a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFamily {
    /// OKP / Ed25519, verifies EdDSA.
    Ed25519,
    /// EC / P-256, verifies ES256.
    EcP256,
    /// EC / P-384, verifies ES384.
    EcP384,
    /// RSA, verifies RS256/384/512 and PS256/384/512.
    Rsa,
}

impl KeyFamily {
    /// Whether `alg` belongs to this family.
    pub fn permits(self, alg: Algorithm) -> bool {
        matches!(
            (self, alg),
            (KeyFamily::Ed25519, Algorithm::EdDSA)
                | (KeyFamily::EcP256, Algorithm::ES256)
                | (KeyFamily::EcP384, Algorithm::ES384)
                | (
                    KeyFamily::Rsa,
                    Algorithm::RS256
                        | Algorithm::RS384
                        | Algorithm::RS512
                        | Algorithm::PS256
                        | Algorithm::PS384
                        | Algorithm::PS512
                )
        )
    }
}

/// Public key material, tagged by family.
///
/// Coordinates and RSA parameters are kept in their JWK base64url form; that is
/// what jsonwebtoken's component constructors take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    Ed25519 { x: String },
    EcP256 { x: String, y: String },
    EcP384 { x: String, y: String },
    Rsa { n: String, e: String },
}

impl KeyMaterial {
    pub fn family(&self) -> KeyFamily {
        match self {
            KeyMaterial::Ed25519 { .. } => KeyFamily::Ed25519,
            KeyMaterial::EcP256 { .. } => KeyFamily::EcP256,
            KeyMaterial::EcP384 { .. } => KeyFamily::EcP384,
            KeyMaterial::Rsa { .. } => KeyFamily::Rsa,
        }
    }
}

/// An immutable public key ready for signature verification.
#[derive(Clone)]
pub struct VerificationKey {
    kid: String,
    family: KeyFamily,
    pinned_algorithm: Option<Algorithm>,
    decoding_key: DecodingKey,
}

impl VerificationKey {
    /// Validate `material` and build the key.
    ///
    /// `pinned_algorithm` is the JWK's optional `alg`; when present it must
    /// belong to the material's family and the key then verifies only that
    /// algorithm.
    ///
    /// # Errors
    ///
    /// - `AlgorithmFamilyMismatch` if the pinned algorithm is outside the family
    /// - `InvalidKeyMaterial` if a component does not decode or has the wrong size
    pub fn new(
        kid: impl Into<String>,
        material: KeyMaterial,
        pinned_algorithm: Option<Algorithm>,
    ) -> Result<Self, KeySetError> {
        let kid = kid.into();
        let family = material.family();

        if let Some(alg) = pinned_algorithm {
            if !family.permits(alg) {
                return Err(KeySetError::AlgorithmFamilyMismatch {
                    kid,
                    alg: format!("{:?}", alg),
                });
            }
        }

        let decoding_key = build_decoding_key(&kid, &material)?;

        Ok(Self {
            kid,
            family,
            pinned_algorithm,
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    pub fn pinned_algorithm(&self) -> Option<Algorithm> {
        self.pinned_algorithm
    }

    /// Whether a token declaring `alg` may be verified with this key.
    pub fn accepts(&self, alg: Algorithm) -> bool {
        self.family.permits(alg) && self.pinned_algorithm.map_or(true, |pinned| pinned == alg)
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("family", &self.family)
            .field("pinned_algorithm", &self.pinned_algorithm)
            .finish_non_exhaustive()
    }
}

fn build_decoding_key(kid: &str, material: &KeyMaterial) -> Result<DecodingKey, KeySetError> {
    let invalid = |reason: String| KeySetError::InvalidKeyMaterial {
        kid: kid.to_string(),
        reason,
    };

    match material {
        KeyMaterial::Ed25519 { x } => {
            let bytes = decode_exact(x, 32).map_err(|r| invalid(format!("x: {r}")))?;
            Ok(DecodingKey::from_ed_der(&bytes))
        }
        KeyMaterial::EcP256 { x, y } => {
            decode_exact(x, 32).map_err(|r| invalid(format!("x: {r}")))?;
            decode_exact(y, 32).map_err(|r| invalid(format!("y: {r}")))?;
            DecodingKey::from_ec_components(x, y).map_err(|e| invalid(e.to_string()))
        }
        KeyMaterial::EcP384 { x, y } => {
            decode_exact(x, 48).map_err(|r| invalid(format!("x: {r}")))?;
            decode_exact(y, 48).map_err(|r| invalid(format!("y: {r}")))?;
            DecodingKey::from_ec_components(x, y).map_err(|e| invalid(e.to_string()))
        }
        KeyMaterial::Rsa { n, e } => {
            let modulus = decode_base64url(n).map_err(|err| invalid(format!("n: {err}")))?;
            // Leading zero octets do not contribute to key strength
            let significant = modulus.iter().skip_while(|b| **b == 0).count();
            if significant < MIN_RSA_MODULUS_BYTES {
                return Err(invalid(format!(
                    "modulus is {} bits, minimum is {}",
                    significant * 8,
                    MIN_RSA_MODULUS_BYTES * 8
                )));
            }
            let exponent = decode_base64url(e).map_err(|err| invalid(format!("e: {err}")))?;
            if exponent.iter().all(|b| *b == 0) {
                return Err(invalid("exponent is empty".to_string()));
            }
            DecodingKey::from_rsa_components(n, e).map_err(|err| invalid(err.to_string()))
        }
    }
}

fn decode_exact(value: &str, expected_len: usize) -> Result<Vec<u8>, String> {
    let bytes = decode_base64url(value).map_err(|e| e.to_string())?;
    if bytes.len() != expected_len {
        return Err(format!(
            "expected {} bytes, got {}",
            expected_len,
            bytes.len()
        ));
    }
    Ok(bytes)
}
