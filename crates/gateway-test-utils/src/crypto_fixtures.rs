//! Cryptographic fixtures for testing
//!
//! Provides signing keys that can both mint tokens and publish the matching
//! JWK. Ed25519 keys are deterministic based on a seed value; ECDSA P-256 and
//! P-384 keys are freshly generated (ring offers no seeded ECDSA constructor).
//! The RSA key is a checked-in 2048-bit PEM (`fixtures/rsa_2048.pem`).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, EcdsaSigningAlgorithm, Ed25519KeyPair, KeyPair,
    ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED_SIGNING,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// A key that can sign test tokens and describe itself as a JWK.
pub trait TestSigningKey {
    /// Key ID placed in both the token header and the JWK.
    fn kid(&self) -> &str;

    /// Algorithm this key signs with.
    fn algorithm(&self) -> Algorithm;

    /// jsonwebtoken encoding key for the private half.
    fn encoding_key(&self) -> EncodingKey;

    /// Public JWK (with `alg` and `use` populated).
    fn jwk(&self) -> Value;

    /// Sign `claims` with a standard header (`typ: JWT`, `kid`, `alg`).
    fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm());
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid().to_string());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with a caller-supplied header.
    ///
    /// The header's `alg` must match this key's algorithm; jsonwebtoken
    /// refuses to sign otherwise.
    fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        encode(header, claims, &self.encoding_key()).expect("Failed to sign test token")
    }
}

// =============================================================================
// Ed25519
// =============================================================================

/// Deterministic Ed25519 signing key.
///
/// The same seed always produces the same keypair, ensuring test reproducibility.
pub struct TestEd25519Key {
    kid: String,
    public_key_bytes: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestEd25519Key {
    /// Create a key from a seed value (0-255) under the given key ID.
    pub fn new(seed: u8, kid: &str) -> Self {
        Self::try_new(seed, kid).expect("Failed to create test keypair")
    }

    /// Fallible variant of [`TestEd25519Key::new`].
    pub fn try_new(seed: u8, kid: &str) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes).map_err(|e| {
            FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e))
        })?;

        Ok(Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        })
    }

    /// Raw 32-byte public key.
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// Same key published under a different key ID.
    pub fn with_kid(&self, kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            public_key_bytes: self.public_key_bytes.clone(),
            private_key_pkcs8: self.private_key_pkcs8.clone(),
        }
    }
}

impl TestSigningKey for TestEd25519Key {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::EdDSA
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ed_der(&self.private_key_pkcs8)
    }

    fn jwk(&self) -> Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    // Fill rest with deterministic pattern
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production code must use ring::rand::SystemRandom.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // PKCS#8 v1 format for Ed25519 (RFC 5208):
    // SEQUENCE {
    //   version         INTEGER (0),
    //   algorithm       AlgorithmIdentifier,
    //   privateKey      OCTET STRING
    // }
    let mut pkcs8 = Vec::new();

    // Outer SEQUENCE tag
    pkcs8.push(0x30);
    pkcs8.push(0x2e); // Length: 46 bytes

    // Version: INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);

    // Algorithm Identifier: SEQUENCE
    pkcs8.push(0x30);
    pkcs8.push(0x05); // Length: 5 bytes
                      // OID for Ed25519: 1.3.101.112
    pkcs8.extend_from_slice(&[0x06, 0x03, 0x2b, 0x65, 0x70]);

    // Private Key: OCTET STRING
    pkcs8.push(0x04);
    pkcs8.push(0x22); // Length: 34 bytes
                      // Inner OCTET STRING with seed
    pkcs8.push(0x04);
    pkcs8.push(0x20); // Length: 32 bytes
    pkcs8.extend_from_slice(seed);

    pkcs8
}

// =============================================================================
// ECDSA P-256
// =============================================================================

/// ECDSA P-256 (ES256) signing key.
pub struct TestEcKey {
    kid: String,
    x: Vec<u8>,
    y: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestEcKey {
    /// Generate a fresh P-256 key under the given key ID.
    pub fn new(kid: &str) -> Self {
        Self::try_new(kid).expect("Failed to create test EC keypair")
    }

    /// Fallible variant of [`TestEcKey::new`].
    pub fn try_new(kid: &str) -> Result<Self, FixtureError> {
        let (x, y, private_key_pkcs8) = generate_ec_key(&ECDSA_P256_SHA256_FIXED_SIGNING, 32)?;
        Ok(Self {
            kid: kid.to_string(),
            x,
            y,
            private_key_pkcs8,
        })
    }
}

/// Generate a PKCS#8 ECDSA key and split its public point into coordinates.
fn generate_ec_key(
    alg: &'static EcdsaSigningAlgorithm,
    coordinate_len: usize,
) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>), FixtureError> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(alg, &rng)
        .map_err(|e| FixtureError::Crypto(format!("Failed to generate EC key: {:?}", e)))?;
    let key_pair = EcdsaKeyPair::from_pkcs8(alg, pkcs8.as_ref(), &rng)
        .map_err(|e| FixtureError::Crypto(format!("Failed to load EC key: {:?}", e)))?;

    // Uncompressed SEC1 point: 0x04 || x || y
    let point = key_pair.public_key().as_ref();
    let x = point
        .get(1..=coordinate_len)
        .ok_or_else(|| FixtureError::Crypto("EC point too short".to_string()))?;
    let y = point
        .get(coordinate_len + 1..=2 * coordinate_len)
        .ok_or_else(|| FixtureError::Crypto("EC point too short".to_string()))?;

    Ok((x.to_vec(), y.to_vec(), pkcs8.as_ref().to_vec()))
}

impl TestSigningKey for TestEcKey {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::ES256
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ec_der(&self.private_key_pkcs8)
    }

    fn jwk(&self) -> Value {
        json!({
            "kty": "EC",
            "kid": self.kid,
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(&self.x),
            "y": URL_SAFE_NO_PAD.encode(&self.y),
            "alg": "ES256",
            "use": "sig"
        })
    }
}

// =============================================================================
// ECDSA P-384
// =============================================================================

/// ECDSA P-384 (ES384) signing key.
pub struct TestEcP384Key {
    kid: String,
    x: Vec<u8>,
    y: Vec<u8>,
    private_key_pkcs8: Vec<u8>,
}

impl TestEcP384Key {
    /// Generate a fresh P-384 key under the given key ID.
    pub fn new(kid: &str) -> Self {
        Self::try_new(kid).expect("Failed to create test P-384 keypair")
    }

    /// Fallible variant of [`TestEcP384Key::new`].
    pub fn try_new(kid: &str) -> Result<Self, FixtureError> {
        let (x, y, private_key_pkcs8) = generate_ec_key(&ECDSA_P384_SHA384_FIXED_SIGNING, 48)?;
        Ok(Self {
            kid: kid.to_string(),
            x,
            y,
            private_key_pkcs8,
        })
    }
}

impl TestSigningKey for TestEcP384Key {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::ES384
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ec_der(&self.private_key_pkcs8)
    }

    fn jwk(&self) -> Value {
        json!({
            "kty": "EC",
            "kid": self.kid,
            "crv": "P-384",
            "x": URL_SAFE_NO_PAD.encode(&self.x),
            "y": URL_SAFE_NO_PAD.encode(&self.y),
            "alg": "ES384",
            "use": "sig"
        })
    }
}

// =============================================================================
// RSA
// =============================================================================

/// 2048-bit RSA test key (PKCS#1 PEM). Never use outside tests.
const RSA_TEST_KEY_PEM: &str = include_str!("../fixtures/rsa_2048.pem");

/// Modulus of [`RSA_TEST_KEY_PEM`], base64url.
const RSA_TEST_MODULUS: &str = "xcN7hQYw_EciHxELrTIQ1pBMYlTfsUedp1zqHB4ByRJGEBL9ZqqUOwVUCUItRha4Vj-IztAhh6UrWL2Rj0e4xyEYNX5Aom3QnKemNEWf0AOuQweIlrFPBytP2kLW-JGrcfg2tChCvuXaMDDC9Yf7oDv4aY65NPgxeRunhuuX03nAblHDvwDtebS_hyUcFvMOB7TqY1uCg0QY71ftezx5HqxKxVVgvg6txfobrUfFY3dZ4NsMo40PYBafkXJ4tEPlbDRrF5MxwIc2sfHPRg9QqiAKGIeqCQ0IIyuZYrY0IIbPHgLUbVG45-QLpV6h-qCN_BPchvZxzRMKQUKP6WCgHw";

/// Public exponent 65537, base64url.
const RSA_TEST_EXPONENT: &str = "AQAB";

/// RSA signing key for one of the RS*/PS* algorithms.
///
/// Every instance shares the same checked-in key material; the JWK is pinned
/// to the chosen algorithm.
pub struct TestRsaKey {
    kid: String,
    algorithm: Algorithm,
}

impl TestRsaKey {
    /// RSA key signing with `algorithm` (RS256..PS512) under the given key ID.
    pub fn new(kid: &str, algorithm: Algorithm) -> Self {
        Self {
            kid: kid.to_string(),
            algorithm,
        }
    }

    /// Public JWK without an `alg` member, usable with any RSA algorithm.
    pub fn unpinned_jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "n": RSA_TEST_MODULUS,
            "e": RSA_TEST_EXPONENT,
            "use": "sig"
        })
    }
}

impl TestSigningKey for TestRsaKey {
    fn kid(&self) -> &str {
        &self.kid
    }

    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(RSA_TEST_KEY_PEM.as_bytes()).expect("Invalid RSA test key PEM")
    }

    fn jwk(&self) -> Value {
        let mut jwk = self.unpinned_jwk();
        jwk["alg"] = json!(format!("{:?}", self.algorithm));
        jwk
    }
}
