//! JWT utilities shared across Taskboard backend components.
//!
//! This module provides the transport-free pieces of bearer token handling:
//! - Size limits for DoS prevention
//! - Clock skew constants for time-claim validation
//! - Compact header parsing (`kid` and `alg`) without signature verification
//! - `iat` / `nbf` "not too far in the future" checks
//! - base64url decoding of JWK key material
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Header values are only ever used to select a key; the token MUST still be
//!   verified against that key
//! - Error messages are generic; details are logged at debug level
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_header, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! // Size check and header parse in one step
//! let header = extract_header(token)?;
//!
//! // Look up header.kid in the trusted key set, verify, then:
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any parsing or cryptographic
/// operations.
///
/// # Rationale
///
/// - Typical access tokens are 300-1200 bytes depending on signature scheme
/// - RS512 with a 4096-bit key produces a ~700 byte signature segment
/// - 8KB allows custom claims while bounding base64 decode and hashing work
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default JWT clock skew tolerance (5 minutes per NIST SP 800-63B).
///
/// Tokens whose `iat` or `nbf` lies more than this far in the future are
/// rejected.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
///
/// Configuration above this value is refused at startup.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT pre-validation.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The access token is invalid or expired")]
    MissingKid,

    /// Token is missing required `alg` header.
    #[error("The access token is invalid or expired")]
    MissingAlg,

    /// A time claim (`iat`, `nbf`) is too far in the future.
    #[error("The access token is invalid or expired")]
    TooFarInFuture,
}

// =============================================================================
// Header
// =============================================================================

/// The unverified routing fields of a compact JWT header.
///
/// Both values come from attacker-controlled input. `kid` selects a key from a
/// trusted set and `alg` is compared against that key's declared family; neither
/// is trusted for anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Key ID naming the verification key.
    pub kid: String,

    /// Declared signature algorithm, verbatim (e.g. `"EdDSA"`, `"ES256"`).
    pub alg: String,
}

// =============================================================================
// Functions
// =============================================================================

/// Parse the `kid` and `alg` fields from a JWT header without verifying the
/// signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - Exactly three dot-separated segments are required
/// - Empty `kid` values are rejected
///
/// # Errors
///
/// Returns `JwtValidationError` variants:
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong structure, bad base64, or invalid JSON header
/// - `MissingKid` - Header lacks a non-empty string `kid`
/// - `MissingAlg` - Header lacks a non-empty string `alg`
pub fn extract_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    let header_part = parts.first().ok_or(JwtValidationError::MalformedToken)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let kid = non_empty_str(&header, "kid").ok_or(JwtValidationError::MissingKid)?;
    let alg = non_empty_str(&header, "alg").ok_or(JwtValidationError::MissingAlg)?;

    Ok(TokenHeader { kid, alg })
}

fn non_empty_str(header: &serde_json::Value, field: &str) -> Option<String> {
    header
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Validate the `iat` (issued-at) claim against the wall clock.
///
/// # Errors
///
/// Returns `JwtValidationError::TooFarInFuture` if `iat` is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_not_after_now_at(iat, clock_skew, now)
}

/// Deterministic "not too far in the future" check against an explicit `now`.
///
/// Used for both `iat` and `nbf`. A timestamp exactly `clock_skew` ahead of
/// `now` is the last accepted value.
///
/// # Errors
///
/// Returns `JwtValidationError::TooFarInFuture` if `timestamp > now + clock_skew`.
pub fn validate_not_after_now_at(
    timestamp: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW by configuration
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_allowed = now.saturating_add(clock_skew_secs);

    if timestamp > max_allowed {
        tracing::debug!(
            target: "common.jwt",
            timestamp = timestamp,
            now = now,
            max_allowed = max_allowed,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: time claim too far in the future"
        );
        return Err(JwtValidationError::TooFarInFuture);
    }

    Ok(())
}

/// Decode a base64url (no padding) JWK member such as `x`, `y`, `n` or `e`.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the value is not valid base64url.
pub fn decode_base64url(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value)
}

// =============================================================================
// Tests
// =============================================================================
