//! Authentication gateway error types.
//!
//! Each stage has its own error enum so callers (and tests) can match on the
//! precise failure. At the HTTP boundary every variant collapses into the same
//! opaque 401 response; the precise reason survives only as a diagnostic code
//! in server-side logs and metrics.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Generic message returned to clients for every authentication failure.
pub const UNAUTHENTICATED_MESSAGE: &str = "The access token is invalid or expired";

/// Failure to turn a key ID into a verification key.
///
/// `Clone` because one refresh outcome is broadcast to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyResolutionError {
    /// The key ID is absent from a freshly fetched key set.
    #[error("Key ID not present in the trusted key set")]
    NotFound,

    /// The key set could not be fetched or parsed.
    #[error("Key set fetch failed: {0}")]
    FetchFailed(String),

    /// The key set fetch exceeded its deadline.
    #[error("Key set fetch timed out")]
    Timeout,
}

/// Token verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Token is malformed")]
    Malformed,

    #[error("Token signature is invalid")]
    SignatureInvalid,

    #[error("Token algorithm is incompatible with the resolved key")]
    AlgorithmMismatch,

    #[error("Token has expired")]
    Expired,

    /// `iat` or `nbf` lies beyond the allowed clock skew.
    #[error("Token is not yet valid")]
    NotYetValid,

    #[error("Token issuer is not trusted")]
    IssuerMismatch,

    #[error("Token audience is not trusted")]
    AudienceMismatch,
}

/// Failure to bind a verified subject to a local user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("No local user for token subject")]
    UserNotFound,

    #[error("User lookup failed: {0}")]
    LookupFailed(String),
}

/// Any failure of `AuthGateway::authenticate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error(transparent)]
    KeyResolution(#[from] KeyResolutionError),

    #[error(transparent)]
    Token(#[from] AuthError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl GatewayError {
    /// Stable internal diagnostic code, used for logs and metric labels.
    ///
    /// Never sent to clients.
    pub fn diagnostic_code(&self) -> &'static str {
        match self {
            GatewayError::KeyResolution(KeyResolutionError::NotFound) => "key_not_found",
            GatewayError::KeyResolution(KeyResolutionError::FetchFailed(_)) => "jwks_fetch_failed",
            GatewayError::KeyResolution(KeyResolutionError::Timeout) => "jwks_timeout",
            GatewayError::Token(AuthError::Malformed) => "malformed_token",
            GatewayError::Token(AuthError::SignatureInvalid) => "signature_invalid",
            GatewayError::Token(AuthError::AlgorithmMismatch) => "algorithm_mismatch",
            GatewayError::Token(AuthError::Expired) => "token_expired",
            GatewayError::Token(AuthError::NotYetValid) => "token_not_yet_valid",
            GatewayError::Token(AuthError::IssuerMismatch) => "issuer_mismatch",
            GatewayError::Token(AuthError::AudienceMismatch) => "audience_mismatch",
            GatewayError::Identity(IdentityError::UserNotFound) => "user_not_found",
            GatewayError::Identity(IdentityError::LookupFailed(_)) => "user_lookup_failed",
        }
    }

    /// Returns the HTTP status code for this error (always 401).
    pub fn status_code(&self) -> u16 {
        StatusCode::UNAUTHORIZED.as_u16()
    }

    /// Whether the failure originates in infrastructure (key endpoint or user
    /// store) rather than in the presented credential.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            GatewayError::KeyResolution(
                KeyResolutionError::FetchFailed(_) | KeyResolutionError::Timeout
            ) | GatewayError::Identity(IdentityError::LookupFailed(_))
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        // Log actual reason server-side, return the same opaque body for all
        if self.is_infrastructure() {
            tracing::warn!(
                target: "gateway.auth",
                code = self.diagnostic_code(),
                error = %self,
                "Authentication unavailable"
            );
        } else {
            tracing::debug!(
                target: "gateway.auth",
                code = self.diagnostic_code(),
                "Authentication rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: "UNAUTHENTICATED",
                message: UNAUTHENTICATED_MESSAGE,
            },
        };

        let mut response = (StatusCode::UNAUTHORIZED, Json(body)).into_response();

        if let Ok(header_value) = "Bearer realm=\"tasks-api\", error=\"invalid_token\"".parse() {
            response
                .headers_mut()
                .insert("WWW-Authenticate", header_value);
        }

        response
    }
}
