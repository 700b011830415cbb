//! The authentication entry point.
//!
//! [`AuthGateway::authenticate`] composes the stages: parse the header for
//! `kid`, resolve the key, validate the token, bind the subject. The first
//! failure short-circuits with its typed error.

use crate::auth::identity::{Identity, IdentityBinder, UserLookup};
use crate::auth::jwks::parse_algorithm;
use crate::auth::jwt::TokenValidator;
use crate::auth::resolver::KeyResolver;
use crate::config::GatewayConfig;
use crate::errors::{AuthError, GatewayError};
use crate::observability::metrics;
use common::jwt::extract_header;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Authenticates bearer tokens into local identities.
///
/// Owns the key resolver (and through it the key store) for the life of the
/// service. Share it behind an `Arc`.
pub struct AuthGateway {
    resolver: KeyResolver,
    validator: TokenValidator,
    binder: IdentityBinder,
    lookup: Arc<dyn UserLookup>,
}

impl AuthGateway {
    pub fn new(
        resolver: KeyResolver,
        validator: TokenValidator,
        lookup: Arc<dyn UserLookup>,
    ) -> Self {
        Self {
            resolver,
            validator,
            binder: IdentityBinder,
            lookup,
        }
    }

    /// Gateway with an HTTP key source and an empty key store.
    pub fn from_config(config: &GatewayConfig, lookup: Arc<dyn UserLookup>) -> Self {
        Self::new(
            KeyResolver::from_config(config),
            TokenValidator::from_config(config),
            lookup,
        )
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    pub fn validator(&self) -> &TokenValidator {
        &self.validator
    }

    /// Authenticate a bearer token (without the `Bearer ` prefix).
    ///
    /// # Errors
    ///
    /// Returns the [`GatewayError`] of the first failing stage. Every variant
    /// maps to the same 401 response.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<Identity, GatewayError> {
        let start = Instant::now();
        let result = self.run_stages(token).await;

        match &result {
            Ok(_) => {
                metrics::record_authentication("success", start.elapsed());
                tracing::debug!(target: "gateway.auth", "Request authenticated");
            }
            Err(e) => {
                metrics::record_authentication(e.diagnostic_code(), start.elapsed());
                tracing::debug!(
                    target: "gateway.auth",
                    code = e.diagnostic_code(),
                    "Authentication failed"
                );
            }
        }

        result
    }

    async fn run_stages(&self, token: &str) -> Result<Identity, GatewayError> {
        let header = extract_header(token).map_err(|e| {
            tracing::debug!(target: "gateway.auth", error = ?e, "Token header rejected");
            AuthError::Malformed
        })?;

        // No supported key could verify this alg; don't let it trigger a fetch
        if parse_algorithm(&header.alg).is_none() {
            return Err(AuthError::AlgorithmMismatch.into());
        }

        let key = self.resolver.resolve(&header.kid).await?;
        let claims = self.validator.validate(token, &key)?;
        let identity = self.binder.bind(&claims, self.lookup.as_ref()).await?;

        Ok(identity)
    }
}
