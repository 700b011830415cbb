//! Authentication gateway configuration.
//!
//! Configuration is loaded from environment variables, or built directly with
//! [`GatewayConfig::new`] and the `with_*` helpers. Nothing trust-related has a
//! default: the key-set URL, issuer and audience must always be supplied.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default key-set cache TTL in seconds (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default key-set fetch timeout in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Default floor between refreshes triggered by unknown key IDs (disabled).
///
/// With the floor at 0 a newly rotated key is picked up on its first use, but
/// a stream of tokens with unknown `kid`s triggers back-to-back upstream
/// fetches (coalesced, never more than one in flight). Deployments exposed to
/// unauthenticated traffic should set `JWKS_MIN_REFRESH_INTERVAL_SECONDS`
/// (10 s is a common choice); a rotated key then becomes usable once the held
/// set is older than the floor.
pub const DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS: u64 = 0;

/// Authentication gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// URL of the remote JSON Web Key Set.
    pub jwks_url: String,

    /// Exact `iss` value accepted.
    pub trusted_issuer: String,

    /// Exact `aud` value accepted.
    pub trusted_audience: String,

    /// How long a fetched key set is served before it is considered stale.
    pub jwks_cache_ttl: Duration,

    /// Deadline for one key-set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Minimum key-set age before an unknown key ID may trigger a refresh.
    /// Zero disables the floor.
    pub jwks_min_refresh_interval: Duration,

    /// Tolerance for `iat` / `nbf` lying in the future.
    pub jwt_clock_skew: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid key-set cache configuration: {0}")]
    InvalidJwksCache(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),
}

impl GatewayConfig {
    /// Build a configuration with default timings.
    pub fn new(
        jwks_url: impl Into<String>,
        trusted_issuer: impl Into<String>,
        trusted_audience: impl Into<String>,
    ) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            trusted_issuer: trusted_issuer.into(),
            trusted_audience: trusted_audience.into(),
            jwks_cache_ttl: Duration::from_secs(DEFAULT_JWKS_CACHE_TTL_SECONDS),
            jwks_fetch_timeout: Duration::from_secs(DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS),
            jwks_min_refresh_interval: Duration::from_secs(
                DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS,
            ),
            jwt_clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_cache_ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.jwks_fetch_timeout = timeout;
        self
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.jwks_min_refresh_interval = interval;
        self
    }

    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.jwt_clock_skew = skew;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwks_url = required(vars, "JWKS_URL")?;
        let trusted_issuer = required(vars, "JWT_ISSUER")?;
        let trusted_audience = required(vars, "JWT_AUDIENCE")?;

        let cache_ttl_secs = parse_secs(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
        )?;
        if cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidJwksCache(
                "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }

        let fetch_timeout_secs = parse_secs(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
        )?;
        if fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidJwksCache(
                "JWKS_FETCH_TIMEOUT_SECONDS must be greater than 0".to_string(),
            ));
        }

        let min_refresh_secs = parse_secs(
            vars,
            "JWKS_MIN_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS,
        )?;
        if min_refresh_secs > cache_ttl_secs {
            return Err(ConfigError::InvalidJwksCache(format!(
                "JWKS_MIN_REFRESH_INTERVAL_SECONDS ({}) must not exceed JWKS_CACHE_TTL_SECONDS ({})",
                min_refresh_secs, cache_ttl_secs
            )));
        }

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            let value = value.unsigned_abs();
            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        Ok(Self {
            jwks_url,
            trusted_issuer,
            trusted_audience,
            jwks_cache_ttl: Duration::from_secs(cache_ttl_secs),
            jwks_fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            jwks_min_refresh_interval: Duration::from_secs(min_refresh_secs),
            jwt_clock_skew,
        })
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_secs(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match vars.get(name) {
        Some(value_str) => value_str.parse().map_err(|e| {
            ConfigError::InvalidJwksCache(format!(
                "{} must be a valid non-negative integer, got '{}': {}",
                name, value_str, e
            ))
        }),
        None => Ok(default),
    }
}
