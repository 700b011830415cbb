//! Authentication Gateway Library
//!
//! Authenticates inbound requests that carry a bearer token issued by an
//! external identity provider:
//!
//! - Fetches and caches the provider's public signing keys (JWKS)
//! - Verifies token signature, algorithm, issuer, audience and expiry
//! - Binds the verified subject to a local user record
//!
//! # Flow
//!
//! ```text
//! Authorization: Bearer <token>
//!   -> common::jwt::extract_header (kid, alg)
//!   -> KeyResolver::resolve(kid)        (KeyStore, refresh via KeySetSource)
//!   -> TokenValidator::validate(token, key) -> Claims
//!   -> IdentityBinder::bind(claims, lookup) -> Identity
//! ```
//!
//! # Modules
//!
//! - `auth` - Key store, resolver, validator, identity binding, gateway
//! - `config` - Gateway configuration from environment
//! - `errors` - Error types and their 401 mapping
//! - `middleware` - Axum authentication middleware
//! - `observability` - Tracing setup and metrics

pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod observability;

pub use auth::{AuthGateway, Claims, Identity, KeyResolver, KeyStore, TokenValidator};
pub use config::GatewayConfig;
pub use errors::{AuthError, GatewayError, IdentityError, KeyResolutionError};
