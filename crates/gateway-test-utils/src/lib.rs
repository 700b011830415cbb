//! # Gateway Test Utilities
//!
//! Shared test utilities for the authentication gateway.
//!
//! This crate provides:
//! - Crypto fixtures (Ed25519 keys from fixed seeds, ECDSA P-256/P-384 keys, a
//!   checked-in RSA key)
//! - Test claim builders (`TestTokenBuilder`)
//! - A mock JWKS endpoint (`MockJwksServer`) backed by wiremock
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestEd25519Key::new(1, "k1");
//!     let jwks = MockJwksServer::start().await;
//!     jwks.serve_keys(&[key.jwk()]).await;
//!
//!     let token = key.sign(&TestTokenBuilder::new().for_user("user-42").build());
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use token_builders::*;
