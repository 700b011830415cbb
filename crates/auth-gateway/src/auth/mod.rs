//! Bearer token authentication.
//!
//! # Components
//!
//! - `keys` - Verification keys and their algorithm families
//! - `key_store` - Atomically replaced in-memory key set
//! - `jwks` - Key-set document parsing and the HTTP key source
//! - `resolver` - Key ID resolution with coalesced refresh
//! - `jwt` - Token signature and claim validation
//! - `claims` - Validated claims
//! - `identity` - Subject to local user binding
//! - `gateway` - The `authenticate` entry point

pub mod claims;
pub mod gateway;
pub mod identity;
pub mod jwks;
pub mod jwt;
pub mod key_store;
pub mod keys;
pub mod resolver;

pub use claims::Claims;
pub use gateway::AuthGateway;
pub use identity::{Identity, IdentityBinder, InMemoryUserLookup, LookupError, UserLookup, UserRecord};
pub use jwks::{HttpKeySetSource, KeySetError, KeySetSource};
pub use jwt::TokenValidator;
pub use key_store::{KeySet, KeyStore};
pub use keys::{KeyFamily, KeyMaterial, VerificationKey};
pub use resolver::KeyResolver;
