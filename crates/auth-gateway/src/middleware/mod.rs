//! HTTP middleware.
//!
//! # Components
//!
//! - `auth` - Authentication middleware for protected routes

pub mod auth;

pub use auth::{bearer_token, require_auth, AuthState, IdentityExt};
