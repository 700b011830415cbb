//! Authentication middleware for protected routes.
//!
//! Extracts the Bearer token from the Authorization header, authenticates it
//! through the [`AuthGateway`], and injects the resulting [`Identity`] into
//! request extensions.

use crate::auth::{AuthGateway, Identity};
use crate::errors::{AuthError, GatewayError};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub gateway: Arc<AuthGateway>,
}

/// Authentication middleware.
///
/// # Authorization Header Format
///
/// ```text
/// Authorization: Bearer <token>
/// ```
///
/// The scheme is matched case-insensitively.
///
/// # Response
///
/// - 401 Unauthorized with `WWW-Authenticate` if the header is missing,
///   ill-formed, or the token does not authenticate
/// - Otherwise the next handler runs with the [`Identity`] in extensions
#[instrument(skip(state, req, next), name = "gateway.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GatewayError> {
    let token = bearer_token(req.headers()).ok_or_else(|| {
        tracing::debug!(target: "gateway.middleware.auth", "Missing or invalid Authorization header");
        GatewayError::Token(AuthError::Malformed)
    })?;

    let identity = state.gateway.authenticate(token).await?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// The token of an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Extension trait for reading the authenticated identity from a request.
pub trait IdentityExt {
    /// `None` if the auth middleware was not applied to this request.
    fn identity(&self) -> Option<&Identity>;
}

impl<B> IdentityExt for axum::extract::Request<B> {
    fn identity(&self) -> Option<&Identity> {
        self.extensions().get::<Identity>()
    }
}
