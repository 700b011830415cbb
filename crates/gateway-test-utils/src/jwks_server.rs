//! Mock JWKS endpoint for gateway tests.
//!
//! Wraps a wiremock `MockServer` serving `/.well-known/jwks.json`. Tests swap
//! the served document with [`MockJwksServer::reset`] followed by one of the
//! `serve_*` methods, and count fetches with [`MockJwksServer::fetch_count`].

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Mock key-set endpoint.
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a mock server with nothing mounted (every request gets 404).
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URL of the key-set endpoint.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Serve `{"keys": [...]}` with status 200.
    pub async fn serve_keys(&self, keys: &[Value]) {
        self.serve(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .await;
    }

    /// Serve `{"keys": [...]}` with status 200 after `delay`.
    pub async fn serve_keys_with_delay(&self, keys: &[Value], delay: Duration) {
        self.serve(
            ResponseTemplate::new(200)
                .set_body_json(jwks_document(keys))
                .set_delay(delay),
        )
        .await;
    }

    /// Serve an empty body with the given status code.
    pub async fn serve_status(&self, status: u16) {
        self.serve(ResponseTemplate::new(status)).await;
    }

    /// Serve a raw (possibly invalid) body with status 200.
    pub async fn serve_raw(&self, body: &str) {
        self.serve(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string(body),
        )
        .await;
    }

    /// Remove all mounted responses and forget recorded requests.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of requests the endpoint has received since start or last reset.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    async fn serve(&self, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }
}

/// Wrap JWKs in a key-set document.
pub fn jwks_document(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}
