//! Key resolver integration tests.
//!
//! Exercises refresh coalescing, timeouts, cancellation and cache behaviour
//! against a mocked JWKS endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use auth_gateway::auth::KeyResolver;
use auth_gateway::config::GatewayConfig;
use auth_gateway::errors::KeyResolutionError;
use futures::future::join_all;
use gateway_test_utils::{
    MockJwksServer, TestEd25519Key, TestSigningKey, TEST_AUDIENCE, TEST_ISSUER,
};
use std::sync::Arc;
use std::time::Duration;

fn config_for(jwks: &MockJwksServer) -> GatewayConfig {
    GatewayConfig::new(jwks.jwks_url(), TEST_ISSUER, TEST_AUDIENCE)
        .with_fetch_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_concurrent_misses_trigger_one_fetch() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys_with_delay(&[k1.jwk()], Duration::from_millis(200))
        .await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));

    let results = join_all((0..32).map(|_| resolver.resolve("k1"))).await;

    for result in results {
        assert_eq!(result.unwrap().kid(), "k1");
    }
    assert_eq!(jwks.fetch_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_misses_for_different_kids_share_fetch() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    let k2 = TestEd25519Key::new(2, "k2");
    jwks.serve_keys_with_delay(&[k1.jwk(), k2.jwk()], Duration::from_millis(200))
        .await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));

    let mut handles = Vec::new();
    for i in 0..16 {
        let resolver = resolver.clone();
        let kid = match i % 3 {
            0 => "k1",
            1 => "k2",
            _ => "k3",
        };
        handles.push(tokio::spawn(async move { (kid, resolver.resolve(kid).await) }));
    }

    for handle in handles {
        let (kid, result) = handle.await.unwrap();
        match kid {
            "k3" => assert_eq!(result.unwrap_err(), KeyResolutionError::NotFound),
            _ => assert_eq!(result.unwrap().kid(), kid),
        }
    }
    assert_eq!(jwks.fetch_count().await, 1);
}

#[tokio::test]
async fn test_timeout_reported_to_every_waiter() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys_with_delay(&[k1.jwk()], Duration::from_secs(2))
        .await;

    let config = config_for(&jwks).with_fetch_timeout(Duration::from_millis(100));
    let resolver = KeyResolver::from_config(&config);

    let results = join_all((0..8).map(|_| resolver.resolve("k1"))).await;

    for result in results {
        assert_eq!(result.unwrap_err(), KeyResolutionError::Timeout);
    }
    assert!(resolver.key_store().snapshot().is_empty());
}

#[tokio::test]
async fn test_cancelled_caller_does_not_cancel_fetch() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys_with_delay(&[k1.jwk()], Duration::from_millis(200))
        .await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));

    // Caller gives up long before the fetch completes
    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), resolver.resolve("k1")).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(resolver.key_store().get("k1").is_some());
    assert_eq!(resolver.resolve("k1").await.unwrap().kid(), "k1");
    assert_eq!(jwks.fetch_count().await, 1);
}

#[tokio::test]
async fn test_waiter_joining_late_gets_same_result() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys_with_delay(&[k1.jwk()], Duration::from_millis(200))
        .await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));

    let early = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve("k1").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let late = resolver.resolve("k1").await;

    assert!(early.await.unwrap().is_ok());
    assert!(late.is_ok());
    assert_eq!(jwks.fetch_count().await, 1);
}

#[tokio::test]
async fn test_fresh_set_served_from_cache() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys(&[k1.jwk()]).await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));

    for _ in 0..10 {
        resolver.resolve("k1").await.unwrap();
    }
    assert_eq!(jwks.fetch_count().await, 1);
}

#[tokio::test]
async fn test_stale_set_refetched() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys(&[k1.jwk()]).await;

    let config = config_for(&jwks).with_cache_ttl(Duration::from_millis(100));
    let resolver = KeyResolver::from_config(&config);

    resolver.resolve("k1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    resolver.resolve("k1").await.unwrap();

    assert_eq!(jwks.fetch_count().await, 2);
}

#[tokio::test]
async fn test_failed_refresh_keeps_stale_keys() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys(&[k1.jwk()]).await;

    let config = config_for(&jwks).with_cache_ttl(Duration::from_millis(100));
    let resolver = KeyResolver::from_config(&config);
    resolver.resolve("k1").await.unwrap();
    let before = resolver.key_store().snapshot();

    jwks.reset().await;
    jwks.serve_raw("not json").await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(matches!(
        resolver.resolve("k1").await,
        Err(KeyResolutionError::FetchFailed(_))
    ));
    assert!(Arc::ptr_eq(&before, &resolver.key_store().snapshot()));

    // Endpoint recovers, next request refreshes
    jwks.reset().await;
    jwks.serve_keys(&[k1.jwk()]).await;
    assert!(resolver.resolve("k1").await.is_ok());
    assert!(!Arc::ptr_eq(&before, &resolver.key_store().snapshot()));
}

#[tokio::test]
async fn test_invalid_entry_rejects_whole_key_set() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    let mut broken = TestEd25519Key::new(2, "k2").jwk();
    broken["crv"] = serde_json::json!("X448");
    jwks.serve_keys(&[k1.jwk(), broken]).await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));

    assert!(matches!(
        resolver.resolve("k1").await,
        Err(KeyResolutionError::FetchFailed(_))
    ));
    assert!(resolver.key_store().snapshot().is_empty());
}

#[tokio::test]
async fn test_min_refresh_interval_limits_unknown_kid_fetches() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys(&[k1.jwk()]).await;

    let config = config_for(&jwks).with_min_refresh_interval(Duration::from_secs(60));
    let resolver = KeyResolver::from_config(&config);
    resolver.resolve("k1").await.unwrap();

    for i in 0..5 {
        assert_eq!(
            resolver.resolve(&format!("unknown-{i}")).await.unwrap_err(),
            KeyResolutionError::NotFound
        );
    }
    assert_eq!(jwks.fetch_count().await, 1);
}

#[tokio::test]
async fn test_unknown_kid_refetches_without_floor() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys(&[k1.jwk()]).await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));
    resolver.resolve("k1").await.unwrap();

    assert_eq!(
        resolver.resolve("unknown").await.unwrap_err(),
        KeyResolutionError::NotFound
    );
    assert_eq!(jwks.fetch_count().await, 2);
}

#[tokio::test]
async fn test_warm_up_populates_store() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    jwks.serve_keys(&[k1.jwk()]).await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));
    resolver.warm_up().await;

    assert_eq!(resolver.key_store().snapshot().kids(), vec!["k1"]);
    resolver.resolve("k1").await.unwrap();
    assert_eq!(jwks.fetch_count().await, 1);
}

#[tokio::test]
async fn test_warm_up_tolerates_unreachable_endpoint() {
    let jwks = MockJwksServer::start().await;
    jwks.serve_status(503).await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));
    resolver.warm_up().await;

    assert!(resolver.key_store().snapshot().is_empty());
}

#[tokio::test]
async fn test_force_refresh_picks_up_new_keys() {
    let jwks = MockJwksServer::start().await;
    let k1 = TestEd25519Key::new(1, "k1");
    let k2 = TestEd25519Key::new(2, "k2");
    jwks.serve_keys(&[k1.jwk()]).await;

    let resolver = KeyResolver::from_config(&config_for(&jwks));
    resolver.resolve("k1").await.unwrap();

    jwks.reset().await;
    jwks.serve_keys(&[k1.jwk(), k2.jwk()]).await;
    resolver.force_refresh().await.unwrap();

    assert_eq!(resolver.key_store().snapshot().kids(), vec!["k1", "k2"]);
}
