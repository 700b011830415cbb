//! Key resolution with on-demand refresh.
//!
//! [`KeyResolver::resolve`] answers from the [`KeyStore`] while the held set is
//! fresh. On a miss or a stale set it refreshes from its [`KeySetSource`].
//!
//! # Refresh coalescing
//!
//! At most one refresh runs at a time. The refresh is a spawned task that
//! publishes its outcome on a `watch` channel; every caller that needs a
//! refresh while one is running subscribes to that channel instead of starting
//! another fetch. Because the fetch runs in its own task, a caller that is
//! cancelled while waiting does not cancel the fetch; it still completes and
//! populates the store for later callers.
//!
//! The gate is a `std::sync::Mutex` held only to inspect or install the
//! in-flight receiver, never across an await.

use crate::auth::jwks::{HttpKeySetSource, KeySetSource};
use crate::auth::key_store::{KeySet, KeyStore};
use crate::auth::keys::VerificationKey;
use crate::config::GatewayConfig;
use crate::errors::KeyResolutionError;
use crate::observability::metrics;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{instrument, Instrument};

/// Default cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default deadline for one key-set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// `None` until the refresh finishes.
type RefreshOutcome = Option<Result<(), KeyResolutionError>>;
type InFlight = Arc<Mutex<Option<watch::Receiver<RefreshOutcome>>>>;

/// Resolves key IDs to verification keys, refreshing the store as needed.
///
/// Cheap to clone; clones share the store and the refresh gate.
#[derive(Clone)]
pub struct KeyResolver {
    store: Arc<KeyStore>,
    source: Arc<dyn KeySetSource>,
    in_flight: InFlight,
    cache_ttl: Duration,
    fetch_timeout: Duration,
    min_refresh_interval: Duration,
}

impl KeyResolver {
    /// Create a resolver over `store` fed by `source`.
    ///
    /// Uses [`DEFAULT_FETCH_TIMEOUT`] and no miss-refresh floor.
    pub fn new(store: Arc<KeyStore>, source: Arc<dyn KeySetSource>, cache_ttl: Duration) -> Self {
        Self {
            store,
            source,
            in_flight: Arc::new(Mutex::new(None)),
            cache_ttl,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            min_refresh_interval: Duration::ZERO,
        }
    }

    /// Resolver with an empty store and an HTTP source, configured from
    /// `config`.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let source = HttpKeySetSource::new(config.jwks_url.clone(), config.jwks_fetch_timeout);
        Self::new(
            Arc::new(KeyStore::new()),
            Arc::new(source),
            config.jwks_cache_ttl,
        )
        .with_fetch_timeout(config.jwks_fetch_timeout)
        .with_min_refresh_interval(config.jwks_min_refresh_interval)
    }

    /// Deadline for one fetch; exceeding it yields `Timeout` for every waiter.
    #[must_use]
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// While a fresh set is younger than this, a missing key ID is reported as
    /// `NotFound` without refetching.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    /// Resolve `kid` to a verification key.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `kid` is absent after the set has been refreshed, or
    ///   absent from a set refreshed within the miss-refresh floor
    /// - `FetchFailed` if a needed refresh failed; the previous set is kept
    /// - `Timeout` if a needed refresh exceeded the fetch timeout
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Arc<VerificationKey>, KeyResolutionError> {
        let snapshot = self.store.snapshot();
        let fresh = snapshot.is_fresh(self.cache_ttl);

        match snapshot.get(kid) {
            Some(key) if fresh => {
                metrics::record_jwks_cache_lookup("hit");
                tracing::debug!(target: "gateway.auth.resolver", kid = %kid, "Key cache hit");
                return Ok(key);
            }
            Some(_) => {
                metrics::record_jwks_cache_lookup("stale");
                tracing::debug!(target: "gateway.auth.resolver", kid = %kid, "Key set stale, refreshing");
            }
            None => {
                metrics::record_jwks_cache_lookup("miss");
                if fresh && self.within_refresh_floor(&snapshot) {
                    tracing::debug!(
                        target: "gateway.auth.resolver",
                        kid = %kid,
                        "Key not in recently refreshed set"
                    );
                    return Err(KeyResolutionError::NotFound);
                }
                tracing::debug!(target: "gateway.auth.resolver", kid = %kid, "Key cache miss, refreshing");
            }
        }

        self.refresh_from(&snapshot).await?;

        self.store.get(kid).ok_or_else(|| {
            tracing::warn!(target: "gateway.auth.resolver", kid = %kid, "Key not found in key set after refresh");
            KeyResolutionError::NotFound
        })
    }

    /// Refresh the key set now, joining a refresh already in flight.
    ///
    /// # Errors
    ///
    /// `FetchFailed` or `Timeout` from the fetch. The previous set is kept.
    pub async fn force_refresh(&self) -> Result<(), KeyResolutionError> {
        let snapshot = self.store.snapshot();
        self.refresh_from(&snapshot).await
    }

    /// Initial fetch at startup. A failure is logged and otherwise ignored;
    /// the first request that needs a key retries.
    pub async fn warm_up(&self) {
        match self.force_refresh().await {
            Ok(()) => tracing::info!(
                target: "gateway.auth.resolver",
                key_count = self.store.snapshot().len(),
                "Key set warmed up"
            ),
            Err(e) => tracing::warn!(
                target: "gateway.auth.resolver",
                error = %e,
                "Key set warm-up failed, will retry on demand"
            ),
        }
    }

    fn within_refresh_floor(&self, snapshot: &KeySet) -> bool {
        !self.min_refresh_interval.is_zero()
            && snapshot
                .age()
                .is_some_and(|age| age < self.min_refresh_interval)
    }

    /// Ensure the store holds a set newer than `observed`, fetching if needed.
    async fn refresh_from(&self, observed: &Arc<KeySet>) -> Result<(), KeyResolutionError> {
        let rx = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(rx) = slot.as_ref() {
                tracing::debug!(target: "gateway.auth.resolver", "Joining in-flight refresh");
                rx.clone()
            } else if !Arc::ptr_eq(&self.store.snapshot(), observed) {
                // Another refresh completed after our snapshot was taken
                return Ok(());
            } else {
                let (tx, rx) = watch::channel(None);
                *slot = Some(rx.clone());
                self.spawn_refresh(tx);
                rx
            }
        };

        wait_for_outcome(rx).await
    }

    fn spawn_refresh(&self, tx: watch::Sender<RefreshOutcome>) {
        let store = Arc::clone(&self.store);
        let source = Arc::clone(&self.source);
        let guard = ClearInFlight(Arc::clone(&self.in_flight));
        let fetch_timeout = self.fetch_timeout;

        tokio::spawn(
            async move {
                let outcome = run_refresh(&store, source.as_ref(), fetch_timeout).await;
                // Clear the gate before publishing so late arrivals see the new set
                drop(guard);
                tx.send_replace(Some(outcome));
            }
            .instrument(tracing::debug_span!("jwks_refresh")),
        );
    }
}

/// Clears the in-flight slot when the refresh task ends, including by panic
/// or runtime shutdown.
struct ClearInFlight(InFlight);

impl Drop for ClearInFlight {
    fn drop(&mut self) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

async fn wait_for_outcome(
    mut rx: watch::Receiver<RefreshOutcome>,
) -> Result<(), KeyResolutionError> {
    match rx.wait_for(Option::is_some).await {
        Ok(outcome) => (*outcome).clone().unwrap_or_else(|| {
            Err(KeyResolutionError::FetchFailed(
                "refresh finished without an outcome".to_string(),
            ))
        }),
        Err(_) => {
            tracing::error!(target: "gateway.auth.resolver", "Key set refresh task ended unexpectedly");
            Err(KeyResolutionError::FetchFailed(
                "refresh task ended unexpectedly".to_string(),
            ))
        }
    }
}

async fn run_refresh(
    store: &KeyStore,
    source: &dyn KeySetSource,
    fetch_timeout: Duration,
) -> Result<(), KeyResolutionError> {
    let start = Instant::now();

    let result = match tokio::time::timeout(fetch_timeout, source.fetch_keys()).await {
        Ok(result) => result,
        Err(_) => Err(KeyResolutionError::Timeout),
    };

    match result {
        Ok(keys) => {
            let key_count = keys.len();
            store.replace(KeySet::new(keys, Instant::now()));
            metrics::set_jwks_key_count(key_count);
            metrics::record_jwks_refresh("success", start.elapsed());
            tracing::info!(
                target: "gateway.auth.resolver",
                key_count = key_count,
                "Key set refreshed"
            );
            Ok(())
        }
        Err(e) => {
            let status = if e == KeyResolutionError::Timeout {
                "timeout"
            } else {
                "error"
            };
            metrics::record_jwks_refresh(status, start.elapsed());
            tracing::warn!(
                target: "gateway.auth.resolver",
                error = %e,
                retained_keys = store.snapshot().len(),
                "Key set refresh failed, keeping previous set"
            );
            Err(e)
        }
    }
}
