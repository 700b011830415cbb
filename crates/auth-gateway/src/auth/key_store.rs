//! In-memory key store.
//!
//! Holds the current trusted key set behind an [`ArcSwap`]. Readers load a
//! snapshot without locking; a refresh builds a complete new [`KeySet`] and
//! swaps it in with one atomic store, so no reader ever observes a partially
//! updated set.

use crate::auth::keys::VerificationKey;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An immutable set of verification keys indexed by key ID.
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, Arc<VerificationKey>>,
    fetched_at: Option<Instant>,
}

impl KeySet {
    /// Empty set that has never been fetched. Always stale.
    pub fn empty() -> Self {
        Self {
            keys: HashMap::new(),
            fetched_at: None,
        }
    }

    /// Build a set from keys fetched at `fetched_at`.
    ///
    /// Key IDs are expected to be unique; the JWKS parser rejects duplicates
    /// before a set is built. If one slips through, the last key wins.
    pub fn new(keys: Vec<VerificationKey>, fetched_at: Instant) -> Self {
        let keys = keys
            .into_iter()
            .map(|key| (key.kid().to_string(), Arc::new(key)))
            .collect();
        Self {
            keys,
            fetched_at: Some(fetched_at),
        }
    }

    pub fn get(&self, kid: &str) -> Option<Arc<VerificationKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// Time since the fetch, or `None` if never fetched.
    pub fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|at| at.elapsed())
    }

    /// A set is fresh while its age is strictly below `ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age().is_some_and(|age| age < ttl)
    }

    /// Key IDs in the set, sorted.
    pub fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self.keys.keys().cloned().collect();
        kids.sort_unstable();
        kids
    }
}

/// Process-wide holder of the current [`KeySet`].
#[derive(Debug)]
pub struct KeyStore {
    current: ArcSwap<KeySet>,
}

impl KeyStore {
    /// A store holding an empty, never-fetched set.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(KeySet::empty()),
        }
    }

    /// Look up a key in the current set.
    pub fn get(&self, kid: &str) -> Option<Arc<VerificationKey>> {
        self.current.load().get(kid)
    }

    /// The whole current set.
    ///
    /// Callers that need to reason about freshness and membership together
    /// must use one snapshot for both.
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    /// Atomically replace the current set.
    pub fn replace(&self, set: KeySet) {
        let key_count = set.len();
        self.current.store(Arc::new(set));
        tracing::debug!(
            target: "gateway.auth.key_store",
            key_count = key_count,
            "Key set replaced"
        );
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::new()
    }
}
