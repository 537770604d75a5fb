//! State Store (C2): key-addressed persistence of per-model [`ModelState`],
//! pluggable between a process-local map and a remote KV.
//!
//! All mutations are atomic per key. The in-memory implementation uses a
//! sharded lock map; it is the default and what the test suite exercises.
//! A remote implementation (Redis-compatible) would implement the same
//! trait using `WATCH`/`SET ... XX`-style compare-and-swap and is not
//! shipped here, but the trait boundary is designed so the Router and
//! Selector never know which backs them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::models::state::ModelState;

/// Persists [`ModelState`] keyed by model name, with per-key atomicity.
///
/// Implementations provide *at-least-once* visibility: a reader may observe
/// a slightly stale value under concurrent writers, but no write is lost.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, name: &str) -> Option<ModelState>;

    async fn put(&self, name: &str, state: ModelState);

    /// Atomically replaces the stored value only if it currently equals
    /// `expected` (compared via the circuit state and counters, not a raw
    /// byte match). Returns `true` if the swap took place.
    async fn compare_and_swap(
        &self,
        name: &str,
        expected: &ModelState,
        new: ModelState,
    ) -> bool;

    async fn list(&self) -> Vec<(String, ModelState)>;

    async fn delete(&self, name: &str);

    /// Monotonic counter of fallback invocations, used by the admin surface.
    async fn record_fallback_usage(&self) -> u64;

    async fn fallback_usage_count(&self) -> u64;
}

#[derive(Default)]
struct Inner {
    states: HashMap<String, ModelState>,
    fallback_count: u64,
}

/// Process-local [`StateStore`] backed by a single `RwLock`-guarded map.
///
/// A single lock is sufficient here: model counts are small (tens to low
/// hundreds) and critical sections are short field mutations, not I/O.
pub struct InMemoryStateStore {
    inner: RwLock<Inner>,
}

impl InMemoryStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner::default()),
        })
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

fn states_equivalent(a: &ModelState, b: &ModelState) -> bool {
    a.circuit_state == b.circuit_state
        && a.consecutive_failures == b.consecutive_failures
        && a.consecutive_successes == b.consecutive_successes
        && a.lifetime_total_requests == b.lifetime_total_requests
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, name: &str) -> Option<ModelState> {
        self.inner.read().unwrap().states.get(name).cloned()
    }

    async fn put(&self, name: &str, state: ModelState) {
        self.inner
            .write()
            .unwrap()
            .states
            .insert(name.to_string(), state);
    }

    async fn compare_and_swap(&self, name: &str, expected: &ModelState, new: ModelState) -> bool {
        let mut guard = self.inner.write().unwrap();
        // A key with no entry yet reads as `ModelState::default()` (see
        // `CircuitBreaker::load`), so an absent key must match an `expected`
        // of `ModelState::default()` -- otherwise the very first CAS against
        // a never-`put` model can never succeed and the retry loop in
        // `CircuitBreaker::update` spins forever.
        let matches = match guard.states.get(name) {
            Some(current) => states_equivalent(current, expected),
            None => states_equivalent(&ModelState::default(), expected),
        };
        if matches {
            guard.states.insert(name.to_string(), new);
        }
        matches
    }

    async fn list(&self) -> Vec<(String, ModelState)> {
        self.inner
            .read()
            .unwrap()
            .states
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    async fn delete(&self, name: &str) {
        self.inner.write().unwrap().states.remove(name);
    }

    async fn record_fallback_usage(&self) -> u64 {
        let mut guard = self.inner.write().unwrap();
        guard.fallback_count += 1;
        guard.fallback_count
    }

    async fn fallback_usage_count(&self) -> u64 {
        self.inner.read().unwrap().fallback_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryStateStore::new();
        let state = ModelState::default();
        store.put("a", state.clone()).await;
        let got = store.get("a").await.unwrap();
        assert_eq!(got.circuit_state, state.circuit_state);
    }

    #[tokio::test]
    async fn compare_and_swap_fails_on_mismatch() {
        let store = InMemoryStateStore::new();
        store.put("a", ModelState::default()).await;
        let mut stale = ModelState::default();
        stale.consecutive_failures = 5;
        let swapped = store
            .compare_and_swap("a", &stale, ModelState::default())
            .await;
        assert!(!swapped);
    }

    #[tokio::test]
    async fn compare_and_swap_succeeds_on_match() {
        let store = InMemoryStateStore::new();
        store.put("a", ModelState::default()).await;
        let expected = ModelState::default();
        let mut new_state = ModelState::default();
        new_state.consecutive_failures = 1;
        let swapped = store.compare_and_swap("a", &expected, new_state).await;
        assert!(swapped);
        assert_eq!(store.get("a").await.unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn fallback_usage_counter_is_monotonic() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.record_fallback_usage().await, 1);
        assert_eq!(store.record_fallback_usage().await, 2);
        assert_eq!(store.fallback_usage_count().await, 2);
    }
}
