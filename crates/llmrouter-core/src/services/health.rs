//! Health & Stats (C4): derives the counters the selector scores on and the
//! circuit breaker decides on, from the sliding window each [`ModelState`]
//! already maintains.
//!
//! This module intentionally owns no state: [`ModelState::record`] and its
//! derived-counter methods do the real work (see [`crate::models::state`]).
//! `HealthView` is a convenience snapshot for callers -- the selector and
//! the admin surface -- that want all of a model's derived numbers at once
//! without re-deriving them inline.

use std::sync::Arc;

use crate::models::state::ModelState;

use super::store::StateStore;

/// A point-in-time snapshot of one model's derived health counters, read
/// from the state store. Cheap to recompute; never cached beyond one call.
#[derive(Debug, Clone)]
pub struct HealthView {
    pub total_requests: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub success_rate: f64,
    pub lifetime_total_requests: u64,
}

impl HealthView {
    fn from_state(state: &ModelState) -> Self {
        Self {
            total_requests: state.total_requests(),
            success_count: state.success_count(),
            error_count: state.error_count(),
            avg_latency_ms: state.avg_latency_ms(),
            p95_latency_ms: state.p95_latency_ms(),
            success_rate: state.success_rate(),
            lifetime_total_requests: state.lifetime_total_requests,
        }
    }
}

/// Reads derived health counters for models out of a shared [`StateStore`].
pub struct HealthTracker {
    store: Arc<dyn StateStore>,
}

impl HealthTracker {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub async fn view(&self, name: &str) -> HealthView {
        let state = self.store.get(name).await.unwrap_or_default();
        HealthView::from_state(&state)
    }

    pub async fn views(&self) -> Vec<(String, HealthView)> {
        self.store
            .list()
            .await
            .into_iter()
            .map(|(name, state)| (name, HealthView::from_state(&state)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStateStore;

    #[tokio::test]
    async fn view_of_unknown_model_is_empty_and_rate_is_one() {
        let store = InMemoryStateStore::new();
        let tracker = HealthTracker::new(store);
        let view = tracker.view("ghost").await;
        assert_eq!(view.total_requests, 0);
        assert_eq!(view.success_rate, 1.0);
    }

    #[tokio::test]
    async fn view_reflects_recorded_outcomes() {
        let store = InMemoryStateStore::new();
        let mut state = ModelState::default();
        state.record(true, 100, 600_000);
        state.record(false, 0, 600_000);
        store.put("a", state).await;

        let tracker = HealthTracker::new(store);
        let view = tracker.view("a").await;
        assert_eq!(view.total_requests, 2);
        assert_eq!(view.success_count, 1);
        assert_eq!(view.error_count, 1);
        assert!((view.success_rate - 0.5).abs() < f64::EPSILON);
    }
}
