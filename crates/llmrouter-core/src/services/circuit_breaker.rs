//! Circuit Breaker (C5): the four-state machine that gates admission for one
//! model, driven by [`crate::services::health`] and backed by the
//! [`crate::services::store::StateStore`].
//!
//! State lives in the store, not in this struct: the breaker is a stateless
//! set of operations over whatever [`ModelState`] the store currently holds,
//! so it composes cleanly with a remote store shared across replicas.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::models::error::ClassifiedError;
use crate::models::state::{now_millis, CircuitState, ModelState};

use super::store::StateStore;

/// Thresholds controlling state transitions. Defaults match §4.5 of the
/// design: three consecutive failures trips the breaker, a three-minute
/// cooldown allows a single probe, two consecutive successes closes it.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_period: Duration,
    pub success_threshold: u32,
    pub stats_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_period: Duration::from_secs(3 * 60),
            success_threshold: 2,
            stats_window: Duration::from_secs(10 * 60),
        }
    }
}

/// Per-model circuit breaker operating over a shared [`StateStore`].
///
/// Holds no private state of its own beyond the store handle and config, per
/// the design notes on cyclic references: everything is addressed by model
/// `name`, never by back-pointer.
pub struct CircuitBreaker {
    store: Arc<dyn StateStore>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(store: Arc<dyn StateStore>, config: CircuitBreakerConfig) -> Self {
        Self { store, config }
    }

    async fn load(&self, name: &str) -> ModelState {
        self.store.get(name).await.unwrap_or_default()
    }

    /// Applies `mutate` to the current state and writes it back with
    /// `compare_and_swap`, retrying if a concurrent writer raced ahead --
    /// the per-key atomicity §4.2 promises ("no lost updates") depends on
    /// this loop, not on the store's locking alone.
    async fn update<F>(&self, name: &str, mut mutate: F)
    where
        F: FnMut(&mut ModelState),
    {
        loop {
            let current = self.load(name).await;
            let mut next = current.clone();
            mutate(&mut next);
            if self.store.compare_and_swap(name, &current, next).await {
                return;
            }
        }
    }

    /// Read-only peek at a model's current circuit state and, if set, the
    /// reason it was marked permanently unavailable. Unlike [`Self::can_request`]
    /// this never performs the lazy `Open -> HalfOpen` transition, so it's
    /// safe for the admin surface to call without side effects.
    pub async fn state_snapshot(&self, name: &str) -> (CircuitState, Option<String>) {
        let state = self.load(name).await;
        (state.circuit_state, state.unavailable_reason)
    }

    /// `true` iff an admission attempt right now would be allowed. May
    /// perform the lazy `Open -> HalfOpen` transition as a side effect when
    /// the cooldown has elapsed, per §4.5: "the latter transition may occur
    /// lazily inside this call".
    pub async fn can_request(&self, name: &str) -> bool {
        loop {
            let state = self.load(name).await;
            match state.circuit_state {
                CircuitState::Closed | CircuitState::HalfOpen => return true,
                CircuitState::PermanentlyUnavailable => return false,
                CircuitState::Open => {
                    let opened_at = state.opened_at_millis.unwrap_or(0);
                    let elapsed = now_millis().saturating_sub(opened_at);
                    if elapsed as u128 >= self.config.cooldown_period.as_millis() {
                        let mut next = state.clone();
                        next.circuit_state = CircuitState::HalfOpen;
                        if self.store.compare_and_swap(name, &state, next).await {
                            info!(target: "llmrouter_core::circuit_breaker", "model '{}' entering HALF_OPEN after cooldown", name);
                            return true;
                        }
                        // lost the race to another reader; re-read and re-evaluate
                    } else {
                        return false;
                    }
                }
            }
        }
    }

    /// `available` models (operator flag already filtered by the caller)
    /// further narrowed to those `can_request` currently admits.
    pub async fn filter_available(
        &self,
        models: &[crate::models::catalog::ModelDefinition],
    ) -> Vec<crate::models::catalog::ModelDefinition> {
        let mut out = Vec::with_capacity(models.len());
        for m in models {
            if m.available && self.can_request(&m.name).await {
                out.push(m.clone());
            }
        }
        out
    }

    /// Records a successful attempt: resets `consecutive_failures`, advances
    /// `consecutive_successes`, and closes a `HalfOpen` breaker once
    /// `success_threshold` is reached.
    pub async fn on_success(&self, name: &str, latency_ms: u32) {
        let stats_window_ms = self.config.stats_window.as_millis() as u64;
        let success_threshold = self.config.success_threshold;
        let mut closed = false;
        self.update(name, |state| {
            state.consecutive_failures = 0;
            state.consecutive_successes += 1;
            state.record(true, latency_ms, stats_window_ms);

            closed = state.circuit_state == CircuitState::HalfOpen
                && state.consecutive_successes >= success_threshold;
            if closed {
                state.circuit_state = CircuitState::Closed;
                state.opened_at_millis = None;
            }
        })
        .await;
        if closed {
            info!(target: "llmrouter_core::circuit_breaker", "model '{}' closing circuit after {} consecutive successes", name, success_threshold);
        }
    }

    /// Records a failed attempt already classified by [`ClassifiedError`].
    /// `ClientError` and `Cancelled` never reach here from the router (the
    /// retry loop terminates before calling us for those kinds), but this is
    /// defensive: those two kinds are also no-ops if called directly. Every
    /// other kind -- including `RateLimit` -- always records a stats entry
    /// per §7 ("non-client errors always record to Health"); only the
    /// *circuit-breaker transition* is excepted for `RateLimit` (and given
    /// special handling for `NotFound`), not the stats bookkeeping.
    pub async fn on_failure(&self, name: &str, error: &ClassifiedError) {
        if matches!(
            error.kind,
            crate::models::error::ErrorKind::ClientError | crate::models::error::ErrorKind::Cancelled
        ) {
            return;
        }

        let stats_window_ms = self.config.stats_window.as_millis() as u64;
        let failure_threshold = self.config.failure_threshold;
        let is_not_found = matches!(error.kind, crate::models::error::ErrorKind::NotFound);
        let drives_transition = error.touches_circuit_breaker();

        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Transition {
            None,
            Opened(u32),
            Reopened,
            PermanentlyUnavailable,
        }
        let mut transition = Transition::None;

        self.update(name, |state| {
            state.record(false, 0, stats_window_ms);

            if is_not_found {
                state.circuit_state = CircuitState::PermanentlyUnavailable;
                state.unavailable_reason = Some(error.message.clone());
                transition = Transition::PermanentlyUnavailable;
                return;
            }

            if !drives_transition {
                // e.g. RateLimit: recorded above for Health, but doesn't
                // advance the failure streak or trip the breaker.
                return;
            }

            state.consecutive_failures += 1;
            state.consecutive_successes = 0;

            match state.circuit_state {
                CircuitState::Closed if state.consecutive_failures >= failure_threshold => {
                    state.circuit_state = CircuitState::Open;
                    state.opened_at_millis = Some(now_millis());
                    transition = Transition::Opened(state.consecutive_failures);
                }
                CircuitState::HalfOpen => {
                    state.circuit_state = CircuitState::Open;
                    state.opened_at_millis = Some(now_millis());
                    transition = Transition::Reopened;
                }
                _ => transition = Transition::None,
            }
        })
        .await;

        match transition {
            Transition::PermanentlyUnavailable => {
                warn!(target: "llmrouter_core::circuit_breaker", "model '{}' permanently unavailable: {}", name, error.message);
            }
            Transition::Opened(failures) => {
                warn!(target: "llmrouter_core::circuit_breaker", "model '{}' opening circuit after {} consecutive failures", name, failures);
            }
            Transition::Reopened => {
                warn!(target: "llmrouter_core::circuit_breaker", "model '{}' reopening circuit: probe failed", name);
            }
            Transition::None => {}
        }
    }

    /// Operator reset: unconditionally returns the model to `Closed` with
    /// zeroed counters, including out of `PermanentlyUnavailable`.
    pub async fn reset(&self, name: &str) {
        self.store.put(name, ModelState::default()).await;
        info!(target: "llmrouter_core::circuit_breaker", "model '{}' reset to CLOSED by operator", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::{ModelDefinition, ModelKind};
    use crate::models::error::ClassifiedError;
    use crate::services::store::InMemoryStateStore;
    use std::collections::BTreeSet;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            InMemoryStateStore::new(),
            CircuitBreakerConfig {
                failure_threshold: 3,
                cooldown_period: Duration::from_millis(50),
                success_threshold: 2,
                stats_window: Duration::from_secs(600),
            },
        )
    }

    fn model(name: &str) -> ModelDefinition {
        ModelDefinition {
            name: name.into(),
            provider: "groq".into(),
            model: "upstream".into(),
            kind: ModelKind::Fast,
            context_size: 8192,
            max_output_tokens: 2048,
            tags: BTreeSet::new(),
            json_response: false,
            supports_image: false,
            supports_video: false,
            supports_audio: false,
            supports_file: false,
            supports_tools: false,
            available: true,
            weight: 1,
            priority: None,
        }
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let cb = breaker();
        let err = ClassifiedError::other("boom");
        for _ in 0..3 {
            cb.on_failure("a", &err).await;
        }
        assert!(!cb.can_request("a").await);
    }

    #[tokio::test]
    async fn concurrent_failures_are_not_lost() {
        let cb = std::sync::Arc::new(CircuitBreaker::new(
            InMemoryStateStore::new(),
            CircuitBreakerConfig {
                failure_threshold: 100,
                cooldown_period: Duration::from_secs(600),
                success_threshold: 2,
                stats_window: Duration::from_secs(600),
            },
        ));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let cb = cb.clone();
            handles.push(tokio::spawn(async move {
                cb.on_failure("a", &ClassifiedError::other("boom")).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let state = cb.load("a").await;
        assert_eq!(state.consecutive_failures, 20);
        assert_eq!(state.total_requests(), 20);
    }

    #[tokio::test]
    async fn half_opens_after_cooldown_then_closes_on_successes() {
        let cb = breaker();
        let err = ClassifiedError::other("boom");
        for _ in 0..3 {
            cb.on_failure("a", &err).await;
        }
        assert!(!cb.can_request("a").await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cb.can_request("a").await);

        cb.on_success("a", 10).await;
        cb.on_success("a", 10).await;

        let state = cb.load("a").await;
        assert_eq!(state.circuit_state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens() {
        let cb = breaker();
        let err = ClassifiedError::other("boom");
        for _ in 0..3 {
            cb.on_failure("a", &err).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cb.can_request("a").await);
        cb.on_failure("a", &err).await;
        assert!(!cb.can_request("a").await);
    }

    #[tokio::test]
    async fn not_found_is_permanent_and_survives_reset_attempts_without_operator() {
        let cb = breaker();
        let err = ClassifiedError::from_status(404, "gone");
        cb.on_failure("a", &err).await;
        assert!(!cb.can_request("a").await);
        // A second 404 "re-affirms but does not re-count" -- still permanent.
        cb.on_failure("a", &err).await;
        assert!(!cb.can_request("a").await);

        cb.reset("a").await;
        assert!(cb.can_request("a").await);
    }

    #[tokio::test]
    async fn client_errors_never_touch_the_breaker() {
        let cb = breaker();
        let err = ClassifiedError::from_status(400, "bad request");
        for _ in 0..10 {
            cb.on_failure("a", &err).await;
        }
        assert!(cb.can_request("a").await);
        let state = cb.load("a").await;
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.total_requests(), 0);
    }

    #[tokio::test]
    async fn rate_limit_records_stats_but_never_trips_the_breaker() {
        let cb = breaker();
        let err = ClassifiedError::from_status(429, "slow down");
        for _ in 0..10 {
            cb.on_failure("a", &err).await;
        }
        assert!(cb.can_request("a").await);
        let state = cb.load("a").await;
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.total_requests(), 10);
        assert_eq!(state.error_count(), 10);
    }

    #[tokio::test]
    async fn filter_available_drops_operator_disabled_models() {
        let cb = breaker();
        let mut disabled = model("b");
        disabled.available = false;
        let models = vec![model("a"), disabled];
        let filtered = cb.filter_available(&models).await;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "a");
    }
}
