//! Runtime state kept per model: circuit state, sliding-window stats, and
//! the derived health counters the selector and circuit breaker read.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Four-valued health label controlling admission for a model.
///
/// `PermanentlyUnavailable` is terminal: unlike `Open`, nothing but an
/// operator reset moves a model back out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
    PermanentlyUnavailable,
}

impl Default for CircuitState {
    fn default() -> Self {
        CircuitState::Closed
    }
}

/// One outcome record kept in the sliding window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatEntry {
    pub ts_millis: u64,
    pub success: bool,
    pub latency_ms: u32,
}

/// Runtime state for one model, addressed by `name` in the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelState {
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub opened_at_millis: Option<u64>,
    pub unavailable_reason: Option<String>,

    pub window: VecDeque<StatEntry>,
    pub lifetime_total_requests: u64,
}

impl Default for ModelState {
    fn default() -> Self {
        Self {
            circuit_state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at_millis: None,
            unavailable_reason: None,
            window: VecDeque::new(),
            lifetime_total_requests: 0,
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl ModelState {
    /// Drops window entries older than `window_ms`, keeping the newest last.
    pub fn prune(&mut self, window_ms: u64) {
        let cutoff = now_millis().saturating_sub(window_ms);
        while let Some(front) = self.window.front() {
            if front.ts_millis < cutoff {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn record(&mut self, success: bool, latency_ms: u32, window_ms: u64) {
        self.window.push_back(StatEntry {
            ts_millis: now_millis(),
            success,
            latency_ms,
        });
        self.lifetime_total_requests += 1;
        self.prune(window_ms);
    }

    pub fn success_count(&self) -> usize {
        self.window.iter().filter(|e| e.success).count()
    }

    pub fn error_count(&self) -> usize {
        self.window.iter().filter(|e| !e.success).count()
    }

    pub fn total_requests(&self) -> usize {
        self.window.len()
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 1.0;
        }
        self.success_count() as f64 / total as f64
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let successes: Vec<u32> = self
            .window
            .iter()
            .filter(|e| e.success)
            .map(|e| e.latency_ms)
            .collect();
        if successes.is_empty() {
            return 0.0;
        }
        successes.iter().copied().sum::<u32>() as f64 / successes.len() as f64
    }

    /// Nearest-rank 95th percentile latency over successes in the window.
    pub fn p95_latency_ms(&self) -> f64 {
        let mut successes: Vec<u32> = self
            .window
            .iter()
            .filter(|e| e.success)
            .map(|e| e.latency_ms)
            .collect();
        if successes.is_empty() {
            return 0.0;
        }
        successes.sort_unstable();
        let rank = ((successes.len() as f64) * 0.95).ceil() as usize;
        let idx = rank.saturating_sub(1).min(successes.len() - 1);
        successes[idx] as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_one_when_window_empty() {
        let s = ModelState::default();
        assert_eq!(s.success_rate(), 1.0);
    }

    #[test]
    fn records_accumulate_lifetime_total() {
        let mut s = ModelState::default();
        s.record(true, 10, 600_000);
        s.record(false, 20, 600_000);
        assert_eq!(s.lifetime_total_requests, 2);
        assert_eq!(s.total_requests(), 2);
        assert_eq!(s.success_count(), 1);
        assert_eq!(s.error_count(), 1);
        assert!((s.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn p95_of_single_entry_is_that_entry() {
        let mut s = ModelState::default();
        s.record(true, 123, 600_000);
        assert_eq!(s.p95_latency_ms(), 123.0);
    }
}
