//! Rate Limiter (C6): a per-model token bucket, independent of the circuit
//! breaker. Admission here is a separate gate from health -- a perfectly
//! healthy model can still be over its configured requests-per-minute.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// One model's bucket: `capacity` tokens, refilled continuously at
/// `refill_per_sec`. `checkModel` is a non-blocking try-acquire of a single
/// token -- callers never wait on this gate, they either proceed or switch.
struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl TokenBucket {
    fn new(capacity: u32) -> Self {
        let now = Instant::now();
        Self {
            capacity: capacity as f64,
            refill_per_sec: capacity as f64 / 60.0,
            tokens: capacity as f64,
            last_refill: now,
            last_used: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        self.refill(now);
        self.last_used = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-model admission gate. Buckets are created lazily on first use of a
/// model name and pruned when idle beyond `stale_bucket_threshold`.
///
/// When `requests_per_minute` is `None` the limiter is disabled entirely:
/// `check_model` always returns `true` and no buckets are ever created.
pub struct RateLimiter {
    requests_per_minute: Option<u32>,
    stale_bucket_threshold: Duration,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: Option<u32>) -> Self {
        Self {
            requests_per_minute,
            stale_bucket_threshold: Duration::from_secs(30 * 60),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_bucket_threshold = threshold;
        self
    }

    /// Non-blocking try-acquire of one token for `name`. Always `true` when
    /// the limiter is disabled.
    pub fn check_model(&self, name: &str) -> bool {
        let Some(capacity) = self.requests_per_minute else {
            return true;
        };
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets
            .entry(name.to_string())
            .or_insert_with(|| TokenBucket::new(capacity));
        bucket.try_acquire()
    }

    /// Drops buckets idle longer than the stale threshold. Intended to be
    /// driven by a periodic background sweeper in the gateway binary.
    pub fn prune_stale(&self) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap();
        buckets.retain(|_, b| now.duration_since(b.last_used) < self.stale_bucket_threshold);
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_limiter_always_admits() {
        let rl = RateLimiter::new(None);
        for _ in 0..1000 {
            assert!(rl.check_model("a"));
        }
    }

    #[test]
    fn k_immediate_acquires_with_capacity_c_yield_min_k_c_grants() {
        let rl = RateLimiter::new(Some(3));
        let mut granted = 0;
        for _ in 0..5 {
            if rl.check_model("a") {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
    }

    #[test]
    fn buckets_are_independent_per_model() {
        let rl = RateLimiter::new(Some(1));
        assert!(rl.check_model("a"));
        assert!(!rl.check_model("a"));
        assert!(rl.check_model("b"));
    }

    #[test]
    fn prune_stale_drops_idle_buckets() {
        let rl = RateLimiter::new(Some(1)).with_stale_threshold(Duration::from_millis(10));
        rl.check_model("a");
        assert_eq!(rl.bucket_count(), 1);
        std::thread::sleep(Duration::from_millis(20));
        rl.prune_stale();
        assert_eq!(rl.bucket_count(), 0);
    }

    #[test]
    fn refills_over_time() {
        let rl = RateLimiter::new(Some(6000)); // 100 tokens/sec
        assert!(rl.check_model("a"));
        std::thread::sleep(Duration::from_millis(20));
        // enough real time elapsed for at least one token to refill
        assert!(rl.check_model("a"));
    }
}
