//! Shutdown Coordinator (C9): tracks in-flight requests and produces the
//! cancellation signal the router combines with any client-supplied token.
//!
//! This is one of the two process-wide singletons the design allows (the
//! other being the registry snapshot); everything else is passed in.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Rejects new registrations once shutdown has begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShuttingDown;

/// Tracks in-flight request count and owns the cancellation token that
/// aborts survivors once the drain timeout elapses.
///
/// Admission and abortion are deliberately two separate signals:
/// `shutting_down` flips the moment shutdown is requested (rejects new
/// work immediately), while `abort` only fires after the drain wait times
/// out, per §4.9: "waits up to shutdownTimeout for the counter to drain,
/// then asserts the cancellation token to abort survivors".
pub struct ShutdownCoordinator {
    in_flight: AtomicI64,
    shutting_down: AtomicBool,
    abort: CancellationToken,
    drained: Notify,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicI64::new(0),
            shutting_down: AtomicBool::new(false),
            abort: CancellationToken::new(),
            drained: Notify::new(),
        }
    }

    /// Registers one in-flight request. Fails with [`ShuttingDown`] once
    /// shutdown has begun, per §4.9: "rejects new work when shutting down".
    pub fn register_request(&self) -> Result<(), ShuttingDown> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(ShuttingDown);
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Unregisters one in-flight request, notifying a waiting `shutdown()`
    /// call once the counter reaches zero.
    pub fn unregister_request(&self) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining <= 0 {
            self.drained.notify_waiters();
        }
    }

    pub fn in_flight_count(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst).max(0)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// A fresh child token that aborts once the drain timeout elapses.
    /// Router combines this with any client-supplied token using
    /// logical-OR.
    pub fn create_request_signal(&self) -> CancellationToken {
        self.abort.child_token()
    }

    /// Begins shutdown: stops admitting new requests immediately, then
    /// waits up to `timeout` for in-flight requests to drain before
    /// asserting the cancellation token to abort survivors.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);

        if self.in_flight_count() > 0 {
            let wait = async {
                while self.in_flight_count() > 0 {
                    self.drained.notified().await;
                }
            };
            let _ = tokio::time::timeout(timeout, wait).await;
        }

        if self.in_flight_count() > 0 {
            self.abort.cancel();
        }
    }
}

/// Combines the shutdown signal with an optional client-supplied token: the
/// resulting token fires when either does (logical OR).
pub fn combined_signal(
    shutdown_signal: CancellationToken,
    client_signal: Option<CancellationToken>,
) -> CancellationToken {
    match client_signal {
        None => shutdown_signal,
        Some(client) => {
            let combined = CancellationToken::new();
            let combined_child = combined.clone();
            let a = shutdown_signal.clone();
            let b = client.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = a.cancelled() => {}
                    _ = b.cancelled() => {}
                }
                combined_child.cancel();
            });
            combined
        }
    }
}

pub fn shared() -> Arc<ShutdownCoordinator> {
    Arc::new(ShutdownCoordinator::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_fails_after_shutdown_begins() {
        let coord = ShutdownCoordinator::new();
        coord.shutting_down.store(true, Ordering::SeqCst);
        assert_eq!(coord.register_request(), Err(ShuttingDown));
    }

    #[tokio::test]
    async fn shutdown_returns_immediately_with_no_in_flight() {
        let coord = ShutdownCoordinator::new();
        let start = std::time::Instant::now();
        coord.shutdown(Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn shutdown_waits_for_drain_then_returns() {
        let coord = Arc::new(ShutdownCoordinator::new());
        coord.register_request().unwrap();

        let waiter = coord.clone();
        let handle = tokio::spawn(async move {
            waiter.shutdown(Duration::from_secs(5)).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        coord.unregister_request();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_times_out_and_asserts_signal_on_survivors() {
        let coord = ShutdownCoordinator::new();
        coord.register_request().unwrap();
        let signal = coord.create_request_signal();

        coord.shutdown(Duration::from_millis(10)).await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn survivor_signal_stays_armed_while_draining_within_budget() {
        // A request that finishes inside the timeout window must never see
        // its signal cancelled -- only timed-out survivors get aborted.
        let coord = Arc::new(ShutdownCoordinator::new());
        coord.register_request().unwrap();
        let signal = coord.create_request_signal();

        let waiter = coord.clone();
        let handle = tokio::spawn(async move {
            waiter.shutdown(Duration::from_secs(5)).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!signal.is_cancelled());
        coord.unregister_request();
        handle.await.unwrap();
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn combined_signal_fires_when_either_side_cancels() {
        let shutdown = CancellationToken::new();
        let client = CancellationToken::new();
        let combined = combined_signal(shutdown.clone(), Some(client.clone()));
        assert!(!combined.is_cancelled());
        client.cancel();
        combined.cancelled().await;
        assert!(combined.is_cancelled());
    }
}
