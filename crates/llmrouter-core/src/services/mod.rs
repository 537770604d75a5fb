//! Service layer: the policy components described in the architecture
//! overview, wired together by [`router::Router`].
//!
//! # Module Organization
//!
//! - [`store`] - pluggable state backend (in-process today, Redis-shaped
//!   later) that [`circuit_breaker`], [`health`], and [`rate_limiter`] all
//!   read and write through
//! - [`registry`] - catalog snapshot with atomic reload
//! - [`health`] - rolling per-model success/latency stats
//! - [`circuit_breaker`] - per-model open/half-open/closed state machine
//! - [`rate_limiter`] - per-model token bucket
//! - [`selector`] - turns routing criteria + current state into one model
//! - [`provider`] - the adapter trait concrete upstream clients implement
//! - [`shutdown`] - in-flight tracking and the cancellation signal the
//!   router combines with a client's own
//! - [`router`] - the pipeline that ties all of the above together
//!
//! # Architecture
//!
//! ```text
//! Request → Router → Selector → Registry / CircuitBreaker / Health
//!                  → RateLimiter
//!                  → ProviderAdapter (retry, switch, fallback)
//! ```

pub mod circuit_breaker;
pub mod health;
pub mod provider;
pub mod rate_limiter;
pub mod registry;
pub mod router;
pub mod selector;
pub mod shutdown;
pub mod store;
