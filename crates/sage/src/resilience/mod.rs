//! Resilience primitives wrapping external call sites: a circuit breaker per
//! adapter and bounded retries for idempotent operations.

pub mod breaker;
pub mod retry;

pub use breaker::{BreakerState, CircuitBreaker};
pub use retry::{with_retry, RetryPolicy};
