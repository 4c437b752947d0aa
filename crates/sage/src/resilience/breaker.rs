//! Circuit breaker for external call sites.
//!
//! Transitions: Closed → Open after `fail_threshold` consecutive failures;
//! Open → HalfOpen once `open_timeout` has elapsed; HalfOpen → Closed on the
//! next success, or back → Open on failure.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Breaker state, exposed for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Failing; calls are rejected without being dispatched.
    Open,
    /// Probing whether the upstream recovered.
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    fail_count: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker guarding one external dependency.
pub struct CircuitBreaker {
    name: String,
    fail_threshold: u32,
    open_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker named for its dependency (used in error messages and
    /// logs).
    #[must_use]
    pub fn new(name: impl Into<String>, fail_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            fail_threshold,
            open_timeout,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                fail_count: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    /// Run `op` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`] without dispatching when the circuit is
    /// open and the open timeout has not yet elapsed; otherwise propagates
    /// `op`'s own result while recording it.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let mut inner = self.inner.lock().expect("breaker lock poisoned");
            if inner.state == BreakerState::Open {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed > self.open_timeout {
                    inner.state = BreakerState::HalfOpen;
                } else {
                    return Err(Error::unavailable(format!(
                        "circuit breaker open for {}",
                        self.name
                    )));
                }
            }
        }

        let result = op().await;
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match &result {
            Ok(_) => {
                inner.fail_count = 0;
                inner.state = BreakerState::Closed;
                inner.opened_at = None;
            }
            Err(_) => {
                inner.fail_count += 1;
                if inner.fail_count >= self.fail_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(breaker = %self.name, "circuit opened");
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new("test", 2, timeout)
    }

    #[tokio::test]
    async fn test_stays_closed_on_success() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..5 {
            let r = cb.call(|| async { Ok::<_, Error>(1) }).await;
            assert!(r.is_ok());
        }
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..2 {
            let _ = cb
                .call(|| async { Err::<(), _>(Error::unavailable("down")) })
                .await;
        }
        assert_eq!(cb.state(), BreakerState::Open);

        // Next call is rejected without dispatch.
        let r = cb.call(|| async { Ok::<_, Error>(1) }).await;
        assert!(matches!(r, Err(Error::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_half_open_recovers_on_success() {
        let cb = breaker(Duration::from_millis(10));
        for _ in 0..2 {
            let _ = cb
                .call(|| async { Err::<(), _>(Error::unavailable("down")) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let r = cb.call(|| async { Ok::<_, Error>(1) }).await;
        assert!(r.is_ok());
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_reopens_on_failure() {
        let cb = breaker(Duration::from_millis(10));
        for _ in 0..2 {
            let _ = cb
                .call(|| async { Err::<(), _>(Error::unavailable("down")) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let _ = cb
            .call(|| async { Err::<(), _>(Error::unavailable("still down")) })
            .await;
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_failure_count_resets_on_success() {
        let cb = breaker(Duration::from_secs(60));
        let _ = cb
            .call(|| async { Err::<(), _>(Error::unavailable("down")) })
            .await;
        let _ = cb.call(|| async { Ok::<_, Error>(()) }).await;
        let _ = cb
            .call(|| async { Err::<(), _>(Error::unavailable("down")) })
            .await;
        // One failure after a success: still closed.
        assert_eq!(cb.state(), BreakerState::Closed);
    }
}
