//! Per-component circuit breaker: closed → open (after consecutive
//! failures) → half-open (after a reset timeout) → closed or open again.
//! All state lives behind one mutex; no lock-free counters (spec.md §5).

use crate::domain::error::{Error, Result};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Tracks failures for one external component and short-circuits calls
/// while it's unhealthy.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call would currently be allowed through, without
    /// consuming the half-open trial slot.
    pub fn is_open(&self) -> bool {
        let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
        self.maybe_transition_to_half_open(&mut guard);
        guard.state == State::Open
    }

    fn maybe_transition_to_half_open(&self, guard: &mut Inner) {
        if guard.state == State::Open {
            if let Some(opened_at) = guard.opened_at {
                if opened_at.elapsed() >= self.reset_timeout {
                    guard.state = State::HalfOpen;
                }
            }
        }
    }

    /// Execute `op`, raising `CircuitOpen` without calling `op` at all if
    /// the breaker is open. A half-open breaker allows exactly one trial;
    /// success closes it, failure re-opens it.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
            self.maybe_transition_to_half_open(&mut guard);
            if guard.state == State::Open {
                return Err(Error::circuit_open(self.name.clone()));
            }
        }

        match op().await {
            Ok(value) => {
                let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
                guard.state = State::Closed;
                guard.consecutive_failures = 0;
                guard.opened_at = None;
                Ok(value)
            }
            Err(err) => {
                let mut guard = self.inner.lock().expect("circuit breaker mutex poisoned");
                guard.consecutive_failures += 1;
                if guard.state == State::HalfOpen || guard.consecutive_failures >= self.failure_threshold {
                    guard.state = State::Open;
                    guard.opened_at = Some(Instant::now());
                }
                Err(err)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("vector_store", 3, Duration::from_secs(60));
        for _ in 0..3 {
            let _ = breaker.call(|| async { Err::<(), _>(Error::transient("boom")) }).await;
        }
        assert!(breaker.is_open());
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("vector_store", 3, Duration::from_secs(60));
        let _ = breaker.call(|| async { Err::<(), _>(Error::transient("boom")) }).await;
        let _ = breaker.call(|| async { Err::<(), _>(Error::transient("boom")) }).await;
        let _ = breaker.call(|| async { Ok::<(), Error>(()) }).await;
        let _ = breaker.call(|| async { Err::<(), _>(Error::transient("boom")) }).await;
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn open_breaker_rejects_without_calling_op() {
        let breaker = CircuitBreaker::new("vector_store", 1, Duration::from_secs(60));
        let _ = breaker.call(|| async { Err::<(), _>(Error::transient("boom")) }).await;
        assert!(breaker.is_open());

        let mut called = false;
        let result = breaker
            .call(|| {
                called = true;
                async { Ok::<(), Error>(()) }
            })
            .await;
        assert!(!called);
        assert!(matches!(result, Err(Error::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new("vector_store", 1, Duration::from_millis(10));
        let _ = breaker.call(|| async { Err::<(), _>(Error::transient("boom")) }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!breaker.is_open());
        let _ = breaker.call(|| async { Err::<(), _>(Error::transient("boom")) }).await;
        assert!(breaker.is_open());
    }
}
