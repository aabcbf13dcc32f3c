//! Circuit breaker for remote dependencies
//!
//! Protects the request path from a failing dependency (LLM completion,
//! WhatsApp send) by short-circuiting to a caller-supplied fallback after a
//! run of consecutive failures. Three states:
//!
//! - `Closed`: calls go through; consecutive failures are counted.
//! - `Open`: calls are rejected in favor of the fallback until `open_timeout`
//!   has elapsed since the last failure.
//! - `HalfOpen`: one probe call goes through; success closes the circuit,
//!   failure reopens it immediately regardless of the threshold.
//!
//! One instance is shared across concurrent requests, so all interior state
//! sits behind a mutex and the breaker is injected where it is needed rather
//! than living in a module-level global.

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker construction parameters
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub threshold: u32,
    /// How long the circuit stays open before a recovery probe
    pub open_timeout: Duration,
    /// Name used in log lines
    pub name: String,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            open_timeout: Duration::from_secs(30),
            name: "circuit".to_string(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Result of an `execute` call
#[derive(Debug, Clone)]
pub struct CircuitOutcome<T> {
    pub result: T,
    /// True when the fallback produced the result (primary failed or the
    /// circuit was open)
    pub from_fallback: bool,
}

/// Read-only snapshot of breaker counters
#[derive(Debug, Clone, Serialize)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_fail_at: Option<Instant>,
}

/// Three-state failure-isolation wrapper around an async operation
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_fail_at: None,
            }),
        }
    }

    /// Run `primary` under the breaker, degrading to `fallback`.
    ///
    /// Primary failures never escape: they are counted and routed to the
    /// fallback. A fallback failure does propagate, since at that point
    /// there is nothing left to degrade to.
    pub async fn execute<T, E, P, PFut, F, FFut>(
        &self,
        primary: P,
        fallback: F,
    ) -> Result<CircuitOutcome<T>, E>
    where
        P: FnOnce() -> PFut,
        PFut: Future<Output = Result<T, E>>,
        F: FnOnce() -> FFut,
        FFut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        if !self.try_acquire() {
            let failures = self.inner.lock().failures;
            tracing::warn!(
                breaker = %self.config.name,
                failures,
                "circuit open, serving fallback"
            );
            let result = fallback().await?;
            return Ok(CircuitOutcome {
                result,
                from_fallback: true,
            });
        }

        match primary().await {
            Ok(result) => {
                self.on_success();
                Ok(CircuitOutcome {
                    result,
                    from_fallback: false,
                })
            }
            Err(err) => {
                let failures = self.on_failure();
                tracing::error!(
                    breaker = %self.config.name,
                    failures,
                    threshold = self.config.threshold,
                    error = %err,
                    "primary operation failed"
                );
                let result = fallback().await?;
                Ok(CircuitOutcome {
                    result,
                    from_fallback: true,
                })
            }
        }
    }

    /// Decide whether the primary may run, moving Open → HalfOpen when the
    /// open timeout has elapsed.
    fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_fail_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed > self.config.open_timeout {
                    tracing::info!(breaker = %self.config.name, "transitioning to HALF_OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.failures = 0;
        if inner.state == CircuitState::HalfOpen {
            inner.successes += 1;
            if inner.successes >= 1 {
                tracing::info!(breaker = %self.config.name, "circuit CLOSED (recovered)");
                inner.state = CircuitState::Closed;
                inner.successes = 0;
            }
        }
    }

    fn on_failure(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.failures += 1;
        inner.last_fail_at = Some(Instant::now());

        if inner.state == CircuitState::HalfOpen {
            // A single bad probe is enough to distrust recovery
            tracing::error!(breaker = %self.config.name, "circuit reopened (failed probe)");
            inner.state = CircuitState::Open;
            inner.successes = 0;
        } else if inner.failures >= self.config.threshold {
            tracing::error!(
                breaker = %self.config.name,
                failures = inner.failures,
                "circuit OPENED"
            );
            inner.state = CircuitState::Open;
        }
        inner.failures
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock();
        CircuitStats {
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            since_last_failure: inner.last_fail_at.map(|at| at.elapsed()),
        }
    }

    /// Force the circuit closed with zero counters. Operational escape
    /// hatch, not part of steady-state logic.
    pub fn reset(&self) {
        tracing::info!(breaker = %self.config.name, "manual reset");
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.successes = 0;
        inner.last_fail_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(threshold: u32, open_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            threshold,
            open_timeout,
            name: "test".to_string(),
        })
    }

    async fn ok() -> Result<&'static str, String> {
        Ok("primary")
    }

    async fn boom() -> Result<&'static str, String> {
        Err("boom".to_string())
    }

    async fn fallback() -> Result<&'static str, String> {
        Ok("fallback")
    }

    #[tokio::test]
    async fn always_succeeding_primary_stays_closed() {
        let cb = breaker(5, Duration::from_secs(30));
        for _ in 0..20 {
            let out = cb.execute(ok, fallback).await.unwrap();
            assert_eq!(out.result, "primary");
            assert!(!out.from_fallback);
            assert_eq!(cb.state(), CircuitState::Closed);
        }
    }

    #[tokio::test]
    async fn failures_route_to_fallback_without_erroring() {
        let cb = breaker(5, Duration::from_secs(30));
        let out = cb.execute(boom, fallback).await.unwrap();
        assert_eq!(out.result, "fallback");
        assert!(out.from_fallback);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_at_threshold_and_skips_primary() {
        let cb = breaker(5, Duration::from_secs(30));
        for _ in 0..5 {
            cb.execute(boom, fallback).await.unwrap();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        // The sixth call must not invoke the primary at all
        let calls = AtomicU32::new(0);
        let out = cb
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ok()
                },
                fallback,
            )
            .await
            .unwrap();
        assert!(out.from_fallback);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_resets_consecutive_failure_count() {
        let cb = breaker(3, Duration::from_secs(30));
        cb.execute(boom, fallback).await.unwrap();
        cb.execute(boom, fallback).await.unwrap();
        cb.execute(ok, fallback).await.unwrap();
        cb.execute(boom, fallback).await.unwrap();
        cb.execute(boom, fallback).await.unwrap();
        // Never three in a row, still closed
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn recovery_probe_closes_on_success() {
        let cb = breaker(2, Duration::from_millis(20));
        cb.execute(boom, fallback).await.unwrap();
        cb.execute(boom, fallback).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let out = cb.execute(ok, fallback).await.unwrap();
        assert!(!out.from_fallback);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn failed_probe_reopens_immediately() {
        let cb = breaker(2, Duration::from_millis(20));
        cb.execute(boom, fallback).await.unwrap();
        cb.execute(boom, fallback).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        // One bad probe reopens, no threshold accumulation needed
        let out = cb.execute(boom, fallback).await.unwrap();
        assert!(out.from_fallback);
        assert_eq!(cb.state(), CircuitState::Open);

        // And the failure clock restarted: immediately after, still open
        let calls = AtomicU32::new(0);
        cb.execute(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                ok()
            },
            fallback,
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_error_propagates() {
        let cb = breaker(5, Duration::from_secs(30));
        let result = cb
            .execute(boom, || async { Err::<&str, String>("no fallback".to_string()) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reset_forces_closed() {
        let cb = breaker(1, Duration::from_secs(30));
        cb.execute(boom, fallback).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        let stats = cb.stats();
        assert_eq!(stats.failures, 0);
        assert!(stats.since_last_failure.is_none());
    }
}
