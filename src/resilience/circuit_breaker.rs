//! # Circuit Breaker Implementation
//!
//! Provides fault isolation for the document backend. Three states:
//! Closed (normal operation), Open (failing fast), and Half-Open (a single
//! trial call probes recovery).
//!
//! Callers classify their own errors: only failures that indicate backend
//! unavailability count toward the threshold. Routine errors such as revision
//! conflicts pass through without moving the breaker.

use crate::clock::Clock;
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - exactly one trial call at a time
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation ran and returned an error
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallOutcome {
    Success,
    Failure,
    /// Error that says nothing about backend availability
    Ignored,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u64,
    last_failure_at: Option<Instant>,
    trial_started_at: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            trial_started_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct AtomicCounters {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    ignored_failure_count: AtomicU64,
    rejected_count: AtomicU64,
}

impl AtomicCounters {
    fn reset(&self) {
        self.total_calls.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.ignored_failure_count.store(0, Ordering::Relaxed);
        self.rejected_count.store(0, Ordering::Relaxed);
    }
}

/// Core circuit breaker
///
/// State transitions happen under a short synchronous lock that is never held
/// across the protected operation's `.await`.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    clock: Arc<dyn Clock>,

    inner: Mutex<BreakerState>,

    counters: AtomicCounters,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: String, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_seconds = config.timeout.as_secs(),
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            clock,
            inner: Mutex::new(BreakerState::closed()),
            counters: AtomicCounters::default(),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Execute an operation, counting every error as a failure
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(operation, |_| true).await
    }

    /// Execute an operation, counting only errors for which
    /// `counts_as_failure` returns true
    pub async fn call_classified<F, T, E, Fut, C>(
        &self,
        operation: F,
        counts_as_failure: C,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        if !self.try_admit() {
            self.counters.rejected_count.fetch_add(1, Ordering::Relaxed);
            debug!(component = %self.name, "Call rejected, circuit open");
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let result = operation().await;

        let outcome = match &result {
            Ok(_) => CallOutcome::Success,
            Err(e) if counts_as_failure(e) => CallOutcome::Failure,
            Err(_) => CallOutcome::Ignored,
        };
        self.record(outcome);

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Decide whether a call may proceed, moving Open to Half-Open once the
    /// recovery timeout has elapsed since the last failure
    fn try_admit(&self) -> bool {
        let mut inner = self.inner.lock();
        let now = self.clock.now();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(self.config.timeout);

                if elapsed >= self.config.timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_started_at = Some(now);
                    info!(
                        component = %self.name,
                        "Circuit breaker half-open (testing recovery)"
                    );
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => match inner.trial_started_at {
                // A trial is already in flight
                Some(started) if now.saturating_duration_since(started) < self.config.timeout => {
                    false
                }
                // No trial, or the previous one was abandoned without reporting back
                _ => {
                    inner.trial_started_at = Some(now);
                    true
                }
            },
        }
    }

    fn record(&self, outcome: CallOutcome) {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();

        match outcome {
            CallOutcome::Success | CallOutcome::Ignored => {
                if outcome == CallOutcome::Success {
                    self.counters.success_count.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters
                        .ignored_failure_count
                        .fetch_add(1, Ordering::Relaxed);
                }

                match inner.state {
                    // The backend answered, so the trial proves recovery
                    CircuitState::HalfOpen => self.transition_to_closed(&mut inner),
                    CircuitState::Closed => {
                        if outcome == CallOutcome::Success {
                            inner.consecutive_failures = 0;
                        }
                    }
                    CircuitState::Open => {
                        warn!(component = %self.name, "Success recorded while circuit is open");
                    }
                }
            }
            CallOutcome::Failure => {
                self.counters.failure_count.fetch_add(1, Ordering::Relaxed);
                inner.consecutive_failures += 1;
                inner.last_failure_at = Some(self.clock.now());

                error!(
                    component = %self.name,
                    consecutive_failures = inner.consecutive_failures,
                    "Operation failed"
                );

                match inner.state {
                    CircuitState::Closed => {
                        if inner.consecutive_failures >= u64::from(self.config.failure_threshold) {
                            self.transition_to_open(&mut inner);
                        }
                    }
                    // Any failure in half-open state immediately reopens
                    CircuitState::HalfOpen => self.transition_to_open(&mut inner),
                    CircuitState::Open => {}
                }
            }
        }
    }

    fn transition_to_closed(&self, inner: &mut BreakerState) {
        *inner = BreakerState::closed();
        info!(
            component = %self.name,
            total_calls = self.counters.total_calls.load(Ordering::Relaxed),
            "Circuit breaker closed (recovered)"
        );
    }

    fn transition_to_open(&self, inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.trial_started_at = None;
        if inner.last_failure_at.is_none() {
            inner.last_failure_at = Some(self.clock.now());
        }
        error!(
            component = %self.name,
            consecutive_failures = inner.consecutive_failures,
            failure_threshold = self.config.failure_threshold,
            timeout_seconds = self.config.timeout.as_secs(),
            "Circuit breaker opened (failing fast)"
        );
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let mut inner = self.inner.lock();
        inner.last_failure_at = Some(self.clock.now());
        self.transition_to_open(&mut inner);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.transition_to_closed(&mut inner);
    }

    /// Return to a fresh closed breaker with zeroed counters
    pub fn reset(&self) {
        *self.inner.lock() = BreakerState::closed();
        self.counters.reset();
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let (state, consecutive_failures) = {
            let inner = self.inner.lock();
            (inner.state, inner.consecutive_failures)
        };
        let total_calls = self.counters.total_calls.load(Ordering::Relaxed);
        let failure_count = self.counters.failure_count.load(Ordering::Relaxed);

        CircuitBreakerMetrics {
            total_calls,
            success_count: self.counters.success_count.load(Ordering::Relaxed),
            failure_count,
            ignored_failure_count: self.counters.ignored_failure_count.load(Ordering::Relaxed),
            rejected_count: self.counters.rejected_count.load(Ordering::Relaxed),
            consecutive_failures,
            current_state: state,
            failure_rate: if total_calls > 0 {
                failure_count as f64 / total_calls as f64
            } else {
                0.0
            },
        }
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub fn is_healthy(&self) -> bool {
        let metrics = self.metrics();
        if metrics.current_state != CircuitState::Closed {
            return false;
        }

        if metrics.total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        metrics.failure_rate < 0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn breaker(threshold: u32, timeout: Duration) -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            timeout,
        };
        (
            CircuitBreaker::new("test".to_string(), config, clock.clone()),
            clock,
        )
    }

    async fn fail(circuit: &CircuitBreaker) {
        let _ = circuit.call(|| async { Err::<(), _>("unavailable") }).await;
    }

    #[tokio::test]
    async fn test_circuit_breaker_normal_operation() {
        let (circuit, _) = breaker(3, Duration::from_millis(100));

        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_rejects_without_calling() {
        let (circuit, _) = breaker(5, Duration::from_secs(30));

        for _ in 0..4 {
            fail(&circuit).await;
            assert_eq!(circuit.state(), CircuitState::Closed);
        }
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let invocations = AtomicUsize::new(0);
        let result = circuit
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("should not execute")
            })
            .await;

        assert!(matches!(
            result,
            Err(CircuitBreakerError::CircuitOpen { .. })
        ));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(circuit.metrics().rejected_count, 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let (circuit, _) = breaker(3, Duration::from_secs(30));

        fail(&circuit).await;
        fail(&circuit).await;
        let _ = circuit.call(|| async { Ok::<_, String>(()) }).await;
        fail(&circuit).await;
        fail(&circuit).await;

        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.metrics().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_ignored_errors_do_not_trip() {
        let (circuit, _) = breaker(2, Duration::from_secs(30));

        for _ in 0..10 {
            let result = circuit
                .call_classified(|| async { Err::<(), _>("conflict") }, |e| *e != "conflict")
                .await;
            assert!(matches!(
                result,
                Err(CircuitBreakerError::OperationFailed("conflict"))
            ));
        }

        assert_eq!(circuit.state(), CircuitState::Closed);
        let metrics = circuit.metrics();
        assert_eq!(metrics.ignored_failure_count, 10);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_half_open_admits_exactly_one_trial() {
        let (circuit, clock) = breaker(1, Duration::from_secs(30));
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(29));
        assert!(!circuit.try_admit());

        clock.advance(Duration::from_secs(1));
        assert!(circuit.try_admit());
        assert_eq!(circuit.state(), CircuitState::HalfOpen);
        assert!(!circuit.try_admit(), "second concurrent trial must be refused");
    }

    #[tokio::test]
    async fn test_circuit_breaker_recovery() {
        let (circuit, clock) = breaker(1, Duration::from_secs(30));
        fail(&circuit).await;

        clock.advance(Duration::from_secs(30));

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.metrics().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_failed_trial_reopens_and_restarts_timer() {
        let (circuit, clock) = breaker(1, Duration::from_secs(30));
        fail(&circuit).await;

        clock.advance(Duration::from_secs(30));
        fail(&circuit).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(29));
        let result = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert!(matches!(
            result,
            Err(CircuitBreakerError::CircuitOpen { .. })
        ));

        clock.advance(Duration::from_secs(1));
        let result = circuit.call(|| async { Ok::<_, String>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_abandoned_trial_is_replaced_after_timeout() {
        let (circuit, clock) = breaker(1, Duration::from_secs(30));
        fail(&circuit).await;
        clock.advance(Duration::from_secs(30));
        assert!(circuit.try_admit());

        clock.advance(Duration::from_secs(30));
        assert!(circuit.try_admit());
    }

    #[tokio::test]
    async fn test_force_operations() {
        let (circuit, _) = breaker(1, Duration::from_secs(1));

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);

        circuit.force_closed();
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset_clears_counters() {
        let (circuit, _) = breaker(1, Duration::from_secs(1));
        fail(&circuit).await;
        circuit.reset();

        assert_eq!(circuit.state(), CircuitState::Closed);
        assert_eq!(circuit.metrics(), CircuitBreakerMetrics::new());
        assert!(circuit.is_healthy());
    }
}
