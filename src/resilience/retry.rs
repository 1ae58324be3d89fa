//! # Bounded Retry Policy
//!
//! A reusable combinator for "try up to N times, waiting between attempts".
//! The write path uses it to resolve revision conflicts; the reconciliation
//! loop uses the same policy type to decide when to stop polling.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay after every attempt
    Fixed(Duration),
    /// `base * multiplier^(attempt - 1)`
    Exponential { base: Duration, multiplier: f64 },
}

/// Why a retried operation ultimately failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("Gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },
    /// A non-retryable error stopped the sequence early
    #[error("Aborted on attempt {attempt}: {error}")]
    Aborted { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Aborted { error, .. } => error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration, multiplier: f64) -> Self {
        Self::new(max_attempts, Backoff::Exponential { base, multiplier })
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, Backoff::Fixed(delay))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given 1-based attempt failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential { base, multiplier } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                base.mul_f64(multiplier.powi(exponent))
            }
        }
    }

    /// Whether `attempts_made` has used up the budget
    pub fn is_exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }

    /// Run `operation` until it succeeds, fails with an error `should_retry`
    /// rejects, or the attempt budget is spent.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<F, Fut, T, E, R>(&self, mut operation: F, should_retry: R) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt = attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !should_retry(&error) => {
                    return Err(RetryError::Aborted { attempt, error });
                }
                Err(error) => {
                    if self.is_exhausted(attempt) {
                        warn!(
                            attempts = attempt,
                            "Retry budget exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }
                    let delay = self.delay_after(attempt);
                    debug!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
