//! # Circuit Breaker Metrics
//!
//! Snapshot of breaker counters for health reporting and logs.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that reached the protected operation
    pub total_calls: u64,

    pub success_count: u64,

    /// Failures counted toward the threshold
    pub failure_count: u64,

    /// Errors classified as routine (e.g. revision conflicts)
    pub ignored_failure_count: u64,

    /// Calls refused without contacting the backend
    pub rejected_count: u64,

    pub consecutive_failures: u64,

    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            ignored_failure_count: 0,
            rejected_count: 0,
            consecutive_failures: 0,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
        }
    }

    /// Get human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Testing system health",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Failures: {} | Ignored: {} | Rejected: {}",
            self.state_description(),
            self.total_calls,
            self.failure_count,
            self.ignored_failure_count,
            self.rejected_count
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
