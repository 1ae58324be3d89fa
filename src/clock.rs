//! # Clock Abstraction
//!
//! Every time-dependent component (cache TTLs, rate windows, breaker recovery,
//! reconciliation staleness) reads time through [`Clock`] so tests can move
//! time forward without sleeping.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Source of monotonic and wall-clock time
pub trait Clock: Send + Sync + Debug {
    /// Monotonic instant used for elapsed-time comparisons
    fn now(&self) -> Instant;

    /// Wall-clock timestamp used for records and events
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug)]
pub struct ManualClock {
    base_instant: Instant,
    base_utc: DateTime<Utc>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base_instant: Instant::now(),
            base_utc: Utc::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move time forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock();
        *offset += by;
    }

    /// Total time advanced since construction
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base_instant + *self.offset.lock()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let offset = *self.offset.lock();
        self.base_utc + chrono::Duration::from_std(offset).unwrap_or(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_both_timelines() {
        let clock = ManualClock::new();
        let start = clock.now();
        let start_utc = clock.utc_now();

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.now() - start, Duration::from_secs(90));
        assert_eq!((clock.utc_now() - start_utc).num_seconds(), 90);
        assert_eq!(clock.elapsed(), Duration::from_secs(90));
    }
}
