//! # Fixed-Window Rate Limiter
//!
//! Guards outbound backend calls. The window resets lazily on the first call
//! after it expires, so no background timer is needed.

use crate::clock::Clock;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_start: Instant,
}

/// Fixed time-window permit counter
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    window: Duration,
    max_requests: u32,
    clock: Arc<dyn Clock>,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    pub fn new(name: String, window: Duration, max_requests: u32, clock: Arc<dyn Clock>) -> Self {
        let window_start = clock.now();
        debug!(
            limiter = %name,
            window_seconds = window.as_secs(),
            max_requests = max_requests,
            "Rate limiter initialized"
        );
        Self {
            name,
            window,
            max_requests,
            clock,
            state: Mutex::new(RateWindow {
                count: 0,
                window_start,
            }),
        }
    }

    /// Take one permit from the current window.
    ///
    /// Returns false without consuming anything once the window is spent.
    pub fn try_acquire(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if now.saturating_duration_since(state.window_start) >= self.window {
            state.count = 0;
            state.window_start = now;
        }

        if state.count < self.max_requests {
            state.count += 1;
            true
        } else {
            warn!(
                limiter = %self.name,
                max_requests = self.max_requests,
                window_seconds = self.window.as_secs(),
                "Rate limit exceeded"
            );
            false
        }
    }

    /// Permits left in the current window
    pub fn remaining(&self) -> u32 {
        let now = self.clock.now();
        let state = self.state.lock();
        if now.saturating_duration_since(state.window_start) >= self.window {
            self.max_requests
        } else {
            self.max_requests.saturating_sub(state.count)
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start a fresh window with no permits taken
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.count = 0;
        state.window_start = self.clock.now();
    }
}
