//! # Resilience Module
//!
//! Fault tolerance primitives guarding every outbound call to the document
//! backend.
//!
//! ## Architecture
//!
//! - **Rate Limiter**: fixed-window permit counter, fails closed once the window is spent
//! - **Circuit Breaker**: Closed/Open/Half-Open guard; optimistic-concurrency
//!   conflicts are classified as routine and never trip it
//! - **Retry Policy**: bounded attempts with a backoff function, shared by the
//!   conflict-retry write path and the reconciliation give-up rule
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provisioning_broker::clock::SystemClock;
//! use provisioning_broker::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CircuitBreakerConfig {
//!     failure_threshold: 5,
//!     timeout: Duration::from_secs(30),
//! };
//!
//! let breaker = CircuitBreaker::new("document_store".to_string(), config, Arc::new(SystemClock));
//!
//! let result = breaker.call(|| async {
//!     Ok::<&str, String>("success")
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use metrics::CircuitBreakerMetrics;
pub use rate_limiter::RateLimiter;
pub use retry::{Backoff, RetryError, RetryPolicy};
