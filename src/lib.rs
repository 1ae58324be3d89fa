#![allow(clippy::doc_markdown)] // Allow technical terms like CouchDB, TTL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Provisioning Broker
//!
//! Resilient access layer in front of a rate-limited document database, plus
//! a background reconciler that keeps provisioning workflow state in step with
//! an external deployment service.
//!
//! ## Architecture
//!
//! ```text
//! request handlers
//!   │
//!   ├── DocumentStore ──► RateLimiter ──► CircuitBreaker ──► DocumentBackend
//!   │        └── TtlCache (per-collection policy)
//!   │
//!   └── DeploymentTracker ──► ProvisioningService
//!            └── reconciliation loop ──► DocumentStore, NotificationSink
//! ```
//!
//! ## Key Features
//!
//! - **Per-collection TTL cache**: infinite for `users`, bounded for the rest,
//!   updated (not invalidated) on successful writes
//! - **Fixed-window rate limiting**: refuses outbound calls once the window
//!   budget is spent
//! - **Circuit breaker**: fails fast during outages, probes recovery with a
//!   single trial call; revision conflicts never trip it
//! - **Conflict retry**: re-fetch, re-apply, retry with exponential backoff
//! - **Lazy reconciliation loop**: runs only while deployments are tracked
//! - **Workflow validation**: `(stage, status)` pairs are checked against an
//!   allow-list before every write
//!
//! ## Module Organization
//!
//! - [`cache`] - Collection policies and the TTL cache
//! - [`resilience`] - Rate limiter, circuit breaker, retry policy
//! - [`store`] - Document model, backends, and the facade
//! - [`workflow`] - Workflow state and the consistency validator
//! - [`deployment`] - Tracker, reconciliation loop, provisioning client, notifications
//! - [`core`] - Service container wiring everything together
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use provisioning_broker::cache::Collection;
//! use provisioning_broker::config::BrokerConfig;
//! use provisioning_broker::core::BrokerCore;
//! use provisioning_broker::store::Document;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (core, _events) = BrokerCore::from_config(BrokerConfig::default())?;
//!
//! let alice = core
//!     .store()
//!     .save(Collection::Users, Document::new("alice").with_field("email", json!("alice@example.com")))
//!     .await?;
//!
//! core.tracker().track(&alice.id, "operations/42", "deploy-agent-alice")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod core;
pub mod deployment;
pub mod error;
pub mod logging;
pub mod resilience;
pub mod store;
pub mod workflow;

pub use cache::{Collection, TtlCache};
pub use config::{BrokerConfig, ConfigManager};
pub use core::BrokerCore;
pub use deployment::{DeploymentTracker, DeploymentTrackingEntry};
pub use error::{BrokerError, BrokerResult};
pub use store::{Document, DocumentStore};
pub use workflow::{ApprovalStatus, WorkflowStage, WorkflowState};
