//! # Document Store
//!
//! ```text
//! DocumentStore (facade)
//!   ├── RateLimiter      <- admits outbound calls
//!   ├── CircuitBreaker   <- wraps every backend call
//!   ├── TtlCache         <- per-collection read cache
//!   └── DocumentBackend  <- InMemoryBackend | CouchDbBackend
//! ```

pub mod backend;
pub mod couchdb;
pub mod document;
pub mod facade;
pub mod memory;

pub use backend::{BackendError, BackendResult, DocumentBackend};
pub use couchdb::CouchDbBackend;
pub use document::Document;
pub use facade::{DocumentStore, HealthReport};
pub use memory::InMemoryBackend;
