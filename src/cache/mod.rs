//! # Document Cache Module
//!
//! In-process, per-collection TTL cache sitting in front of the document
//! backend.
//!
//! ## Architecture
//!
//! ```text
//! Collection (enum)              <- closed set of tags, policy looked up from a table
//!   └── CachePolicy              <- TTL (None = explicit invalidation only), capacity,
//!                                   collections invalidated on write
//! TtlCache                       <- DashMap<Collection, HashMap<key, entry>>
//! ```
//!
//! ## Design Decisions
//!
//! - **Single process**: nothing here is shared across instances
//! - **No negative caching**: null and empty values are rejected by `set`
//! - **Lazy expiry**: stale entries are dropped on read, no sweeper task
//! - **Synchronous API**: no lock is ever held across an `.await`

pub mod collection;
pub mod errors;
pub mod ttl_cache;

pub use collection::{CachePolicy, Collection};
pub use errors::{CacheError, CacheResult};
pub use ttl_cache::{CacheStats, TtlCache};
