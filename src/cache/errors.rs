//! Cache error types

use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Null or empty values are never cached
    #[error("Refusing to cache empty value for {collection}/{key}")]
    EmptyValue { collection: String, key: String },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
