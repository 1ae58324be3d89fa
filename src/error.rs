//! Error types for the provisioning broker.
//!

use crate::cache::CacheError;
use crate::store::BackendError;
use crate::workflow::WorkflowState;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    /// Outbound call suppressed locally; caller should retry later
    #[error("Rate limit exceeded: {max_requests} requests per {window_seconds}s window")]
    RateLimitExceeded {
        max_requests: u32,
        window_seconds: u64,
    },
    /// Backend presumed unavailable; caller should retry later
    #[error("Circuit breaker open: {0}")]
    BreakerOpen(String),
    /// Optimistic concurrency conflict that survived every retry
    #[error("Write conflict on {collection}/{id} after {attempts} attempts")]
    Conflict {
        collection: String,
        id: String,
        attempts: u32,
    },
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("Inconsistent workflow state: {state}")]
    InconsistentState { state: WorkflowState },
    #[error("Field '{field}' may not be persisted to {collection}")]
    ForbiddenField { collection: String, field: String },
    #[error("External service error: {0}")]
    ExternalService(String),
    /// Backend failure other than a missing document or a conflict
    #[error(transparent)]
    Backend(BackendError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BrokerError {
    /// Errors the caller may recover from by trying again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrokerError::RateLimitExceeded { .. } | BrokerError::BreakerOpen(_)
        )
    }
}

impl From<BackendError> for BrokerError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::NotFound { collection, id } => BrokerError::NotFound { collection, id },
            BackendError::Conflict { collection, id } => BrokerError::Conflict {
                collection,
                id,
                attempts: 1,
            },
            other => BrokerError::Backend(other),
        }
    }
}

impl From<CacheError> for BrokerError {
    fn from(error: CacheError) -> Self {
        BrokerError::InvalidInput(error.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(error: serde_json::Error) -> Self {
        BrokerError::InvalidInput(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for BrokerError {
    fn from(error: config::ConfigError) -> Self {
        BrokerError::Configuration(error.to_string())
    }
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
