//! Document database collaborator boundary.

use super::document::Document;
use crate::cache::Collection;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use thiserror::Error;

/// Errors reported by a document backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// Supplied revision does not match the stored one
    #[error("Revision conflict on {collection}/{id}")]
    Conflict { collection: String, id: String },

    /// Transport failure or server-side unavailability
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn not_found(collection: Collection, id: &str) -> Self {
        BackendError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn conflict(collection: Collection, id: &str) -> Self {
        BackendError::Conflict {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BackendError::Conflict { .. })
    }

    /// Whether this error says the backend is unhealthy.
    ///
    /// Conflicts and missing documents are answers from a working backend.
    pub fn counts_against_breaker(&self) -> bool {
        !matches!(
            self,
            BackendError::Conflict { .. } | BackendError::NotFound { .. }
        )
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Operations the facade needs from a document database
#[async_trait]
pub trait DocumentBackend: Send + Sync + Debug {
    /// Fetch the current version of a document
    async fn get(&self, collection: Collection, id: &str) -> BackendResult<Document>;

    /// Write a document; `document.revision` must match the stored revision
    /// (or be `None` for a new id). Returns the new revision.
    async fn save(&self, collection: Collection, document: &Document) -> BackendResult<String>;

    async fn list_all(&self, collection: Collection) -> BackendResult<Vec<Document>>;

    /// Equality selector over top-level fields
    async fn query(&self, collection: Collection, selector: &Value) -> BackendResult<Vec<Document>>;

    /// Cheap reachability probe
    async fn ping(&self) -> BackendResult<()>;

    fn backend_name(&self) -> &'static str;
}
