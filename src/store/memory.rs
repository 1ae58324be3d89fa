//! In-process document backend.
//!
//! Enforces the same revision discipline as the real database: a write must
//! carry the current revision, or none when the id is new.

use super::backend::{BackendError, BackendResult, DocumentBackend};
use super::document::Document;
use crate::cache::Collection;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    collections: Mutex<HashMap<Collection, BTreeMap<String, Document>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents in a collection
    pub fn count(&self, collection: Collection) -> usize {
        self.collections
            .lock()
            .get(&collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn next_revision(current: Option<&str>) -> String {
        let generation = current
            .and_then(|rev| rev.split_once('-'))
            .and_then(|(n, _)| n.parse::<u64>().ok())
            .unwrap_or(0);
        format!("{}-{}", generation + 1, Uuid::new_v4().simple())
    }
}

/// Top-level equality match; a non-object selector matches everything
pub(crate) fn matches_selector(document: &Document, selector: &Value) -> bool {
    let Some(criteria) = selector.as_object() else {
        return true;
    };
    criteria.iter().all(|(field, expected)| match field.as_str() {
        "_id" => expected.as_str() == Some(document.id.as_str()),
        _ => document.get(field) == Some(expected),
    })
}

#[async_trait]
impl DocumentBackend for InMemoryBackend {
    async fn get(&self, collection: Collection, id: &str) -> BackendResult<Document> {
        self.collections
            .lock()
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| BackendError::not_found(collection, id))
    }

    async fn save(&self, collection: Collection, document: &Document) -> BackendResult<String> {
        let mut collections = self.collections.lock();
        let docs = collections.entry(collection).or_default();

        let stored_revision = docs.get(&document.id).and_then(|d| d.revision.clone());
        if stored_revision != document.revision {
            return Err(BackendError::conflict(collection, &document.id));
        }

        let revision = Self::next_revision(stored_revision.as_deref());
        let mut stored = document.clone();
        stored.revision = Some(revision.clone());
        docs.insert(document.id.clone(), stored);
        Ok(revision)
    }

    async fn list_all(&self, collection: Collection) -> BackendResult<Vec<Document>> {
        Ok(self
            .collections
            .lock()
            .get(&collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn query(&self, collection: Collection, selector: &Value) -> BackendResult<Vec<Document>> {
        Ok(self
            .collections
            .lock()
            .get(&collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| matches_selector(doc, selector))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn ping(&self) -> BackendResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}
