//! Generic revisioned document.

use crate::constants::fields;
use crate::error::{BrokerError, BrokerResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record with identity, an opaque revision token, and domain fields.
///
/// `fields` never contains the `_id` / `_rev` keys; those live in `id` and
/// `revision`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub revision: Option<String>,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: None,
            fields: Map::new(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Re-apply this document's fields onto `latest`, adopting its revision.
    ///
    /// Fields only present in `latest` survive; fields present in both take
    /// this document's value.
    pub fn merged_onto(&self, latest: &Document) -> Document {
        let mut fields = latest.fields.clone();
        for (name, value) in &self.fields {
            fields.insert(name.clone(), value.clone());
        }
        Document {
            id: self.id.clone(),
            revision: latest.revision.clone(),
            fields,
        }
    }

    /// Flat JSON object in document-database layout (`_id`, `_rev`, fields)
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert(fields::ID.to_string(), Value::String(self.id.clone()));
        if let Some(revision) = &self.revision {
            object.insert(fields::REVISION.to_string(), Value::String(revision.clone()));
        }
        Value::Object(object)
    }

    /// Parse the flat layout produced by [`Document::to_value`]
    pub fn from_value(value: Value) -> BrokerResult<Document> {
        let Value::Object(mut object) = value else {
            return Err(BrokerError::InvalidInput(
                "Document must be a JSON object".to_string(),
            ));
        };

        let id = match object.remove(fields::ID) {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => {
                return Err(BrokerError::InvalidInput(
                    "Document is missing a string _id".to_string(),
                ))
            }
        };
        let revision = match object.remove(fields::REVISION) {
            Some(Value::String(rev)) => Some(rev),
            _ => None,
        };

        Ok(Document {
            id,
            revision,
            fields: object,
        })
    }
}
