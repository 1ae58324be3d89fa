//! CouchDB-compatible HTTP backend.
//!
//! All collections share one database. Stored ids are namespaced as
//! `{collection}:{id}` so equal ids in different collections never collide,
//! and a `type` field names the collection for `_find` selectors.

use super::backend::{BackendError, BackendResult, DocumentBackend};
use super::document::Document;
use crate::cache::Collection;
use crate::config::CouchDbConfig;
use crate::constants::fields;
use crate::error::{BrokerError, BrokerResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Upper bound on documents returned by a single `_find`
const FIND_LIMIT: u32 = 10_000;

#[derive(Debug, Deserialize)]
struct WriteResponse {
    rev: String,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    docs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    #[serde(default)]
    doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

pub struct CouchDbBackend {
    client: Client,
    base_url: Url,
    database: String,
    credentials: Option<(String, Option<String>)>,
}

impl CouchDbBackend {
    pub fn new(config: &CouchDbConfig) -> BrokerResult<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| BrokerError::Configuration(format!("Invalid couchdb.url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BrokerError::Configuration(format!(
                "couchdb.url cannot be used as a base URL: {}",
                config.url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BrokerError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            database: config.database.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    fn url(&self, segments: &[&str]) -> BackendResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| BackendError::Other("Base URL cannot hold a path".to_string()))?;
            path.pop_if_empty().push(&self.database);
            path.extend(segments);
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(format!("HTTP request failed: {e}")))
    }

    async fn find(&self, collection: Collection, selector: Value) -> BackendResult<Vec<Document>> {
        let url = self.url(&["_find"])?;
        let response = self
            .send(
                self.client
                    .post(url)
                    .json(&json!({ "selector": selector, "limit": FIND_LIMIT })),
            )
            .await?;
        let body: FindResponse = expect_success(response).await?;

        body.docs
            .into_iter()
            .map(|doc| decode_stored(collection, doc))
            .collect()
    }
}

impl std::fmt::Debug for CouchDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouchDbBackend")
            .field("base_url", &self.base_url.as_str())
            .field("database", &self.database)
            .field("credentials", &self.credentials.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

async fn error_for_status(status: StatusCode, response: Response) -> BackendError {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    if status.is_server_error() {
        BackendError::Unavailable(format!("HTTP {}: {}", status.as_u16(), body))
    } else {
        BackendError::Other(format!("HTTP {}: {}", status.as_u16(), body))
    }
}

async fn expect_success<T: serde::de::DeserializeOwned>(response: Response) -> BackendResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(error_for_status(status, response).await);
    }
    response
        .json()
        .await
        .map_err(|e| BackendError::Other(format!("Failed to parse response: {e}")))
}

/// Database id of a document within `collection`
fn stored_id(collection: Collection, id: &str) -> String {
    format!("{}:{}", collection.as_str(), id)
}

/// Strip the collection namespace and tag from a stored document
fn decode_stored(collection: Collection, value: Value) -> BackendResult<Document> {
    let mut document =
        Document::from_value(value).map_err(|e| BackendError::Other(e.to_string()))?;
    let prefix = stored_id(collection, "");
    document.id = match document.id.strip_prefix(&prefix) {
        Some(id) => id.to_string(),
        None => {
            return Err(BackendError::Other(format!(
                "Document {} is not in collection {}",
                document.id, collection
            )))
        }
    };
    document.remove(fields::TYPE);
    Ok(document)
}

fn tagged_selector(collection: Collection, selector: &Value) -> Value {
    let mut criteria = selector.as_object().cloned().unwrap_or_else(Map::new);
    criteria.insert(fields::TYPE.to_string(), json!(collection.as_str()));
    Value::Object(criteria)
}

#[async_trait]
impl DocumentBackend for CouchDbBackend {
    async fn get(&self, collection: Collection, id: &str) -> BackendResult<Document> {
        let url = self.url(&[&stored_id(collection, id)])?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::not_found(collection, id));
        }

        let value: Value = expect_success(response).await?;
        decode_stored(collection, value)
    }

    async fn save(&self, collection: Collection, document: &Document) -> BackendResult<String> {
        let url = self.url(&[&stored_id(collection, &document.id)])?;
        let mut body = document.to_value();
        if let Value::Object(object) = &mut body {
            object.insert(fields::ID.to_string(), json!(stored_id(collection, &document.id)));
            object.insert(fields::TYPE.to_string(), json!(collection.as_str()));
        }

        let response = self.send(self.client.put(url).json(&body)).await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(BackendError::conflict(collection, &document.id));
        }

        let written: WriteResponse = expect_success(response).await?;
        debug!(
            collection = %collection,
            id = %document.id,
            revision = %written.rev,
            "Document written"
        );
        Ok(written.rev)
    }

    async fn list_all(&self, collection: Collection) -> BackendResult<Vec<Document>> {
        let mut url = self.url(&["_all_docs"])?;
        url.query_pairs_mut()
            .append_pair("include_docs", "true")
            .append_pair("startkey", &json!(stored_id(collection, "")).to_string())
            .append_pair("endkey", &json!(stored_id(collection, "\u{fff0}")).to_string());
        let response = self.send(self.client.get(url)).await?;
        let body: AllDocsResponse = expect_success(response).await?;

        body.rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| decode_stored(collection, doc))
            .collect()
    }

    async fn query(&self, collection: Collection, selector: &Value) -> BackendResult<Vec<Document>> {
        self.find(collection, tagged_selector(collection, selector)).await
    }

    async fn ping(&self) -> BackendResult<()> {
        let response = self.send(self.client.get(self.base_url.clone())).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(error_for_status(status, response).await)
        }
    }

    fn backend_name(&self) -> &'static str {
        "couchdb"
    }
}
