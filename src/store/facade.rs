//! # Document Store Facade
//!
//! Single entry point for persistent reads and writes. Every backend call is
//! admitted by the rate limiter and wrapped by the circuit breaker; reads are
//! served from the TTL cache when fresh; writes resolve revision conflicts by
//! re-fetching and re-applying the caller's fields.

use super::backend::{BackendError, DocumentBackend};
use super::document::Document;
use crate::cache::{CacheStats, Collection, TtlCache};
use crate::clock::Clock;
use crate::constants::{ALL_DOCUMENTS_KEY, HEALTH_REPORT_KEY, RESERVED_TRANSIENT_FIELDS};
use crate::error::{BrokerError, BrokerResult};
use crate::logging::log_store_operation;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerMetrics, CircuitState, RateLimiter, RetryError,
    RetryPolicy,
};
use crate::workflow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Backend and cache status, cached under the `health` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub backend: String,
    pub backend_reachable: bool,
    pub breaker_state: CircuitState,
    /// Closed with a low failure rate
    pub breaker_healthy: bool,
    pub breaker: CircuitBreakerMetrics,
    pub cache_entries: usize,
    pub cache: CacheStats,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct DocumentStore {
    backend: Arc<dyn DocumentBackend>,
    cache: Arc<TtlCache>,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    write_retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl DocumentStore {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        cache: Arc<TtlCache>,
        limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        write_retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            cache,
            limiter,
            breaker,
            write_retry,
            clock,
        }
    }

    /// Read a document, preferring a fresh cache entry
    pub async fn get(&self, collection: Collection, id: &str) -> BrokerResult<Document> {
        if let Some(cached) = self.cache.get(collection, id) {
            match Document::from_value(cached) {
                Ok(document) => {
                    debug!(collection = %collection, key = %id, "Cache hit");
                    return Ok(document);
                }
                Err(e) => {
                    warn!(collection = %collection, key = %id, error = %e, "Dropping undecodable cache entry");
                    self.cache.invalidate(collection, Some(id));
                }
            }
        }

        self.admit()?;
        let document = self.guarded(|| self.backend.get(collection, id)).await?;
        self.cache_document(collection, &document);
        Ok(document)
    }

    /// Persist a document, retrying revision conflicts.
    ///
    /// On success the cache holds the written version, the collection's
    /// listing is dropped, and dependent collections are invalidated.
    pub async fn save(&self, collection: Collection, document: Document) -> BrokerResult<Document> {
        self.reject_reserved_fields(collection, &document)?;
        workflow::validate_document(&document)?;
        self.admit()?;

        let saved = self
            .write_retry
            .run(
                |attempt| self.write_attempt(collection, &document, attempt),
                |e| matches!(e, BrokerError::Conflict { .. }),
            )
            .await
            .map_err(|e| match e {
                RetryError::Exhausted {
                    attempts,
                    last_error: BrokerError::Conflict { collection, id, .. },
                } => BrokerError::Conflict {
                    collection,
                    id,
                    attempts,
                },
                other => other.into_inner(),
            });

        let saved = match saved {
            Ok(saved) => saved,
            Err(e) => {
                log_store_operation(
                    "save",
                    collection.as_str(),
                    Some(&document.id),
                    "failed",
                    None,
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        };

        self.cache_document(collection, &saved);
        self.cache.invalidate(collection, Some(ALL_DOCUMENTS_KEY));
        for dependent in collection.invalidates_on_write() {
            self.cache.invalidate(*dependent, None);
        }

        log_store_operation(
            "save",
            collection.as_str(),
            Some(&saved.id),
            "saved",
            None,
            saved.revision.as_deref(),
        );
        Ok(saved)
    }

    /// All documents in a collection, cached as one listing entry
    pub async fn get_all(&self, collection: Collection) -> BrokerResult<Vec<Document>> {
        if let Some(Value::Array(items)) = self.cache.get(collection, ALL_DOCUMENTS_KEY) {
            let decoded: BrokerResult<Vec<Document>> =
                items.into_iter().map(Document::from_value).collect();
            match decoded {
                Ok(documents) => return Ok(documents),
                Err(e) => {
                    warn!(collection = %collection, error = %e, "Dropping undecodable listing");
                    self.cache.invalidate(collection, Some(ALL_DOCUMENTS_KEY));
                }
            }
        }

        self.admit()?;
        let documents = self.guarded(|| self.backend.list_all(collection)).await?;

        let listing = Value::Array(documents.iter().map(Document::to_value).collect());
        if let Err(e) = self.cache.set(collection, ALL_DOCUMENTS_KEY, listing) {
            debug!(collection = %collection, error = %e, "Listing not cached");
        }
        Ok(documents)
    }

    /// Selector query; results are never cached
    pub async fn query(&self, collection: Collection, selector: &Value) -> BrokerResult<Vec<Document>> {
        self.admit()?;
        self.guarded(|| self.backend.query(collection, selector)).await
    }

    /// Drop one cached key, or a whole collection when `key` is `None`
    pub fn invalidate(&self, collection: Collection, key: Option<&str>) {
        self.cache.invalidate(collection, key);
    }

    /// Backend reachability and breaker state.
    ///
    /// Never fails: an unreachable backend is reported in the result. The
    /// probe bypasses the rate limiter so health stays observable under load.
    pub async fn health(&self) -> HealthReport {
        if let Some(cached) = self.cache.get(Collection::Health, HEALTH_REPORT_KEY) {
            if let Ok(report) = serde_json::from_value::<HealthReport>(cached) {
                return report;
            }
        }

        let probe = self.guarded(|| self.backend.ping()).await;
        let stats = self.cache.stats();
        let breaker = self.breaker.metrics();
        let report = HealthReport {
            backend: self.backend_name().to_string(),
            backend_reachable: probe.is_ok(),
            breaker_state: breaker.current_state,
            breaker_healthy: self.breaker.is_healthy(),
            breaker: breaker.clone(),
            cache_entries: stats.entries,
            cache: stats,
            checked_at: self.clock.utc_now(),
            error: probe.err().map(|e| e.to_string()),
        };
        if !report.backend_reachable || !report.breaker_healthy {
            warn!(
                backend = %report.backend,
                error = report.error.as_deref().unwrap_or("none"),
                breaker = %breaker.format_summary(),
                "Document store degraded"
            );
        }

        match serde_json::to_value(&report) {
            Ok(value) => {
                if let Err(e) = self.cache.set(Collection::Health, HEALTH_REPORT_KEY, value) {
                    debug!(error = %e, "Health report not cached");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize health report"),
        }
        report
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Clear cache, rate window and breaker state
    pub fn reset(&self) {
        self.cache.reset();
        self.limiter.reset();
        self.breaker.reset();
    }

    /// One write attempt. Attempts after the first re-fetch the latest
    /// version and re-apply the caller's fields onto it.
    async fn write_attempt(
        &self,
        collection: Collection,
        document: &Document,
        attempt: u32,
    ) -> BrokerResult<Document> {
        let candidate = if attempt == 1 {
            document.clone()
        } else {
            match self.guarded(|| self.backend.get(collection, &document.id)).await {
                Ok(latest) => {
                    let merged = document.merged_onto(&latest);
                    workflow::validate_document(&merged)?;
                    merged
                }
                // Deleted underneath us: write as a new document
                Err(BrokerError::NotFound { .. }) => Document {
                    revision: None,
                    ..document.clone()
                },
                Err(e) => return Err(e),
            }
        };

        let revision = self
            .guarded(|| self.backend.save(collection, &candidate))
            .await
            .inspect_err(|e| {
                if matches!(e, BrokerError::Conflict { .. }) {
                    debug!(
                        collection = %collection,
                        id = %document.id,
                        attempt = attempt,
                        "Revision conflict"
                    );
                }
            })?;

        Ok(Document {
            revision: Some(revision),
            ..candidate
        })
    }

    fn admit(&self) -> BrokerResult<()> {
        if self.limiter.try_acquire() {
            Ok(())
        } else {
            Err(BrokerError::RateLimitExceeded {
                max_requests: self.limiter.max_requests(),
                window_seconds: self.limiter.window().as_secs(),
            })
        }
    }

    /// Run a backend call through the breaker; conflicts and missing
    /// documents do not count as failures
    async fn guarded<T, F, Fut>(&self, operation: F) -> BrokerResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        self.breaker
            .call_classified(operation, BackendError::counts_against_breaker)
            .await
            .map_err(|e| match e {
                CircuitBreakerError::CircuitOpen { component } => BrokerError::BreakerOpen(component),
                CircuitBreakerError::OperationFailed(err) => err.into(),
            })
    }

    fn reject_reserved_fields(&self, collection: Collection, document: &Document) -> BrokerResult<()> {
        match RESERVED_TRANSIENT_FIELDS
            .iter()
            .find(|field| document.fields.contains_key(**field))
        {
            Some(field) => {
                warn!(
                    collection = %collection,
                    id = %document.id,
                    field = %field,
                    "Refusing to persist transient field"
                );
                Err(BrokerError::ForbiddenField {
                    collection: collection.to_string(),
                    field: field.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    fn cache_document(&self, collection: Collection, document: &Document) {
        if let Err(e) = self.cache.set(collection, &document.id, document.to_value()) {
            debug!(collection = %collection, key = %document.id, error = %e, "Document not cached");
        }
    }
}
