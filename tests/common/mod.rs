//! Shared fakes for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use provisioning_broker::cache::{Collection, TtlCache};
use provisioning_broker::clock::{Clock, ManualClock};
use provisioning_broker::config::BrokerConfig;
use provisioning_broker::deployment::{
    DeploymentEvent, DeploymentTracker, NotificationSink, NotifyError, OperationStatus,
    ProvisioningError, ProvisioningService, ReconcileSummary,
};
use provisioning_broker::resilience::{CircuitBreaker, RateLimiter};
use provisioning_broker::store::{
    BackendError, BackendResult, Document, DocumentBackend, DocumentStore, InMemoryBackend,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory backend with call counters and fault injection
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    pub inner: InMemoryBackend,
    pub gets: AtomicU32,
    pub saves: AtomicU32,
    pub lists: AtomicU32,
    pub queries: AtomicU32,
    pub pings: AtomicU32,
    conflicts_to_inject: AtomicU32,
    unavailable: AtomicBool,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next `n` saves report a revision conflict without writing
    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts_to_inject.store(n, Ordering::SeqCst);
    }

    /// Every call fails as if the server were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Write directly, bypassing counters and faults
    pub async fn seed(&self, collection: Collection, document: Document) -> Document {
        let revision = self
            .inner
            .save(collection, &document)
            .await
            .expect("seed write");
        document.with_revision(revision)
    }

    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> u32 {
        self.lists.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> BackendResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentBackend for ScriptedBackend {
    async fn get(&self, collection: Collection, id: &str) -> BackendResult<Document> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.inner.get(collection, id).await
    }

    async fn save(&self, collection: Collection, document: &Document) -> BackendResult<String> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let injected = self
            .conflicts_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(BackendError::conflict(collection, &document.id));
        }
        self.inner.save(collection, document).await
    }

    async fn list_all(&self, collection: Collection) -> BackendResult<Vec<Document>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.inner.list_all(collection).await
    }

    async fn query(&self, collection: Collection, selector: &Value) -> BackendResult<Vec<Document>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.inner.query(collection, selector).await
    }

    async fn ping(&self) -> BackendResult<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// Provisioning service answering from per-operation scripts.
///
/// The last scripted answer repeats once the script runs out; unscripted
/// operations stay in progress.
#[derive(Debug, Default)]
pub struct ScriptedProvisioning {
    scripts: Mutex<HashMap<String, VecDeque<Result<OperationStatus, ProvisioningError>>>>,
    polls: Mutex<HashMap<String, u32>>,
}

impl ScriptedProvisioning {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(
        &self,
        operation_id: &str,
        answers: impl IntoIterator<Item = Result<OperationStatus, ProvisioningError>>,
    ) {
        self.scripts
            .lock()
            .insert(operation_id.to_string(), answers.into_iter().collect());
    }

    pub fn polls(&self, operation_id: &str) -> u32 {
        self.polls.lock().get(operation_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ProvisioningService for ScriptedProvisioning {
    async fn operation_status(&self, operation_id: &str) -> Result<OperationStatus, ProvisioningError> {
        *self.polls.lock().entry(operation_id.to_string()).or_insert(0) += 1;

        let mut scripts = self.scripts.lock();
        match scripts.get_mut(operation_id) {
            Some(answers) if answers.len() > 1 => answers.pop_front().expect("non-empty script"),
            Some(answers) => answers
                .front()
                .cloned()
                .unwrap_or_else(|| Ok(OperationStatus::InProgress("pending".to_string()))),
            None => Ok(OperationStatus::InProgress("pending".to_string())),
        }
    }
}

/// Sink that records every event it receives
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<DeploymentEvent>>,
    fail: AtomicBool,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<DeploymentEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError> {
        self.events.lock().push(event.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("smtp unavailable".to_string()));
        }
        Ok(())
    }
}

/// Facade over `backend` using test presets and a manual clock
pub fn test_store(
    config: &BrokerConfig,
    backend: Arc<dyn DocumentBackend>,
    clock: Arc<ManualClock>,
) -> Arc<DocumentStore> {
    let clock: Arc<dyn Clock> = clock;
    Arc::new(DocumentStore::new(
        backend,
        Arc::new(TtlCache::new(&config.cache, Arc::clone(&clock))),
        Arc::new(RateLimiter::new(
            "document_store".to_string(),
            config.rate_limit.window(),
            config.rate_limit.max_requests,
            Arc::clone(&clock),
        )),
        Arc::new(CircuitBreaker::new(
            "document_store".to_string(),
            config.circuit_breaker.to_resilience_config(),
            Arc::clone(&clock),
        )),
        config.write_retry.to_policy(),
        clock,
    ))
}

/// Everything a reconciliation test needs
pub struct TrackerHarness {
    pub config: BrokerConfig,
    pub clock: Arc<ManualClock>,
    pub backend: Arc<ScriptedBackend>,
    pub store: Arc<DocumentStore>,
    pub provisioning: Arc<ScriptedProvisioning>,
    pub sink: Arc<CollectingSink>,
    pub tracker: DeploymentTracker,
}

impl TrackerHarness {
    /// Interval long enough that the background loop never ticks during a
    /// test; cycles are driven with [`TrackerHarness::cycle`]
    pub fn manual(max_retries: u32) -> Self {
        let mut config = BrokerConfig::for_test();
        config.reconciliation.interval_ms = 3_600_000;
        config.reconciliation.max_retries = max_retries;
        Self::with_config(config, Arc::new(ManualClock::new()))
    }

    pub fn with_config(config: BrokerConfig, clock: Arc<ManualClock>) -> Self {
        let backend = ScriptedBackend::new();
        let store = test_store(&config, backend.clone(), clock.clone());
        let provisioning = ScriptedProvisioning::new();
        let sink = CollectingSink::new();
        let tracker = DeploymentTracker::new(
            store.clone(),
            provisioning.clone(),
            sink.clone(),
            config.reconciliation.clone(),
            clock.clone(),
        );
        Self {
            config,
            clock,
            backend,
            store,
            provisioning,
            sink,
            tracker,
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.reconciliation.interval()
    }

    /// Let one reconciliation interval pass, then run a cycle
    pub async fn cycle(&self) -> ReconcileSummary {
        self.clock.advance(self.interval());
        self.tracker.reconcile_once().await
    }
}

/// Give spawned tasks a chance to run on the current-thread test runtime
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
