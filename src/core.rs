//! # Broker Core
//!
//! Process-wide service container. Built once at startup and shared by `Arc`;
//! request handlers reach the document store and the deployment tracker
//! through it.

use crate::cache::TtlCache;
use crate::clock::{Clock, SystemClock};
use crate::config::BrokerConfig;
use crate::deployment::{
    BroadcastNotificationSink, DeploymentTracker, HttpProvisioningClient, NotificationSink,
    ProvisioningService,
};
use crate::error::BrokerResult;
use crate::resilience::{CircuitBreaker, RateLimiter};
use crate::store::{CouchDbBackend, DocumentBackend, DocumentStore};
use std::sync::Arc;
use tracing::info;

/// Name shared by the store's rate limiter and circuit breaker
pub const DOCUMENT_STORE_COMPONENT: &str = "document_store";

#[derive(Debug)]
pub struct BrokerCore {
    config: BrokerConfig,
    clock: Arc<dyn Clock>,
    store: Arc<DocumentStore>,
    tracker: DeploymentTracker,
}

impl BrokerCore {
    /// Wire the facade and tracker around the given collaborators
    pub fn bootstrap(
        config: BrokerConfig,
        backend: Arc<dyn DocumentBackend>,
        provisioning: Arc<dyn ProvisioningService>,
        sink: Arc<dyn NotificationSink>,
    ) -> BrokerResult<Self> {
        Self::bootstrap_with_clock(config, backend, provisioning, sink, Arc::new(SystemClock))
    }

    /// As [`BrokerCore::bootstrap`] with an injected clock
    pub fn bootstrap_with_clock(
        config: BrokerConfig,
        backend: Arc<dyn DocumentBackend>,
        provisioning: Arc<dyn ProvisioningService>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> BrokerResult<Self> {
        config.validate()?;
        config.cache.log_configuration();

        let cache = Arc::new(TtlCache::new(&config.cache, Arc::clone(&clock)));
        let limiter = Arc::new(RateLimiter::new(
            DOCUMENT_STORE_COMPONENT.to_string(),
            config.rate_limit.window(),
            config.rate_limit.max_requests,
            Arc::clone(&clock),
        ));
        let breaker = Arc::new(CircuitBreaker::new(
            DOCUMENT_STORE_COMPONENT.to_string(),
            config.circuit_breaker.to_resilience_config(),
            Arc::clone(&clock),
        ));

        let backend_name = backend.backend_name();
        let store = Arc::new(DocumentStore::new(
            backend,
            cache,
            limiter,
            breaker,
            config.write_retry.to_policy(),
            Arc::clone(&clock),
        ));
        let tracker = DeploymentTracker::new(
            Arc::clone(&store),
            provisioning,
            sink,
            config.reconciliation.clone(),
            Arc::clone(&clock),
        );

        info!(
            backend = backend_name,
            rate_limit = config.rate_limit.max_requests,
            rate_window_seconds = config.rate_limit.window_seconds,
            breaker_threshold = config.circuit_breaker.failure_threshold,
            reconcile_interval_ms = config.reconciliation.interval_ms,
            "Broker core bootstrapped"
        );

        Ok(Self {
            config,
            clock,
            store,
            tracker,
        })
    }

    /// Bootstrap against CouchDB and the HTTP provisioning service named in
    /// `config`, publishing notifications on a broadcast channel
    pub fn from_config(config: BrokerConfig) -> BrokerResult<(Self, BroadcastNotificationSink)> {
        let backend = Arc::new(CouchDbBackend::new(&config.couchdb)?);
        let provisioning = Arc::new(HttpProvisioningClient::new(&config.provisioning)?);
        let sink = BroadcastNotificationSink::new(config.notifications.channel_capacity);
        let core = Self::bootstrap(config, backend, provisioning, Arc::new(sink.clone()))?;
        Ok((core, sink))
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    pub fn tracker(&self) -> &DeploymentTracker {
        &self.tracker
    }

    /// Stop the reconciliation task
    pub fn shutdown(&self) {
        self.tracker.shutdown();
        info!("Broker core shut down");
    }

    /// Clear caches, tracked deployments and breaker state
    pub fn reset(&self) {
        self.tracker.reset();
        self.store.reset();
    }
}
