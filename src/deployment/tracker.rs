//! # Deployment Tracker
//!
//! Registry of in-flight provisioning operations plus the background loop
//! that drives them to a terminal state.
//!
//! ## Lifecycle
//!
//! - The loop is not running at construction
//! - The first `track()` on an empty registry spawns it
//! - Each tick runs one reconciliation cycle over every entry whose last
//!   check is at least one interval old
//! - When a cycle leaves the registry empty the loop exits; the next
//!   `track()` starts a fresh one
//!
//! ## Cycle
//!
//! For each entry the provisioning service is polled:
//!
//! 1. Ready: persist `agent_ready/approved` onto the owner record through the
//!    document store, notify, remove
//! 2. Failed: notify, remove; the owner record is left untouched
//! 3. Still running, or the poll itself failed: bump `retry_count`, and
//!    remove (give up) once the retry budget is spent

use super::notification::{DeploymentEvent, DeploymentOutcome, NotificationSink};
use super::provisioning::{OperationStatus, ProvisioningService};
use crate::clock::Clock;
use crate::config::ReconciliationConfig;
use crate::constants::fields;
use crate::error::{BrokerError, BrokerResult};
use crate::logging::log_deployment_operation;
use crate::resilience::RetryPolicy;
use crate::store::DocumentStore;
use crate::workflow::{self, WorkflowStage};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// One tracked operation, keyed by the subject that owns it
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentTrackingEntry {
    pub subject_id: String,
    pub operation_id: String,
    pub operation_name: String,
    pub status: DeploymentStatus,
    pub retry_count: u32,
    /// Non-terminal polls allowed before the entry is given up
    pub max_retries: u32,
    pub start_time: DateTime<Utc>,
    pub last_check: DateTime<Utc>,
    started: Instant,
    /// Monotonic twin of `last_check`
    checked: Instant,
}

impl DeploymentTrackingEntry {
    /// Whether `wait` has passed since the entry was tracked or last polled
    fn is_stale(&self, now: Instant, wait: Duration) -> bool {
        now.saturating_duration_since(self.checked) >= wait
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Counts from a single reconciliation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub polled: usize,
    /// Tracked but checked too recently to poll this cycle
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Removed without reaching a terminal state (retry budget spent)
    pub given_up: usize,
    /// Removed because the result could not be recorded
    pub abandoned: usize,
    pub pending: usize,
}

#[derive(Debug)]
enum CheckOutcome {
    Succeeded,
    Failed,
    Pending(String),
    Abandoned(String),
}

#[derive(Debug, Default)]
struct TrackerState {
    entries: HashMap<String, DeploymentTrackingEntry>,
    loop_handle: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct TrackerInner {
    state: Mutex<TrackerState>,
    store: Arc<DocumentStore>,
    provisioning: Arc<dyn ProvisioningService>,
    sink: Arc<dyn NotificationSink>,
    config: ReconciliationConfig,
    retry_budget: RetryPolicy,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct DeploymentTracker {
    inner: Arc<TrackerInner>,
}

impl DeploymentTracker {
    pub fn new(
        store: Arc<DocumentStore>,
        provisioning: Arc<dyn ProvisioningService>,
        sink: Arc<dyn NotificationSink>,
        config: ReconciliationConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retry_budget = RetryPolicy::fixed(config.max_retries, config.interval());
        Self {
            inner: Arc::new(TrackerInner {
                state: Mutex::new(TrackerState::default()),
                store,
                provisioning,
                sink,
                config,
                retry_budget,
                clock,
            }),
        }
    }

    /// Start tracking an operation for `subject_id`, replacing any entry the
    /// subject already has. Spawns the reconciliation loop if it is idle.
    pub fn track(
        &self,
        subject_id: impl Into<String>,
        operation_id: impl Into<String>,
        operation_name: impl Into<String>,
    ) -> BrokerResult<()> {
        let subject_id = subject_id.into();
        let operation_id = operation_id.into();
        if subject_id.is_empty() || operation_id.is_empty() {
            return Err(BrokerError::InvalidInput(
                "subject_id and operation_id must not be empty".to_string(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            BrokerError::Configuration(format!("Deployment tracking requires a tokio runtime: {e}"))
        })?;

        let now = self.inner.clock.utc_now();
        let started = self.inner.clock.now();
        let entry = DeploymentTrackingEntry {
            subject_id: subject_id.clone(),
            operation_id,
            operation_name: operation_name.into(),
            status: DeploymentStatus::InProgress,
            retry_count: 0,
            max_retries: self.inner.retry_budget.max_attempts(),
            start_time: now,
            last_check: now,
            started,
            checked: started,
        };
        log_deployment_operation(
            "track",
            &entry.subject_id,
            &entry.operation_id,
            "in_progress",
            None,
            Some(&entry.operation_name),
        );

        let mut state = self.inner.state.lock();
        if let Some(previous) = state.entries.insert(subject_id, entry) {
            debug!(
                subject_id = %previous.subject_id,
                operation_id = %previous.operation_id,
                "Replaced tracked operation"
            );
        }
        if state.loop_handle.is_none() {
            info!(
                interval_ms = self.inner.config.interval_ms,
                max_retries = self.inner.config.max_retries,
                "Starting reconciliation loop"
            );
            state.loop_handle = Some(runtime.spawn(run_loop(Arc::clone(&self.inner))));
        }
        Ok(())
    }

    /// Stop tracking a subject without any further action
    pub fn untrack(&self, subject_id: &str) -> Option<DeploymentTrackingEntry> {
        self.inner.state.lock().entries.remove(subject_id)
    }

    pub fn is_tracking(&self, subject_id: &str) -> bool {
        self.inner.state.lock().entries.contains_key(subject_id)
    }

    /// Current entries ordered by subject
    pub fn snapshot(&self) -> Vec<DeploymentTrackingEntry> {
        let mut entries: Vec<_> = self.inner.state.lock().entries.values().cloned().collect();
        entries.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the background loop is currently alive
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().loop_handle.is_some()
    }

    /// Run one reconciliation cycle now
    pub async fn reconcile_once(&self) -> ReconcileSummary {
        self.inner.reconcile_once().await
    }

    /// Stop the background loop; tracked entries are kept
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.state.lock().loop_handle.take() {
            handle.abort();
            info!("Reconciliation loop stopped");
        }
    }

    /// Stop the loop and forget every entry
    pub fn reset(&self) {
        self.shutdown();
        self.inner.state.lock().entries.clear();
    }
}

async fn run_loop(inner: Arc<TrackerInner>) {
    let mut ticker = tokio::time::interval(inner.config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let summary = inner.reconcile_once().await;
        if summary.polled > 0 {
            debug!(
                polled = summary.polled,
                skipped = summary.skipped,
                succeeded = summary.succeeded,
                failed = summary.failed,
                given_up = summary.given_up,
                abandoned = summary.abandoned,
                pending = summary.pending,
                "Reconciliation cycle completed"
            );
        }

        let mut state = inner.state.lock();
        if state.entries.is_empty() {
            state.loop_handle = None;
            info!("No tracked deployments left, reconciliation loop exiting");
            return;
        }
    }
}

/// Mark an entry terminal and drop it from the registry
fn finish(
    entries: &mut HashMap<String, DeploymentTrackingEntry>,
    subject_id: &str,
    status: DeploymentStatus,
    now: DateTime<Utc>,
) {
    if let Some(mut entry) = entries.remove(subject_id) {
        entry.status = status;
        entry.last_check = now;
        let label = match status {
            DeploymentStatus::Succeeded => "succeeded",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::InProgress => "in_progress",
        };
        log_deployment_operation(
            "reconcile",
            &entry.subject_id,
            &entry.operation_id,
            label,
            Some(entry.retry_count),
            None,
        );
    }
}

impl TrackerInner {
    async fn reconcile_once(&self) -> ReconcileSummary {
        let cycle_started = self.clock.now();
        let (due, skipped) = {
            let state = self.state.lock();
            let due: Vec<DeploymentTrackingEntry> = state
                .entries
                .values()
                .filter(|entry| {
                    let wait = self.retry_budget.delay_after(entry.retry_count + 1);
                    entry.is_stale(cycle_started, wait)
                })
                .cloned()
                .collect();
            let skipped = state.entries.len() - due.len();
            (due, skipped)
        };
        if due.is_empty() {
            return ReconcileSummary {
                skipped,
                ..ReconcileSummary::default()
            };
        }

        let outcomes = join_all(due.iter().map(|entry| self.check(entry))).await;

        let mut summary = ReconcileSummary {
            polled: due.len(),
            skipped,
            ..ReconcileSummary::default()
        };
        let now = self.clock.utc_now();
        let mut state = self.state.lock();

        for (polled, outcome) in due.iter().zip(outcomes) {
            // Entry may have been untracked or replaced while polling
            let still_current = state
                .entries
                .get(&polled.subject_id)
                .is_some_and(|current| current.operation_id == polled.operation_id);
            if !still_current {
                continue;
            }

            match outcome {
                CheckOutcome::Succeeded => {
                    summary.succeeded += 1;
                    finish(&mut state.entries, &polled.subject_id, DeploymentStatus::Succeeded, now);
                }
                CheckOutcome::Failed => {
                    summary.failed += 1;
                    finish(&mut state.entries, &polled.subject_id, DeploymentStatus::Failed, now);
                }
                CheckOutcome::Abandoned(reason) => {
                    summary.abandoned += 1;
                    state.entries.remove(&polled.subject_id);
                    error!(
                        subject_id = %polled.subject_id,
                        operation_id = %polled.operation_id,
                        reason = %reason,
                        "Deployment finished but its result could not be recorded"
                    );
                }
                CheckOutcome::Pending(reason) => {
                    let Some(entry) = state.entries.get_mut(&polled.subject_id) else {
                        continue;
                    };
                    entry.retry_count += 1;
                    entry.last_check = now;
                    entry.checked = cycle_started;

                    if entry.retries_exhausted() {
                        summary.given_up += 1;
                        warn!(
                            subject_id = %entry.subject_id,
                            operation_id = %entry.operation_id,
                            retry_count = entry.retry_count,
                            reason = %reason,
                            "Giving up on deployment"
                        );
                        state.entries.remove(&polled.subject_id);
                    } else {
                        summary.pending += 1;
                        debug!(
                            subject_id = %entry.subject_id,
                            operation_id = %entry.operation_id,
                            retry_count = entry.retry_count,
                            reason = %reason,
                            "Deployment still pending"
                        );
                    }
                }
            }
        }

        summary
    }

    async fn check(&self, entry: &DeploymentTrackingEntry) -> CheckOutcome {
        match self.provisioning.operation_status(&entry.operation_id).await {
            Err(e) => {
                warn!(
                    subject_id = %entry.subject_id,
                    operation_id = %entry.operation_id,
                    error = %e,
                    "Provisioning status check failed"
                );
                CheckOutcome::Pending(e.to_string())
            }
            Ok(OperationStatus::InProgress(raw)) => {
                CheckOutcome::Pending(format!("provider status {raw}"))
            }
            Ok(OperationStatus::Failed) => {
                self.notify(entry, DeploymentOutcome::Failed).await;
                CheckOutcome::Failed
            }
            Ok(OperationStatus::Ready) => match self.persist_success(entry).await {
                Ok(()) => {
                    self.notify(entry, DeploymentOutcome::Succeeded).await;
                    CheckOutcome::Succeeded
                }
                Err(
                    e @ (BrokerError::NotFound { .. }
                    | BrokerError::InconsistentState { .. }
                    | BrokerError::ForbiddenField { .. }
                    | BrokerError::InvalidInput(_)),
                ) => CheckOutcome::Abandoned(e.to_string()),
                Err(e) => {
                    warn!(
                        subject_id = %entry.subject_id,
                        error = %e,
                        "Deferring deployment result until the store recovers"
                    );
                    CheckOutcome::Pending(e.to_string())
                }
            },
        }
    }

    /// Write the terminal state onto the owner record, stage and status
    /// together
    async fn persist_success(&self, entry: &DeploymentTrackingEntry) -> BrokerResult<()> {
        let collection = self.config.owner_collection;
        let mut owner = self.store.get(collection, &entry.subject_id).await?;

        workflow::normalize(WorkflowStage::AgentReady)?.apply_to(&mut owner);
        owner.set(
            fields::DEPLOYMENT,
            json!({
                "operationId": entry.operation_id,
                "operationName": entry.operation_name,
                "completedAt": self.clock.utc_now().to_rfc3339(),
            }),
        );

        self.store.save(collection, owner).await?;
        Ok(())
    }

    async fn notify(&self, entry: &DeploymentTrackingEntry, outcome: DeploymentOutcome) {
        let event = DeploymentEvent {
            subject_id: entry.subject_id.clone(),
            operation_id: entry.operation_id.clone(),
            operation_name: entry.operation_name.clone(),
            outcome,
            duration_seconds: self
                .clock
                .now()
                .saturating_duration_since(entry.started)
                .as_secs(),
            occurred_at: self.clock.utc_now(),
        };

        if let Err(e) = self.sink.notify(&event).await {
            warn!(
                subject_id = %entry.subject_id,
                event = outcome.event_name(),
                error = %e,
                "Notification delivery failed"
            );
        }
    }
}
