//! Deployment outcome notifications.

use crate::constants::events;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOutcome {
    Succeeded,
    Failed,
}

impl DeploymentOutcome {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Succeeded => events::DEPLOYMENT_SUCCEEDED,
            Self::Failed => events::DEPLOYMENT_FAILED,
        }
    }
}

/// Payload delivered when a tracked operation reaches a terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub subject_id: String,
    pub operation_id: String,
    pub operation_name: String,
    pub outcome: DeploymentOutcome,
    pub duration_seconds: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Outbound notification channel. Delivery is best effort; callers log
/// failures and carry on.
#[async_trait]
pub trait NotificationSink: Send + Sync + Debug {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError>;
}

/// Fan-out sink for in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastNotificationSink {
    sender: broadcast::Sender<DeploymentEvent>,
}

impl BroadcastNotificationSink {
    /// Create a new sink with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotificationSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotificationSink {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError> {
        // send() only fails when nobody is subscribed, which is fine
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

/// Sink that only writes a log line
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn notify(&self, event: &DeploymentEvent) -> Result<(), NotifyError> {
        info!(
            event = event.outcome.event_name(),
            subject_id = %event.subject_id,
            operation_id = %event.operation_id,
            operation_name = %event.operation_name,
            duration_seconds = event.duration_seconds,
            "Deployment notification"
        );
        Ok(())
    }
}
