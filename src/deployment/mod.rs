//! # Deployment Reconciliation
//!
//! Tracks long-running provisioning operations and writes their outcome back
//! onto the owning record through the document store.

pub mod notification;
pub mod provisioning;
pub mod tracker;

pub use notification::{
    BroadcastNotificationSink, DeploymentEvent, DeploymentOutcome, LoggingNotificationSink,
    NotificationSink, NotifyError,
};
pub use provisioning::{HttpProvisioningClient, OperationStatus, ProvisioningError, ProvisioningService};
pub use tracker::{DeploymentStatus, DeploymentTracker, DeploymentTrackingEntry, ReconcileSummary};
