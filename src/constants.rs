//! Shared constants for document layout and cache keys.

/// Cache key under which `get_all` stores a collection-wide listing
pub const ALL_DOCUMENTS_KEY: &str = "__all__";

/// Cache key under which the health report is stored
pub const HEALTH_REPORT_KEY: &str = "__health__";

/// Transient fields that must never reach persistent storage.
///
/// These carry ceremony state (challenges, session material) that lives only
/// for the duration of a request.
pub const RESERVED_TRANSIENT_FIELDS: &[&str] = &[
    "currentChallenge",
    "challengeExpiresAt",
    "sessionToken",
    "plaintextPassword",
];

/// Document field names shared by the facade, validator and reconciler
pub mod fields {
    pub const ID: &str = "_id";
    pub const REVISION: &str = "_rev";
    pub const TYPE: &str = "type";
    pub const WORKFLOW_STAGE: &str = "workflowStage";
    pub const APPROVAL_STATUS: &str = "approvalStatus";
    pub const DEPLOYMENT: &str = "deployment";
}

/// Event names published on deployment outcomes
pub mod events {
    pub const DEPLOYMENT_SUCCEEDED: &str = "deployment.succeeded";
    pub const DEPLOYMENT_FAILED: &str = "deployment.failed";
}
