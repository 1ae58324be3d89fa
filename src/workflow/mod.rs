//! # Workflow Consistency
//!
//! A subject's `workflowStage` and `approvalStatus` fields move together.
//! Every stage has a fixed allow-list of companion statuses; any other pair
//! is an inconsistency and is rejected before it reaches storage.

pub mod states;
pub mod validator;

pub use states::{ApprovalStatus, WorkflowStage, WorkflowState};
pub use validator::{
    allowed_statuses, find_inconsistent, is_allowed, normalize, validate, validate_document,
};
