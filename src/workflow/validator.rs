//! Allow-list check for the coupled `(stage, status)` fields.

use super::states::{ApprovalStatus, WorkflowStage, WorkflowState};
use crate::error::{BrokerError, BrokerResult};
use crate::store::Document;
use tracing::warn;

/// Legal companion statuses for each stage. `None` is the unset status.
pub fn allowed_statuses(stage: WorkflowStage) -> &'static [Option<ApprovalStatus>] {
    match stage {
        WorkflowStage::Registered => &[None],
        WorkflowStage::RequestSubmitted => &[Some(ApprovalStatus::Pending)],
        WorkflowStage::Approved
        | WorkflowStage::Provisioning
        | WorkflowStage::AgentReady
        | WorkflowStage::Active => &[Some(ApprovalStatus::Approved)],
        WorkflowStage::Rejected => &[Some(ApprovalStatus::Rejected)],
        WorkflowStage::Suspended => &[Some(ApprovalStatus::Suspended)],
    }
}

pub fn is_allowed(state: &WorkflowState) -> bool {
    allowed_statuses(state.stage).contains(&state.status)
}

/// Reject any pair missing from the allow-list
pub fn validate(state: &WorkflowState) -> BrokerResult<()> {
    if is_allowed(state) {
        Ok(())
    } else {
        Err(BrokerError::InconsistentState { state: *state })
    }
}

/// Validate the workflow fields of a document, if it has any
pub fn validate_document(document: &Document) -> BrokerResult<()> {
    match WorkflowState::from_document(document)? {
        Some(state) => validate(&state).inspect_err(|_| {
            warn!(
                id = %document.id,
                state = %state,
                "Rejected inconsistent workflow state"
            );
        }),
        None => Ok(()),
    }
}

/// Target state for moving to `stage`, with the companion status normalized.
///
/// Only stages with exactly one legal status can be normalized.
pub fn normalize(stage: WorkflowStage) -> BrokerResult<WorkflowState> {
    match allowed_statuses(stage) {
        [status] => Ok(WorkflowState::new(stage, *status)),
        _ => Err(BrokerError::InvalidInput(format!(
            "Stage {stage} has no single companion status"
        ))),
    }
}

/// Ids and states of documents whose stored pair is not allow-listed
pub fn find_inconsistent(documents: &[Document]) -> Vec<(String, WorkflowState)> {
    documents
        .iter()
        .filter_map(|doc| match WorkflowState::from_document(doc) {
            Ok(Some(state)) if !is_allowed(&state) => Some((doc.id.clone(), state)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::fields;
    use proptest::prelude::*;
    use serde_json::json;

    fn stage_strategy() -> impl Strategy<Value = WorkflowStage> {
        proptest::sample::select(WorkflowStage::ALL.to_vec())
    }

    fn status_strategy() -> impl Strategy<Value = Option<ApprovalStatus>> {
        proptest::option::of(proptest::sample::select(ApprovalStatus::ALL.to_vec()))
    }

    #[test]
    fn test_documented_pairs() {
        use ApprovalStatus as S;
        use WorkflowStage as W;

        let legal = [
            (W::Registered, None),
            (W::RequestSubmitted, Some(S::Pending)),
            (W::Approved, Some(S::Approved)),
            (W::Provisioning, Some(S::Approved)),
            (W::AgentReady, Some(S::Approved)),
            (W::Active, Some(S::Approved)),
            (W::Rejected, Some(S::Rejected)),
            (W::Suspended, Some(S::Suspended)),
        ];
        for (stage, status) in legal {
            assert!(validate(&WorkflowState::new(stage, status)).is_ok());
        }

        // Unset status is only legal where explicitly listed
        assert!(validate(&WorkflowState::new(W::AgentReady, None)).is_err());
        assert!(validate(&WorkflowState::new(W::RequestSubmitted, None)).is_err());
        assert!(validate(&WorkflowState::new(W::Registered, Some(S::Approved))).is_err());
        assert!(validate(&WorkflowState::new(W::Active, Some(S::Pending))).is_err());
    }

    #[test]
    fn test_error_carries_offending_state() {
        let state = WorkflowState::new(WorkflowStage::Rejected, Some(ApprovalStatus::Approved));
        assert_eq!(
            validate(&state),
            Err(BrokerError::InconsistentState { state })
        );
    }

    #[test]
    fn test_validate_document() {
        let plain = Document::new("alice").with_field("email", json!("a@example.com"));
        assert!(validate_document(&plain).is_ok());

        let bad = Document::new("alice")
            .with_field(fields::WORKFLOW_STAGE, json!("active"))
            .with_field(fields::APPROVAL_STATUS, json!("rejected"));
        assert!(matches!(
            validate_document(&bad),
            Err(BrokerError::InconsistentState { .. })
        ));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize(WorkflowStage::AgentReady).unwrap(),
            WorkflowState::new(WorkflowStage::AgentReady, Some(ApprovalStatus::Approved))
        );
        assert_eq!(
            normalize(WorkflowStage::Registered).unwrap(),
            WorkflowState::new(WorkflowStage::Registered, None)
        );
    }

    #[test]
    fn test_find_inconsistent() {
        let docs = vec![
            Document::new("ok")
                .with_field(fields::WORKFLOW_STAGE, json!("approved"))
                .with_field(fields::APPROVAL_STATUS, json!("approved")),
            Document::new("bad").with_field(fields::WORKFLOW_STAGE, json!("provisioning")),
            Document::new("plain"),
        ];
        let flagged = find_inconsistent(&docs);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].0, "bad");
    }

    proptest! {
        #[test]
        fn prop_validate_agrees_with_allow_list(stage in stage_strategy(), status in status_strategy()) {
            let state = WorkflowState::new(stage, status);
            let listed = allowed_statuses(stage).contains(&status);
            prop_assert_eq!(validate(&state).is_ok(), listed);
        }

        #[test]
        fn prop_normalized_states_are_valid(stage in stage_strategy()) {
            let state = normalize(stage).unwrap();
            prop_assert!(is_allowed(&state));
            prop_assert_eq!(state.stage, stage);
        }
    }
}
