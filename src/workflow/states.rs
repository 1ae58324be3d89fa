use crate::constants::fields;
use crate::error::{BrokerError, BrokerResult};
use crate::store::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a subject sits in the provisioning lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    /// Account exists, nothing requested yet
    Registered,
    /// Provisioning requested, awaiting an approval decision
    RequestSubmitted,
    Approved,
    /// External deployment in flight
    Provisioning,
    /// Deployment confirmed ready by the provisioning service
    AgentReady,
    Active,
    Rejected,
    Suspended,
}

impl WorkflowStage {
    pub const ALL: [WorkflowStage; 8] = [
        Self::Registered,
        Self::RequestSubmitted,
        Self::Approved,
        Self::Provisioning,
        Self::AgentReady,
        Self::Active,
        Self::Rejected,
        Self::Suspended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::RequestSubmitted => "request_submitted",
            Self::Approved => "approved",
            Self::Provisioning => "provisioning",
            Self::AgentReady => "agent_ready",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkflowStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("Invalid workflow stage: {s}"))
    }
}

/// Approval decision recorded alongside the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 4] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Suspended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("Invalid approval status: {s}"))
    }
}

/// The coupled `(stage, status)` pair; `status: None` means unset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowState {
    pub stage: WorkflowStage,
    pub status: Option<ApprovalStatus>,
}

impl WorkflowState {
    pub fn new(stage: WorkflowStage, status: Option<ApprovalStatus>) -> Self {
        Self { stage, status }
    }

    /// Read the pair from a document.
    ///
    /// `Ok(None)` when the document carries neither field. A status without a
    /// stage, or an unrecognized value, is rejected rather than guessed.
    pub fn from_document(document: &Document) -> BrokerResult<Option<WorkflowState>> {
        let stage = read_field::<WorkflowStage>(document, fields::WORKFLOW_STAGE)?;
        let status = read_field::<ApprovalStatus>(document, fields::APPROVAL_STATUS)?;

        match (stage, status) {
            (None, None) => Ok(None),
            (None, Some(status)) => Err(BrokerError::InvalidInput(format!(
                "Document {} has {}={} but no {}",
                document.id,
                fields::APPROVAL_STATUS,
                status,
                fields::WORKFLOW_STAGE
            ))),
            (Some(stage), status) => Ok(Some(WorkflowState::new(stage, status))),
        }
    }

    /// Write both fields together; an unset status removes the field
    pub fn apply_to(&self, document: &mut Document) {
        document.set(fields::WORKFLOW_STAGE, Value::String(self.stage.to_string()));
        match self.status {
            Some(status) => document.set(fields::APPROVAL_STATUS, Value::String(status.to_string())),
            None => {
                document.remove(fields::APPROVAL_STATUS);
            }
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "stage={}, status={}", self.stage, status),
            None => write!(f, "stage={}, status=unset", self.stage),
        }
    }
}

fn read_field<T>(document: &Document, name: &str) -> BrokerResult<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    match document.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| BrokerError::InvalidInput(format!("Document {}: {e}", document.id))),
        Some(other) => Err(BrokerError::InvalidInput(format!(
            "Document {}: {name} must be a string, got {other}",
            document.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_round_trip() {
        for stage in WorkflowStage::ALL {
            assert_eq!(stage.to_string().parse::<WorkflowStage>(), Ok(stage));
        }
        for status in ApprovalStatus::ALL {
            assert_eq!(status.to_string().parse::<ApprovalStatus>(), Ok(status));
        }
        assert!("launched".parse::<WorkflowStage>().is_err());
    }

    #[test]
    fn test_serde_matches_display() {
        assert_eq!(
            serde_json::to_value(WorkflowStage::AgentReady).unwrap(),
            json!("agent_ready")
        );
        assert_eq!(
            serde_json::to_value(ApprovalStatus::Pending).unwrap(),
            json!("pending")
        );
    }

    #[test]
    fn test_from_document() {
        let plain = Document::new("alice").with_field("email", json!("a@example.com"));
        assert_eq!(WorkflowState::from_document(&plain).unwrap(), None);

        let staged = Document::new("alice")
            .with_field(fields::WORKFLOW_STAGE, json!("request_submitted"))
            .with_field(fields::APPROVAL_STATUS, json!("pending"));
        assert_eq!(
            WorkflowState::from_document(&staged).unwrap(),
            Some(WorkflowState::new(
                WorkflowStage::RequestSubmitted,
                Some(ApprovalStatus::Pending)
            ))
        );

        let unset = Document::new("bob").with_field(fields::WORKFLOW_STAGE, json!("registered"));
        assert_eq!(
            WorkflowState::from_document(&unset).unwrap(),
            Some(WorkflowState::new(WorkflowStage::Registered, None))
        );
    }

    #[test]
    fn test_from_document_rejects_orphan_status_and_garbage() {
        let orphan = Document::new("alice").with_field(fields::APPROVAL_STATUS, json!("approved"));
        assert!(WorkflowState::from_document(&orphan).is_err());

        let garbage = Document::new("alice").with_field(fields::WORKFLOW_STAGE, json!(42));
        assert!(WorkflowState::from_document(&garbage).is_err());
    }

    #[test]
    fn test_apply_to_writes_both_fields() {
        let mut doc = Document::new("alice").with_field(fields::APPROVAL_STATUS, json!("pending"));

        WorkflowState::new(WorkflowStage::Registered, None).apply_to(&mut doc);
        assert_eq!(doc.get_str(fields::WORKFLOW_STAGE), Some("registered"));
        assert!(doc.get(fields::APPROVAL_STATUS).is_none());

        WorkflowState::new(WorkflowStage::AgentReady, Some(ApprovalStatus::Approved)).apply_to(&mut doc);
        assert_eq!(doc.get_str(fields::WORKFLOW_STAGE), Some("agent_ready"));
        assert_eq!(doc.get_str(fields::APPROVAL_STATUS), Some("approved"));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            WorkflowState::new(WorkflowStage::Registered, None).to_string(),
            "stage=registered, status=unset"
        );
    }
}
