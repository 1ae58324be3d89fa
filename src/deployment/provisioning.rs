//! External provisioning service boundary.

use crate::config::ProvisioningConfig;
use crate::error::{BrokerError, BrokerResult};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

/// Normalized state of a long-running deployment operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Ready,
    Failed,
    /// Still running; carries the raw provider status for logs
    InProgress(String),
}

impl OperationStatus {
    /// Map a provider status string. `running` means the deployed service is
    /// serving, so it counts as ready.
    pub fn from_provider_status(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" | "ready" => Self::Ready,
            "failed" | "error" => Self::Failed,
            _ => Self::InProgress(raw.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    #[error("Provisioning request failed: {0}")]
    Transport(String),
    #[error("Provisioning service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid provisioning response: {0}")]
    InvalidResponse(String),
}

impl From<ProvisioningError> for BrokerError {
    fn from(error: ProvisioningError) -> Self {
        BrokerError::ExternalService(error.to_string())
    }
}

#[async_trait]
pub trait ProvisioningService: Send + Sync + Debug {
    async fn operation_status(&self, operation_id: &str) -> Result<OperationStatus, ProvisioningError>;
}

#[derive(Debug, Deserialize)]
struct OperationResponse {
    status: String,
}

/// `GET {base_url}/operations/{id}` client
pub struct HttpProvisioningClient {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpProvisioningClient {
    pub fn new(config: &ProvisioningConfig) -> BrokerResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| BrokerError::Configuration(format!("Invalid provisioning.base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BrokerError::Configuration(format!(
                "provisioning.base_url cannot be used as a base URL: {}",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| BrokerError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_token: config.api_token.clone(),
        })
    }

    fn operation_url(&self, operation_id: &str) -> Result<Url, ProvisioningError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProvisioningError::Transport("Base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .push("operations")
            .push(operation_id);
        Ok(url)
    }
}

impl std::fmt::Debug for HttpProvisioningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvisioningClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[async_trait]
impl ProvisioningService for HttpProvisioningClient {
    async fn operation_status(&self, operation_id: &str) -> Result<OperationStatus, ProvisioningError> {
        let url = self.operation_url(operation_id)?;
        let mut request = self.client.get(url);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProvisioningError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProvisioningError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: OperationResponse = response
            .json()
            .await
            .map_err(|e| ProvisioningError::InvalidResponse(e.to_string()))?;
        debug!(operation_id = %operation_id, status = %body.status, "Operation status fetched");

        Ok(OperationStatus::from_provider_status(&body.status))
    }
}
