//! # Broker Configuration System
//!
//! Layered configuration for the document-store facade and the deployment
//! reconciler. Every section has production defaults; files and environment
//! variables override only what they name.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults (`BrokerConfig::default()`)
//! 2. `config/broker.toml`
//! 3. `config/broker-{environment}.toml`
//! 4. `BROKER__SECTION__KEY` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provisioning_broker::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let window = manager.config().rate_limit.window();
//! # Ok(())
//! # }
//! ```

pub mod cache_config;
pub mod loader;

use crate::cache::Collection;
use crate::error::{BrokerError, BrokerResult};
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use cache_config::{CacheConfig, CacheTypeConfig};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `config/broker.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerComponentConfig,
    pub write_retry: WriteRetryConfig,
    pub reconciliation: ReconciliationConfig,
    pub notifications: NotificationConfig,
    pub couchdb: CouchDbConfig,
    pub provisioning: ProvisioningConfig,
}

/// Outbound request budget for the document backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_seconds: u64,
    pub max_requests: u32,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            max_requests: 100,
        }
    }
}

/// File-facing breaker settings, converted into the runtime
/// [`CircuitBreakerConfig`] at bootstrap
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerComponentConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

impl CircuitBreakerComponentConfig {
    pub fn to_resilience_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_seconds: 30,
        }
    }
}

/// Conflict-retry policy for document writes
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WriteRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl WriteRetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_multiplier,
        )
    }
}

impl Default for WriteRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
        }
    }
}

/// Deployment reconciliation loop settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub interval_ms: u64,
    /// Poll cycles (in-progress or transient error) before giving up on an operation
    pub max_retries: u32,
    /// Collection holding the records that own tracked deployments
    pub owner_collection: Collection,
}

impl ReconciliationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            max_retries: 120,
            owner_collection: Collection::Users,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
        }
    }
}

/// CouchDB connection settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CouchDbConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout_seconds: u64,
}

impl CouchDbConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for CouchDbConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5984".to_string(),
            database: "broker".to_string(),
            username: None,
            password: None,
            request_timeout_seconds: 10,
        }
    }
}

/// External provisioning service settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_seconds: u64,
}

impl ProvisioningConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v2".to_string(),
            api_token: None,
            request_timeout_seconds: 15,
        }
    }
}

impl BrokerConfig {
    /// Fast intervals and short timeouts for test suites
    pub fn for_test() -> Self {
        Self {
            cache: CacheConfig::for_test(),
            circuit_breaker: CircuitBreakerComponentConfig {
                failure_threshold: 5,
                timeout_seconds: 1,
            },
            write_retry: WriteRetryConfig {
                max_attempts: 3,
                base_delay_ms: 1,
                backoff_multiplier: 2.0,
            },
            reconciliation: ReconciliationConfig {
                interval_ms: 20,
                max_retries: 5,
                owner_collection: Collection::Users,
            },
            notifications: NotificationConfig {
                channel_capacity: 64,
            },
            ..Self::default()
        }
    }

    pub fn for_development() -> Self {
        Self {
            cache: CacheConfig::for_development(),
            ..Self::default()
        }
    }

    /// Preset for a named environment, before any file or env overrides
    pub fn for_environment(environment: &str) -> Self {
        match environment {
            "test" => Self::for_test(),
            "development" => Self::for_development(),
            _ => Self::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> BrokerResult<()> {
        self.cache.validate().map_err(BrokerError::Configuration)?;

        if self.rate_limit.window_seconds == 0 {
            return Err(BrokerError::Configuration(
                "rate_limit.window_seconds must be greater than 0".to_string(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(BrokerError::Configuration(
                "rate_limit.max_requests must be greater than 0".to_string(),
            ));
        }

        self.circuit_breaker
            .to_resilience_config()
            .validate()
            .map_err(BrokerError::Configuration)?;

        if self.write_retry.max_attempts == 0 {
            return Err(BrokerError::Configuration(
                "write_retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.write_retry.backoff_multiplier < 1.0 {
            return Err(BrokerError::Configuration(
                "write_retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.reconciliation.interval_ms == 0 {
            return Err(BrokerError::Configuration(
                "reconciliation.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.reconciliation.max_retries == 0 {
            return Err(BrokerError::Configuration(
                "reconciliation.max_retries must be greater than 0".to_string(),
            ));
        }

        if self.notifications.channel_capacity == 0 {
            return Err(BrokerError::Configuration(
                "notifications.channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = BrokerConfig::default();
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(
            config.circuit_breaker.to_resilience_config().timeout,
            Duration::from_secs(30)
        );
        assert_eq!(config.write_retry.max_attempts, 3);
        assert_eq!(config.reconciliation.interval(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_validate() {
        for env in ["test", "development", "production"] {
            let config = BrokerConfig::for_environment(env);
            assert!(config.validate().is_ok(), "{env} preset should validate");
        }
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = BrokerConfig::default();
        config.rate_limit.max_requests = 0;
        assert!(matches!(config.validate(), Err(BrokerError::Configuration(_))));

        let mut config = BrokerConfig::default();
        config.write_retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.reconciliation.interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_retry_policy_backoff() {
        let policy = WriteRetryConfig::default().to_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    }
}
