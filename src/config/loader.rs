//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles config directory discovery,
//! environment detection, and layering of files and environment variables on
//! top of the environment preset.

use super::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix for environment overrides, e.g. `BROKER__RATE_LIMIT__MAX_REQUESTS=50`
const ENV_PREFIX: &str = "BROKER";
const ENV_SEPARATOR: &str = "__";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: BrokerConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> BrokerResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> BrokerResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> BrokerResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading broker configuration"
        );

        let config = Self::build_config(&config_directory, environment, true)?;
        config.validate()?;

        info!(
            environment = %environment,
            config = %Self::sanitize_config_for_logging(&config),
            "Configuration loaded successfully"
        );
        config.cache.log_configuration();

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: BrokerConfig, environment: &str) -> BrokerResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    fn build_config(
        config_directory: &Path,
        environment: &str,
        include_env_vars: bool,
    ) -> BrokerResult<BrokerConfig> {
        let preset = BrokerConfig::for_environment(environment);
        let base_file = config_directory.join("broker.toml");
        let env_file = config_directory.join(format!("broker-{environment}.toml"));

        let mut builder = Config::builder()
            .add_source(Config::try_from(&preset)?)
            .add_source(File::from(base_file).required(false))
            .add_source(File::from(env_file).required(false));

        if include_env_vars {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let config: BrokerConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Load only from files, ignoring `BROKER__*` variables
    pub fn load_files_only(
        config_directory: &Path,
        environment: &str,
    ) -> BrokerResult<BrokerConfig> {
        let config = Self::build_config(config_directory, environment, false)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Sanitized configuration for debugging/logging with credentials masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("BROKER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn sanitize_config_for_logging(config: &BrokerConfig) -> serde_json::Value {
        let mut config_json = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
        let sensitive_patterns = ["password", "secret", "token", "credential"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        if !val.is_null() {
                            *val = serde_json::Value::String("[MASKED]".to_string());
                        }
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

impl From<&ConfigManager> for BrokerConfig {
    fn from(manager: &ConfigManager) -> Self {
        manager.config.clone()
    }
}

impl TryFrom<PathBuf> for BrokerConfig {
    type Error = BrokerError;

    /// Parse a single TOML file over production defaults
    fn try_from(path: PathBuf) -> BrokerResult<Self> {
        let config: BrokerConfig = Config::builder()
            .add_source(Config::try_from(&BrokerConfig::default())?)
            .add_source(File::from(path).required(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
