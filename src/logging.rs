//! # Structured Logging Module
//!
//! Environment-aware structured logging for the facade and the background
//! reconciliation task. Console output is human-readable by default and JSON
//! when `BROKER_LOG_FORMAT=json`.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = use_json_format();

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // Embedding applications may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Current environment from `BROKER_ENV`, falling back to `APP_ENV`
fn get_environment() -> String {
    std::env::var("BROKER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn use_json_format() -> bool {
    std::env::var("BROKER_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for document store operations
pub fn log_store_operation(
    operation: &str,
    collection: &str,
    id: Option<&str>,
    status: &str,
    attempts: Option<u32>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        collection = %collection,
        id = id,
        status = %status,
        attempts = attempts,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "STORE_OPERATION"
    );
}

/// Log structured data for deployment tracking operations
pub fn log_deployment_operation(
    operation: &str,
    subject_id: &str,
    operation_id: &str,
    status: &str,
    retry_count: Option<u32>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        subject_id = %subject_id,
        operation_id = %operation_id,
        status = %status,
        retry_count = retry_count,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "DEPLOYMENT_OPERATION"
    );
}
