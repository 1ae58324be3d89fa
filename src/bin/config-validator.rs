//! # Broker Configuration Validator
//!
//! Command-line tool for validating broker configuration files across
//! environments before starting the service.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use provisioning_broker::cache::Collection;
use provisioning_broker::config::{BrokerConfig, ConfigManager};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate provisioning broker configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Ignore BROKER__* environment variable overrides
    #[arg(long)]
    files_only: bool,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and summarize the effective configuration
    Validate,

    /// Print the effective configuration as JSON, credentials masked
    Show,

    /// Print the cache policy of every collection
    CachePolicies,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Show) => show(&cli),
        Some(Commands::CachePolicies) => cache_policies(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("Configuration invalid: {e:#}");
            process::exit(1);
        }
    }
}

fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir.clone().unwrap_or_else(|| PathBuf::from("config"))
}

fn load(cli: &Cli) -> anyhow::Result<BrokerConfig> {
    let dir = config_dir(cli);
    if cli.files_only {
        ConfigManager::load_files_only(&dir, &cli.environment)
            .with_context(|| format!("loading {} for {}", dir.display(), cli.environment))
    } else {
        ConfigManager::load_from_directory_with_env(Some(dir.clone()), &cli.environment)
            .map(|manager| manager.config().clone())
            .with_context(|| format!("loading {} for {}", dir.display(), cli.environment))
    }
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    println!("Validating broker configuration");
    println!("Environment: {}", cli.environment);
    println!("Config directory: {}", config_dir(cli).display());
    println!();

    let config = load(cli)?;

    if config.couchdb.url.trim().is_empty() {
        bail!("couchdb.url is empty");
    }
    if config.provisioning.base_url.trim().is_empty() {
        bail!("provisioning.base_url is empty");
    }

    println!(
        "rate_limit:      {} requests / {}s",
        config.rate_limit.max_requests, config.rate_limit.window_seconds
    );
    println!(
        "circuit_breaker: opens after {} failures, {}s recovery",
        config.circuit_breaker.failure_threshold, config.circuit_breaker.timeout_seconds
    );
    println!(
        "write_retry:     {} attempts, {}ms base, x{}",
        config.write_retry.max_attempts,
        config.write_retry.base_delay_ms,
        config.write_retry.backoff_multiplier
    );
    println!(
        "reconciliation:  every {}ms, give up after {} polls, owner collection {}",
        config.reconciliation.interval_ms,
        config.reconciliation.max_retries,
        config.reconciliation.owner_collection
    );
    println!("couchdb:         {} / {}", config.couchdb.url, config.couchdb.database);
    println!("provisioning:    {}", config.provisioning.base_url);
    println!();
    println!("All configuration validation checks passed");
    Ok(())
}

fn show(cli: &Cli) -> anyhow::Result<()> {
    let config = load(cli)?;
    let manager = ConfigManager::from_config(config, &cli.environment)?;
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}

fn cache_policies(cli: &Cli) -> anyhow::Result<()> {
    let config = load(cli)?;
    println!("{:<16} {:>10} {:>12}  invalidates on write", "collection", "ttl", "max_entries");
    for collection in Collection::ALL {
        let settings = config.cache.for_collection(collection);
        let ttl = settings
            .ttl_seconds
            .map(|s| format!("{s}s"))
            .unwrap_or_else(|| "never".to_string());
        let dependents: Vec<_> = collection
            .invalidates_on_write()
            .iter()
            .map(Collection::as_str)
            .collect();
        println!(
            "{:<16} {:>10} {:>12}  {}",
            collection.as_str(),
            ttl,
            settings.max_entries,
            dependents.join(", ")
        );
    }
    Ok(())
}
