//! Document Cache Configuration
//!
//! Per-collection TTL and capacity settings. Environment presets mirror the
//! way production, development and test deployments trade staleness for
//! backend load.

use crate::cache::Collection;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for a single cached collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTypeConfig {
    /// `None` keeps entries until they are explicitly invalidated
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    1000
}

impl CacheTypeConfig {
    pub const fn expiring(ttl_seconds: u64, max_entries: usize) -> Self {
        Self {
            ttl_seconds: Some(ttl_seconds),
            max_entries,
        }
    }

    pub const fn never_expiring(max_entries: usize) -> Self {
        Self {
            ttl_seconds: None,
            max_entries,
        }
    }

    /// Get TTL as Duration
    pub fn ttl_duration(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }
}

/// Cache settings for every collection the facade serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub users: CacheTypeConfig,
    pub chats: CacheTypeConfig,
    pub agents: CacheTypeConfig,
    pub knowledge_bases: CacheTypeConfig,
    pub health: CacheTypeConfig,
}

impl Default for CacheConfig {
    /// Default configuration suitable for production
    fn default() -> Self {
        Self {
            users: CacheTypeConfig::never_expiring(5000),
            chats: CacheTypeConfig::expiring(300, 2000),
            agents: CacheTypeConfig::expiring(300, 1000),
            knowledge_bases: CacheTypeConfig::expiring(300, 1000),
            health: CacheTypeConfig::expiring(30, 10),
        }
    }
}

impl CacheConfig {
    /// Small capacities so eviction paths get exercised
    pub fn for_test() -> Self {
        Self {
            users: CacheTypeConfig::never_expiring(100),
            chats: CacheTypeConfig::expiring(5, 50),
            agents: CacheTypeConfig::expiring(5, 50),
            knowledge_bases: CacheTypeConfig::expiring(5, 50),
            health: CacheTypeConfig::expiring(1, 10),
        }
    }

    pub fn for_development() -> Self {
        Self {
            users: CacheTypeConfig::never_expiring(1000),
            chats: CacheTypeConfig::expiring(60, 500),
            agents: CacheTypeConfig::expiring(60, 500),
            knowledge_bases: CacheTypeConfig::expiring(60, 500),
            health: CacheTypeConfig::expiring(10, 10),
        }
    }

    /// Settings for a given collection
    pub fn for_collection(&self, collection: Collection) -> &CacheTypeConfig {
        match collection {
            Collection::Users => &self.users,
            Collection::Chats => &self.chats,
            Collection::Agents => &self.agents,
            Collection::KnowledgeBases => &self.knowledge_bases,
            Collection::Health => &self.health,
        }
    }

    pub fn log_configuration(&self) {
        info!("Document Cache Configuration:");
        for collection in Collection::ALL {
            let settings = self.for_collection(collection);
            match settings.ttl_seconds {
                Some(ttl) => info!(
                    "  {}: {}s TTL, {} max entries",
                    collection, ttl, settings.max_entries
                ),
                None => info!(
                    "  {}: no TTL (explicit invalidation), {} max entries",
                    collection, settings.max_entries
                ),
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        for collection in Collection::ALL {
            let settings = self.for_collection(collection);
            if settings.max_entries == 0 {
                return Err(format!("{collection} cache max_entries must be greater than 0"));
            }
            if settings.ttl_seconds == Some(0) {
                warn!(collection = %collection, "Cache TTL is 0 - caching effectively disabled");
            }
        }

        if self.users.ttl_seconds.is_some() {
            warn!("Users cache has a TTL - user documents are normally invalidated only on write");
        }

        Ok(())
    }
}
