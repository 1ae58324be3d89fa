//! Per-collection TTL cache.

use super::collection::{CachePolicy, Collection};
use super::errors::{CacheError, CacheResult};
use crate::clock::Clock;
use crate::config::CacheConfig;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// In-memory document cache with an independent expiry policy per collection
#[derive(Debug)]
pub struct TtlCache {
    policies: [CachePolicy; 5],
    entries: DashMap<Collection, HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TtlCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            policies: CachePolicy::table(config),
            entries: DashMap::new(),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn policy(&self, collection: Collection) -> &CachePolicy {
        &self.policies[collection as usize]
    }

    /// Fetch a value if present and younger than the collection's TTL.
    ///
    /// Expired entries are removed and reported as a miss.
    pub fn get(&self, collection: Collection, key: &str) -> Option<Value> {
        let policy = self.policy(collection);
        let now = self.clock.now();

        let result = match self.entries.get_mut(&collection) {
            Some(mut bucket) => match bucket
                .get(key)
                .map(|entry| now.saturating_duration_since(entry.inserted_at))
            {
                Some(age) if policy.is_fresh(age) => bucket.get(key).map(|entry| entry.value.clone()),
                Some(_) => {
                    bucket.remove(key);
                    debug!(collection = %collection, key = key, "Cache entry expired");
                    None
                }
                None => None,
            },
            None => None,
        };

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(collection = %collection, key = key, "Cache HIT");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(collection = %collection, key = key, "Cache MISS");
        }

        result
    }

    /// Store a value, restarting its expiry clock.
    ///
    /// Null and empty values are refused so a failed lookup can never shadow
    /// a later successful write.
    pub fn set(&self, collection: Collection, key: &str, value: Value) -> CacheResult<()> {
        if is_empty_value(&value) {
            return Err(CacheError::EmptyValue {
                collection: collection.to_string(),
                key: key.to_string(),
            });
        }

        let policy = self.policy(collection);
        let now = self.clock.now();
        let mut bucket = self.entries.entry(collection).or_default();

        if !bucket.contains_key(key) && bucket.len() >= policy.max_entries {
            let oldest = bucket
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(oldest_key, _)| oldest_key.clone());
            if let Some(oldest_key) = oldest {
                bucket.remove(&oldest_key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(collection = %collection, key = %oldest_key, "Cache capacity reached, evicted oldest entry");
            }
        }

        bucket.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
            },
        );
        debug!(collection = %collection, key = key, "Cache SET");
        Ok(())
    }

    /// Drop one key, or the whole collection when `key` is `None`
    pub fn invalidate(&self, collection: Collection, key: Option<&str>) {
        match key {
            Some(key) => {
                if let Some(mut bucket) = self.entries.get_mut(&collection) {
                    bucket.remove(key);
                }
                debug!(collection = %collection, key = key, "Cache DEL");
            }
            None => {
                self.entries.remove(&collection);
                debug!(collection = %collection, "Cache collection cleared");
            }
        }
    }

    /// Number of entries currently held (including not-yet-collected expired ones)
    pub fn len(&self) -> usize {
        self.entries.iter().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Clear every entry and counter
    pub fn reset(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
