//! Collection tags and their cache policies.

use crate::config::CacheConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Closed set of document collections served by the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users = 0,
    Chats = 1,
    Agents = 2,
    KnowledgeBases = 3,
    Health = 4,
}

/// Collections whose cached views embed data from the keyed collection and
/// must be dropped when it is written. Indexed by `Collection as usize`.
const WRITE_INVALIDATION_TABLE: [&[Collection]; 5] = [
    // Users: the all-chats aggregate and the health report embed user data
    &[Collection::Chats, Collection::Health],
    // Chats
    &[],
    // Agents
    &[],
    // KnowledgeBases
    &[],
    // Health
    &[],
];

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Users,
        Collection::Chats,
        Collection::Agents,
        Collection::KnowledgeBases,
        Collection::Health,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Chats => "chats",
            Self::Agents => "agents",
            Self::KnowledgeBases => "knowledge_bases",
            Self::Health => "health",
        }
    }

    /// Collections whose caches a successful write to `self` makes stale
    pub fn invalidates_on_write(&self) -> &'static [Collection] {
        WRITE_INVALIDATION_TABLE[*self as usize]
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|collection| collection.as_str() == s)
            .ok_or_else(|| format!("Unknown collection: {s}"))
    }
}

/// Expiry and invalidation policy for one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub collection: Collection,
    /// `None` means entries never expire by age
    pub ttl: Option<Duration>,
    pub max_entries: usize,
    pub invalidates_on_write: &'static [Collection],
}

impl CachePolicy {
    /// Build the policy table for every collection from configuration
    pub fn table(config: &CacheConfig) -> [CachePolicy; 5] {
        Collection::ALL.map(|collection| {
            let settings = config.for_collection(collection);
            CachePolicy {
                collection,
                ttl: settings.ttl_duration(),
                max_entries: settings.max_entries,
                invalidates_on_write: collection.invalidates_on_write(),
            }
        })
    }

    /// Whether an entry of the given age is still servable
    pub fn is_fresh(&self, age: Duration) -> bool {
        match self.ttl {
            Some(ttl) => age < ttl,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_round_trips_through_str() {
        for collection in Collection::ALL {
            assert_eq!(collection.as_str().parse::<Collection>(), Ok(collection));
        }
        assert!("invoices".parse::<Collection>().is_err());
    }

    #[test]
    fn test_users_write_invalidates_derived_views() {
        assert_eq!(
            Collection::Users.invalidates_on_write(),
            &[Collection::Chats, Collection::Health]
        );
        assert!(Collection::Agents.invalidates_on_write().is_empty());
    }

    #[test]
    fn test_policy_table_follows_config() {
        let table = CachePolicy::table(&CacheConfig::default());
        assert_eq!(table[Collection::Users as usize].ttl, None);
        assert_eq!(
            table[Collection::Health as usize].ttl,
            Some(Duration::from_secs(30))
        );
        for (index, policy) in table.iter().enumerate() {
            assert_eq!(policy.collection as usize, index);
        }
    }

    #[test]
    fn test_freshness() {
        let expiring = CachePolicy {
            collection: Collection::Chats,
            ttl: Some(Duration::from_secs(10)),
            max_entries: 1,
            invalidates_on_write: &[],
        };
        assert!(expiring.is_fresh(Duration::from_secs(9)));
        assert!(!expiring.is_fresh(Duration::from_secs(10)));

        let forever = CachePolicy {
            ttl: None,
            ..expiring
        };
        assert!(forever.is_fresh(Duration::from_secs(86_400 * 365)));
    }
}
