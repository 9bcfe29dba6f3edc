//! Named registry of live cache statistics.
//!
//! The registry is created by the composition root and handed to whoever builds caches, so
//! tests and multiple service instances each get their own view.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::CacheStats;

/// Anything that can report a [`CacheStats`] snapshot.
pub trait StatsSource: Send + Sync {
    fn stats(&self) -> CacheStats;
}

#[derive(Default, Clone)]
pub struct CacheStatsRegistry {
    sources: Arc<RwLock<BTreeMap<String, Arc<dyn StatsSource>>>>,
}

impl CacheStatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cache under `name`, replacing any previous registration.
    pub fn register(&self, name: impl Into<String>, source: Arc<dyn StatsSource>) {
        let name = name.into();
        tracing::debug!(cache = %name, "cache registered for stats");
        self.sources.write().insert(name, source);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.sources.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<CacheStats> {
        self.sources.read().get(name).map(|s| s.stats())
    }

    /// Point-in-time stats for every registered cache, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, CacheStats> {
        self.sources
            .read()
            .iter()
            .map(|(name, source)| (name.clone(), source.stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::{BoundedTtlCache, TieredCache};
    use crate::clock::ManualClock;

    use super::*;

    #[test]
    fn snapshot_reflects_live_counters() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: Arc<BoundedTtlCache<String, u32>> =
            Arc::new(BoundedTtlCache::new(1_000, None, clock.clone()));
        let tiered: Arc<TieredCache<String, u32>> =
            Arc::new(TieredCache::new(1, 2, None, clock));

        let registry = CacheStatsRegistry::new();
        registry.register("requests", cache.clone());
        registry.register("hot", tiered.clone());

        cache.set("a".into(), 1);
        cache.get(&"a".into());
        tiered.get_stale(&"nope".into());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot["requests"],
            CacheStats {
                keys: 1,
                hits: 1,
                misses: 0
            }
        );
        assert_eq!(snapshot["hot"].misses, 1);
    }

    #[test]
    fn registries_are_independent() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: Arc<BoundedTtlCache<String, u32>> =
            Arc::new(BoundedTtlCache::new(1_000, None, clock));

        let first = CacheStatsRegistry::new();
        let second = CacheStatsRegistry::new();
        first.register("only-here", cache);

        assert!(first.get("only-here").is_some());
        assert!(second.get("only-here").is_none());
        assert!(first.unregister("only-here"));
        assert!(first.snapshot().is_empty());
    }
}
