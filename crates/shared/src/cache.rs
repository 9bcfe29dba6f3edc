//! In-memory caches with per-entry TTL and FIFO capacity eviction.
//!
//! [`BoundedTtlCache`] expires entries lazily on read and, when a capacity is configured,
//! evicts by insertion order (not recency). [`TieredCache`] layers a fresh horizon on top of
//! it so one stored value can be served as "fresh" for a short window and as "stale" until
//! the underlying TTL runs out.
//!
//! All operations are synchronous. The internal mutex is held only for the duration of a
//! single call, so readers and the single hot-cache writer never observe a partial update.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::models::{CacheStats, HotCacheEntry, HotCacheKey};
use crate::stats::StatsSource;

/// A stored value with the time it was written and how long it lives.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at_ms: i64,
    pub ttl_ms: i64,
    /// Insertion sequence, kept across overwrites.
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.inserted_at_ms.saturating_add(self.ttl_ms)
    }
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// seq -> key, oldest first.
    order: BTreeMap<u64, K>,
    next_seq: u64,
    hits: u64,
    misses: u64,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.order.pop_first() else {
            return false;
        };
        self.entries.remove(&key);
        true
    }
}

/// Capacity-bounded key/value store where every entry expires `ttl_ms` after insertion.
pub struct BoundedTtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    default_ttl_ms: i64,
    max_keys: Option<usize>,
    clock: Arc<dyn Clock>,
}

impl<K, V> BoundedTtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// `max_keys = None` leaves the cache unbounded.
    pub fn new(default_ttl_ms: i64, max_keys: Option<usize>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
                hits: 0,
                misses: 0,
            }),
            default_ttl_ms,
            max_keys: max_keys.filter(|m| *m > 0),
            clock,
        }
    }

    pub fn default_ttl_ms(&self) -> i64 {
        self.default_ttl_ms
    }

    /// Returns the value if present and unexpired. Expired entries are dropped here.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        let lookup = inner
            .entries
            .get(key)
            .map(|e| (!e.is_expired(now)).then(|| e.value.clone()));

        match lookup {
            Some(Some(value)) => {
                inner.hits += 1;
                Some(value)
            }
            Some(None) => {
                inner.remove(key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Like [`get`](Self::get) but leaves counters and expired entries untouched.
    pub fn peek(&self, key: &K) -> Option<V> {
        let now = self.clock.now_ms();
        self.inner
            .lock()
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl_ms);
    }

    /// Inserts or overwrites. Only a new key can trigger eviction; an overwrite keeps the
    /// key's original place in the eviction order.
    pub fn set_with_ttl(&self, key: K, value: V, ttl_ms: i64) {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.inserted_at_ms = now;
            entry.ttl_ms = ttl_ms;
            return;
        }

        if let Some(max_keys) = self.max_keys {
            while inner.entries.len() >= max_keys {
                if !inner.evict_oldest() {
                    break;
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at_ms: now,
                ttl_ms,
                seq,
            },
        );
    }

    pub fn delete(&self, key: &K) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Presence check for an unexpired entry. Does not touch the hit/miss counters.
    pub fn has(&self, key: &K) -> bool {
        let now = self.clock.now_ms();
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Physically present keys in insertion order, expired ones included.
    pub fn keys(&self) -> Vec<K> {
        self.inner.lock().order.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            keys: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

impl<K, V> StatsSource for BoundedTtlCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    fn stats(&self) -> CacheStats {
        BoundedTtlCache::stats(self)
    }
}

/// Value plus the end of its fresh window.
#[derive(Debug, Clone)]
pub struct TieredEntry<V> {
    pub value: V,
    pub fresh_until_ms: i64,
}

/// Two nested read horizons over one stored value.
///
/// The underlying cache TTL is the stale horizon; the fresh horizon is checked on read.
pub struct TieredCache<K, V> {
    store: BoundedTtlCache<K, TieredEntry<V>>,
    fresh_ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl<K, V> TieredCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// A fresh TTL longer than the stale TTL is clamped so the fresh window always nests
    /// inside the stale one.
    pub fn new(
        fresh_ttl_secs: u64,
        stale_ttl_secs: u64,
        max_keys: Option<usize>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if fresh_ttl_secs > stale_ttl_secs {
            tracing::warn!(
                fresh_ttl_secs,
                stale_ttl_secs,
                "fresh ttl exceeds stale ttl, clamping"
            );
        }
        let stale_ttl_ms = secs_to_ms(stale_ttl_secs);
        let fresh_ttl_ms = secs_to_ms(fresh_ttl_secs).min(stale_ttl_ms);
        Self {
            store: BoundedTtlCache::new(stale_ttl_ms, max_keys, clock.clone()),
            fresh_ttl_ms,
            clock,
        }
    }

    pub fn fresh_ttl_ms(&self) -> i64 {
        self.fresh_ttl_ms
    }

    pub fn stale_ttl_ms(&self) -> i64 {
        self.store.default_ttl_ms()
    }

    pub fn set(&self, key: K, value: V) {
        let fresh_until_ms = self.clock.now_ms().saturating_add(self.fresh_ttl_ms);
        self.store.set(
            key,
            TieredEntry {
                value,
                fresh_until_ms,
            },
        );
    }

    /// Value only while inside its fresh window.
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        let now = self.clock.now_ms();
        self.store
            .get(key)
            .filter(|e| now <= e.fresh_until_ms)
            .map(|e| e.value)
    }

    /// Value until the stale horizon, regardless of freshness.
    pub fn get_stale(&self, key: &K) -> Option<V> {
        self.store.get(key).map(|e| e.value)
    }

    /// Stale read for introspection; does not count as a hit or miss.
    pub fn peek_stale(&self, key: &K) -> Option<V> {
        self.store.peek(key).map(|e| e.value)
    }

    pub fn delete(&self, key: &K) -> bool {
        self.store.delete(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}

impl<K, V> StatsSource for TieredCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    fn stats(&self) -> CacheStats {
        TieredCache::stats(self)
    }
}

/// The background-warmed cache of popular wallets' timelines.
pub type HotCache = TieredCache<HotCacheKey, Arc<HotCacheEntry>>;

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}
