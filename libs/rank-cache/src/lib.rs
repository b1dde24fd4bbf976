//! Process-local caching layer for ranking queries
//!
//! Provides a consistent memoization strategy for read-heavy ranked views:
//! - Unified key schema with versioning
//! - TTL-based expiration
//! - Prefix invalidation by key removal (no value patching)
//! - Generation guard so a slow reader cannot re-seed invalidated data
//! - Metrics integration

mod keys;
mod metrics;

pub use keys::{CacheKey, CACHE_VERSION};
pub use metrics::{CACHE_EVICTION, CACHE_HIT, CACHE_INVALIDATION, CACHE_MISS};

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cached entry with TTL metadata
#[derive(Debug, Clone)]
struct CachedEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> CachedEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    #[inline]
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory TTL cache for ranked query results
///
/// Invalidation removes keys under a prefix and bumps that prefix's
/// generation. An insert carries the generation the caller observed before
/// computing; if an invalidation landed in between, the insert is dropped so
/// the cache never holds data older than the state that produced it.
pub struct RankCache<T> {
    store: DashMap<String, CachedEntry<T>>,
    generations: DashMap<String, u64>,
    ttl: Duration,
    max_entries: usize,
}

impl<T: Clone> RankCache<T> {
    /// Create a cache with default limits (30s TTL, 10,000 entries)
    pub fn new() -> Self {
        Self::with_limits(Duration::from_secs(30), 10_000)
    }

    /// Create a cache with custom TTL and entry limit
    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        debug!(
            ttl_secs = ttl.as_secs(),
            max_entries, "Initializing rank cache"
        );

        Self {
            store: DashMap::new(),
            generations: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Current generation for a key prefix
    ///
    /// Callers snapshot this before computing a result and pass it back to
    /// [`RankCache::insert`].
    pub fn generation(&self, prefix: &str) -> u64 {
        self.generations.get(prefix).map(|g| *g).unwrap_or(0)
    }

    /// Get a cached value if present and not expired
    pub fn get(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                CACHE_HIT.inc();
                debug!(key = %key, "rank cache HIT");
                return Some(entry.value.clone());
            }
            drop(entry);
            self.evict_entry(key);
        }

        CACHE_MISS.inc();
        debug!(key = %key, "rank cache MISS");
        None
    }

    /// Store a computed value, unless the prefix was invalidated since
    /// `observed_generation` was snapshotted
    ///
    /// Returns whether the value was actually stored.
    pub fn insert(&self, key: &str, value: T, prefix: &str, observed_generation: u64) -> bool {
        if self.ttl.is_zero() {
            return false;
        }

        if self.generation(prefix) != observed_generation {
            debug!(key = %key, "rank cache insert dropped, prefix invalidated mid-flight");
            return false;
        }

        self.enforce_limits();
        self.store
            .insert(key.to_string(), CachedEntry::new(value, self.ttl));

        debug!(key = %key, ttl_secs = self.ttl.as_secs(), "rank cache STORE");
        true
    }

    /// Invalidate every entry under a key prefix
    ///
    /// Removal only: entries are never patched in place. Returns the number
    /// of keys removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        *self.generations.entry(prefix.to_string()).or_insert(0) += 1;

        let keys_to_remove: Vec<_> = self
            .store
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let invalidated = keys_to_remove.len();
        for key in keys_to_remove {
            self.evict_entry(&key);
        }

        CACHE_INVALIDATION.inc();
        debug!(prefix = %prefix, invalidated, "rank cache INVALIDATE");
        invalidated
    }

    /// Clear all entries
    pub fn clear(&self) {
        let count = self.store.len();
        self.store.clear();
        warn!(cleared_entries = count, "rank cache CLEAR");
    }

    /// Current number of live entries (expired entries may linger until read)
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Evict oldest-iterated entries when over the entry limit
    fn enforce_limits(&self) {
        if self.store.len() < self.max_entries {
            return;
        }

        let evict_count = (self.store.len() / 10).max(1);
        warn!(
            current_entries = self.store.len(),
            evict_count, "rank cache limit exceeded, evicting entries"
        );

        let keys_to_evict: Vec<_> = self
            .store
            .iter()
            .take(evict_count)
            .map(|entry| entry.key().clone())
            .collect();

        for key in keys_to_evict {
            self.evict_entry(&key);
        }
    }

    fn evict_entry(&self, key: &str) {
        if self.store.remove(key).is_some() {
            CACHE_EVICTION.inc();
            debug!(key = %key, "rank cache EVICT");
        }
    }
}

impl<T: Clone> Default for RankCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
