//! Cache metrics for observability

use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};

lazy_static! {
    /// Cache hit counter
    pub static ref CACHE_HIT: IntCounter = register_int_counter!(
        "rank_cache_hit_total",
        "Total number of rank cache hits"
    )
    .expect("Failed to register rank_cache_hit_total");

    /// Cache miss counter
    pub static ref CACHE_MISS: IntCounter = register_int_counter!(
        "rank_cache_miss_total",
        "Total number of rank cache misses"
    )
    .expect("Failed to register rank_cache_miss_total");

    /// Cache eviction counter (TTL expiry, entry limit, or invalidation)
    pub static ref CACHE_EVICTION: IntCounter = register_int_counter!(
        "rank_cache_eviction_total",
        "Total number of rank cache evictions"
    )
    .expect("Failed to register rank_cache_eviction_total");

    /// Cache invalidation counter
    pub static ref CACHE_INVALIDATION: IntCounter = register_int_counter!(
        "rank_cache_invalidation_total",
        "Total number of rank cache prefix invalidations"
    )
    .expect("Failed to register rank_cache_invalidation_total");
}
