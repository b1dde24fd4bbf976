//! Unified cache key schema
//!
//! All callers must use these key generators to ensure consistency.
//! Key format: v{VERSION}:{entity}:{identifier}[:sub_key]

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Ranking page for a genre
    /// Format: v1:rankings:{genre}:{limit}:{offset}
    pub fn rankings(genre: &str, limit: usize, offset: usize) -> String {
        format!("v{}:rankings:{}:{}:{}", CACHE_VERSION, genre, limit, offset)
    }

    /// Prefix covering every ranking page of a genre
    pub fn rankings_prefix(genre: &str) -> String {
        format!("v{}:rankings:{}:", CACHE_VERSION, genre)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rankings_key_format() {
        assert_eq!(
            CacheKey::rankings("fantasy", 10, 20),
            format!("v{}:rankings:fantasy:10:20", CACHE_VERSION)
        );
    }

    #[test]
    fn test_page_keys_share_genre_prefix() {
        let prefix = CacheKey::rankings_prefix("horror");
        assert!(CacheKey::rankings("horror", 10, 0).starts_with(&prefix));
        assert!(CacheKey::rankings("horror", 25, 50).starts_with(&prefix));
        assert!(!CacheKey::rankings("horror-lite", 10, 0).starts_with(&prefix));
    }
}
