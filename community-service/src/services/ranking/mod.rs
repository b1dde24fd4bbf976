// ============================================
// Ranking Engine
// ============================================
//
// Maintains ordered ranking buckets, one per genre plus the reserved
// "overall" bucket spanning every item.
//
// Data flow:
// 1. Aggregate changes → item is re-scored and re-positioned
// 2. Re-positioning is a localized remove + binary-search reinsert
//    under the bucket's write lock, never a full rebuild
// 3. Readers slice a bucket under the read lock
//
// Two engines fed the same aggregate history in the same order hold
// identical buckets; ordering uses a strict total order with no ties.

pub mod scorer;

pub use scorer::BayesianScorer;

use std::cmp::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::Aggregate;

/// Reserved bucket tag spanning all genres
pub const OVERALL_BUCKET: &str = "overall";

/// One row of a ranking bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketEntry {
    pub item_id: Uuid,
    pub score: f64,
    pub rating_count: u64,
}

impl BucketEntry {
    /// Bucket order: score desc, rating_count desc, item id asc
    ///
    /// `total_cmp` keeps the order total even for pathological floats, and
    /// the id tie-break means two distinct items never compare equal.
    fn ranking_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.rating_count.cmp(&self.rating_count))
            .then_with(|| self.item_id.cmp(&other.item_id))
    }
}

/// Computes Bayesian scores and keeps per-genre buckets ordered
pub struct RankingEngine {
    scorer: BayesianScorer,
    buckets: DashMap<String, Arc<RwLock<Vec<BucketEntry>>>>,
}

impl RankingEngine {
    pub fn new(scorer: BayesianScorer) -> Self {
        let buckets = DashMap::new();
        buckets.insert(
            OVERALL_BUCKET.to_string(),
            Arc::new(RwLock::new(Vec::new())),
        );
        Self { scorer, buckets }
    }

    pub fn scorer(&self) -> &BayesianScorer {
        &self.scorer
    }

    fn bucket(&self, genre: &str) -> Option<Arc<RwLock<Vec<BucketEntry>>>> {
        self.buckets.get(genre).map(|bucket| Arc::clone(&bucket))
    }

    fn bucket_or_create(&self, genre: &str) -> Arc<RwLock<Vec<BucketEntry>>> {
        Arc::clone(
            &self
                .buckets
                .entry(genre.to_string())
                .or_insert_with(|| Arc::new(RwLock::new(Vec::new()))),
        )
    }

    /// Re-score an item and re-position it in its genre bucket and "overall"
    ///
    /// The remove + reinsert for each bucket happens under one write-lock
    /// acquisition, so no reader ever sees the item missing or duplicated.
    pub async fn on_aggregate_changed(&self, item_id: Uuid, genre: &str, aggregate: &Aggregate) {
        let entry = BucketEntry {
            item_id,
            score: self.scorer.score(aggregate),
            rating_count: aggregate.rating_count,
        };

        for bucket in [self.bucket_or_create(OVERALL_BUCKET), self.bucket_or_create(genre)] {
            let mut entries = bucket.write().await;
            reposition(&mut entries, entry);
        }

        debug!(
            item_id = %item_id,
            genre = %genre,
            score = entry.score,
            rating_count = entry.rating_count,
            "Repositioned item in ranking buckets"
        );
    }

    /// Drop an item from its genre bucket and "overall"
    pub async fn on_item_removed(&self, item_id: Uuid, genre: &str) {
        for bucket_tag in [OVERALL_BUCKET, genre] {
            if let Some(bucket) = self.bucket(bucket_tag) {
                let mut entries = bucket.write().await;
                if let Some(pos) = entries.iter().position(|e| e.item_id == item_id) {
                    entries.remove(pos);
                }
            }
        }

        debug!(item_id = %item_id, genre = %genre, "Removed item from ranking buckets");
    }

    /// Slice a bucket
    ///
    /// An unknown or empty genre yields an empty page, not an error; any
    /// fallback to "overall" belongs to the caller.
    pub async fn query(&self, genre: &str, limit: usize, offset: usize) -> Vec<BucketEntry> {
        let Some(bucket) = self.bucket(genre) else {
            return Vec::new();
        };

        let entries = bucket.read().await;
        entries.iter().skip(offset).take(limit).copied().collect()
    }

    /// Number of items in a bucket; "overall" doubles as the catalog size
    pub async fn bucket_len(&self, genre: &str) -> usize {
        match self.bucket(genre) {
            Some(bucket) => bucket.read().await.len(),
            None => 0,
        }
    }
}

/// Remove any previous row for the entry's item, then binary-insert at the
/// position the total order dictates
fn reposition(entries: &mut Vec<BucketEntry>, entry: BucketEntry) {
    if let Some(pos) = entries.iter().position(|e| e.item_id == entry.item_id) {
        entries.remove(pos);
    }

    let insert_at = entries
        .binary_search_by(|probe| probe.ranking_cmp(&entry))
        .unwrap_or_else(|pos| pos);
    entries.insert(insert_at, entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> RankingEngine {
        RankingEngine::new(BayesianScorer::new(3.0, 5.0))
    }

    fn aggregate(count: u64, sum: f64) -> Aggregate {
        Aggregate {
            rating_count: count,
            rating_sum: sum,
        }
    }

    fn uuid_from(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[tokio::test]
    async fn test_items_sorted_by_score_desc() {
        let engine = engine();
        let low = uuid_from(1);
        let high = uuid_from(2);

        engine
            .on_aggregate_changed(low, "fantasy", &aggregate(10, 20.0))
            .await;
        engine
            .on_aggregate_changed(high, "fantasy", &aggregate(10, 48.0))
            .await;

        let page = engine.query("fantasy", 10, 0).await;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].item_id, high);
        assert_eq!(page[1].item_id, low);
    }

    #[tokio::test]
    async fn test_tie_broken_by_count_then_id() {
        let engine = engine();
        let a = uuid_from(1);
        let b = uuid_from(2);
        let c = uuid_from(3);

        // b and c have identical score and count; a has the same score with
        // a higher count and must lead.
        engine
            .on_aggregate_changed(c, "fantasy", &aggregate(2, 6.0))
            .await;
        engine
            .on_aggregate_changed(b, "fantasy", &aggregate(2, 6.0))
            .await;
        engine
            .on_aggregate_changed(a, "fantasy", &aggregate(4, 12.0))
            .await;

        let page = engine.query("fantasy", 10, 0).await;
        let ids: Vec<Uuid> = page.iter().map(|e| e.item_id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[tokio::test]
    async fn test_reposition_moves_existing_row() {
        let engine = engine();
        let riser = uuid_from(1);
        let anchor = uuid_from(2);

        engine
            .on_aggregate_changed(anchor, "fantasy", &aggregate(20, 80.0))
            .await;
        engine
            .on_aggregate_changed(riser, "fantasy", &aggregate(1, 2.0))
            .await;

        let page = engine.query("fantasy", 10, 0).await;
        assert_eq!(page[0].item_id, anchor);

        // A wave of high ratings lifts the riser above the anchor.
        engine
            .on_aggregate_changed(riser, "fantasy", &aggregate(50, 250.0))
            .await;

        let page = engine.query("fantasy", 10, 0).await;
        assert_eq!(page[0].item_id, riser);
        assert_eq!(page.len(), 2, "reposition must not duplicate the row");
    }

    #[tokio::test]
    async fn test_unknown_and_empty_genre_yield_empty_page() {
        let engine = engine();
        engine
            .on_aggregate_changed(uuid_from(1), "fantasy", &aggregate(1, 5.0))
            .await;

        assert!(engine.query("sci-fi", 10, 0).await.is_empty());
        assert!(engine.query("", 10, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_overall_bucket_spans_genres() {
        let engine = engine();
        engine
            .on_aggregate_changed(uuid_from(1), "fantasy", &aggregate(1, 5.0))
            .await;
        engine
            .on_aggregate_changed(uuid_from(2), "horror", &aggregate(1, 4.0))
            .await;

        assert_eq!(engine.bucket_len(OVERALL_BUCKET).await, 2);
        assert_eq!(engine.bucket_len("fantasy").await, 1);
    }

    #[tokio::test]
    async fn test_limit_and_offset_slice() {
        let engine = engine();
        for n in 1..=5u64 {
            engine
                .on_aggregate_changed(uuid_from(n as u128), "fantasy", &aggregate(n, 5.0 * n as f64))
                .await;
        }

        let full = engine.query("fantasy", 10, 0).await;
        let page = engine.query("fantasy", 2, 1).await;
        assert_eq!(page.len(), 2);
        assert_eq!(page[0], full[1]);
        assert_eq!(page[1], full[2]);

        assert!(engine.query("fantasy", 10, 99).await.is_empty());
    }

    #[tokio::test]
    async fn test_removed_item_leaves_both_buckets() {
        let engine = engine();
        let item = uuid_from(1);
        engine
            .on_aggregate_changed(item, "fantasy", &aggregate(3, 12.0))
            .await;

        engine.on_item_removed(item, "fantasy").await;

        assert!(engine.query("fantasy", 10, 0).await.is_empty());
        assert!(engine.query(OVERALL_BUCKET, 10, 0).await.is_empty());
    }
}
