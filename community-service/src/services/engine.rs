// ============================================
// Community Engine
// ============================================
//
// Wires the aggregate store, ranking engine, ranking cache, thread
// tracker, and stats projector behind the surface the (external) API
// layer consumes.
//
// Write path for a review: per-item critical section → aggregate delta
// → bucket repositioning → cache invalidation. The critical section
// spans the whole sequence, so once a write returns, every later read
// observes the new aggregate and ranking position.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use rank_cache::{CacheKey, RankCache};

use crate::config::Config;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    Aggregate, ForumPost, ForumThread, RankedItem, Review, ReviewReceipt, RpgItem, SiteStats,
    ThreadCounters,
};
use crate::services::aggregates::{AggregateStore, ReviewStore};
use crate::services::ranking::{BayesianScorer, RankingEngine, OVERALL_BUCKET};
use crate::services::stats::StatsProjector;
use crate::services::threads::ThreadActivityTracker;

/// The community backend core: ratings, rankings, forum counters, stats
pub struct CommunityService {
    config: Config,
    aggregates: Arc<AggregateStore>,
    reviews: Arc<ReviewStore>,
    ranking: Arc<RankingEngine>,
    threads: Arc<ThreadActivityTracker>,
    projector: StatsProjector,
    cache: RankCache<Vec<RankedItem>>,
    /// One mutation lock per item id; guards the aggregate-to-bucket sequence
    item_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl CommunityService {
    pub fn new(config: Config) -> ServiceResult<Self> {
        config.validate()?;

        let aggregates = Arc::new(AggregateStore::new());
        let reviews = Arc::new(ReviewStore::new());
        let ranking = Arc::new(RankingEngine::new(BayesianScorer::new(
            config.ranking.prior_mean,
            config.ranking.prior_weight,
        )));
        let threads = Arc::new(ThreadActivityTracker::new());
        let projector = StatsProjector::new(
            Arc::clone(&ranking),
            Arc::clone(&reviews),
            Arc::clone(&threads),
            Duration::from_secs(config.stats.refresh_secs),
        );
        let cache = RankCache::with_limits(Duration::from_secs(config.cache.ttl_secs), 10_000);

        Ok(Self {
            config,
            aggregates,
            reviews,
            ranking,
            threads,
            projector,
            cache,
            item_locks: DashMap::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn item_lock(&self, item_id: Uuid) -> Arc<Mutex<()>> {
        Arc::clone(&self.item_locks.entry(item_id).or_default())
    }

    fn invalidate_rankings(&self, genre: &str) {
        self.cache
            .invalidate_prefix(&CacheKey::rankings_prefix(genre));
        self.cache
            .invalidate_prefix(&CacheKey::rankings_prefix(OVERALL_BUCKET));
    }

    // ========== Catalog ==========

    /// Register an item; it enters the rankings immediately at the prior mean
    pub async fn add_item(&self, item: RpgItem) -> ServiceResult<RpgItem> {
        if item.title.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "item title must not be empty".to_string(),
            ));
        }
        if item.genre.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "item genre must not be empty".to_string(),
            ));
        }
        if item.genre == OVERALL_BUCKET {
            return Err(ServiceError::InvalidInput(format!(
                "\"{}\" is a reserved ranking tag, not a genre",
                OVERALL_BUCKET
            )));
        }

        let lock = self.item_lock(item.id);
        let _guard = lock.lock().await;

        self.aggregates.register_item(item.clone())?;
        self.ranking
            .on_aggregate_changed(item.id, &item.genre, &Aggregate::zero())
            .await;
        self.invalidate_rankings(&item.genre);
        Ok(item)
    }

    /// Remove an item together with its reviews and ranking rows
    pub async fn remove_item(&self, item_id: Uuid) -> ServiceResult<RpgItem> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock().await;

        let item = self.aggregates.remove_item(item_id)?;
        self.reviews.purge_item(item_id);
        self.ranking.on_item_removed(item_id, &item.genre).await;
        self.invalidate_rankings(&item.genre);
        Ok(item)
    }

    /// Browse the catalog (no full-text search; that lives elsewhere)
    pub async fn list_items(
        &self,
        genre: Option<&str>,
        system: Option<&str>,
        featured_only: bool,
    ) -> Vec<RpgItem> {
        self.aggregates.list_items(genre, system, featured_only)
    }

    /// One item's display row: metadata plus current rating statistics
    pub async fn item_summary(&self, item_id: Uuid) -> ServiceResult<RankedItem> {
        let item = self
            .aggregates
            .get_item(item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("item {}", item_id)))?;
        let aggregate = self.aggregates.read(item_id)?;

        Ok(RankedItem {
            item_id,
            title: item.title,
            genre: item.genre,
            rating_count: aggregate.rating_count,
            average_rating: aggregate.average_rating(),
            bayesian_rating: self.ranking.scorer().score(&aggregate),
        })
    }

    // ========== Reviews ==========

    /// Create or update the author's review of an item
    pub async fn submit_review(
        &self,
        author_id: Uuid,
        item_id: Uuid,
        rating: f64,
    ) -> ServiceResult<ReviewReceipt> {
        if !rating.is_finite()
            || rating < self.config.rating.min
            || rating > self.config.rating.max
        {
            return Err(ServiceError::InvalidInput(format!(
                "rating {} outside scale {}..={}",
                rating, self.config.rating.min, self.config.rating.max
            )));
        }

        self.apply_review_change(author_id, item_id, Some(rating))
            .await
    }

    /// Delete the author's review of an item, applying the inverse delta
    pub async fn delete_review(
        &self,
        author_id: Uuid,
        item_id: Uuid,
    ) -> ServiceResult<ReviewReceipt> {
        self.apply_review_change(author_id, item_id, None).await
    }

    /// Most recent reviews across the site, newest first
    pub async fn recent_reviews(&self, limit: usize) -> Vec<Review> {
        self.reviews.recent(limit)
    }

    /// Shared review write path with a single internal Conflict retry
    async fn apply_review_change(
        &self,
        author_id: Uuid,
        item_id: Uuid,
        new_rating: Option<f64>,
    ) -> ServiceResult<ReviewReceipt> {
        let mut retried = false;
        loop {
            match self.apply_review_once(author_id, item_id, new_rating).await {
                Err(err) if err.is_retryable() && !retried => {
                    retried = true;
                    warn!(
                        item_id = %item_id,
                        author_id = %author_id,
                        error = %err,
                        "Review delta conflicted, retrying with fresh state"
                    );
                }
                other => return other,
            }
        }
    }

    async fn apply_review_once(
        &self,
        author_id: Uuid,
        item_id: Uuid,
        new_rating: Option<f64>,
    ) -> ServiceResult<ReviewReceipt> {
        let lock = self.item_lock(item_id);
        let _guard = lock.lock().await;

        let item = self
            .aggregates
            .get_item(item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("item {}", item_id)))?;
        let old_rating = self.reviews.find(author_id, item_id).map(|r| r.rating);

        if new_rating.is_none() && old_rating.is_none() {
            return Err(ServiceError::NotFound(format!(
                "review by {} for item {}",
                author_id, item_id
            )));
        }

        // The aggregate commit goes first: if it fails, nothing has changed.
        // The registry write after it cannot fail.
        let aggregate = self
            .aggregates
            .apply_review(item_id, old_rating, new_rating)?;

        match new_rating {
            Some(rating) => {
                self.reviews.upsert(author_id, item_id, rating, Utc::now());
            }
            None => {
                self.reviews.remove(author_id, item_id);
            }
        }

        self.ranking
            .on_aggregate_changed(item_id, &item.genre, &aggregate)
            .await;
        self.invalidate_rankings(&item.genre);

        Ok(ReviewReceipt {
            item_id,
            rating_count: aggregate.rating_count,
            average_rating: aggregate.average_rating(),
            bayesian_rating: self.ranking.scorer().score(&aggregate),
        })
    }

    // ========== Rankings ==========

    /// Ranked page for a genre (or "overall")
    ///
    /// Served from the cache when enabled; behavior with the cache off is
    /// identical apart from latency. Unknown genres yield an empty page.
    pub async fn rankings(&self, genre: &str, limit: usize, offset: usize) -> Vec<RankedItem> {
        if !self.config.cache.enabled {
            return self.compute_rankings(genre, limit, offset).await;
        }

        let key = CacheKey::rankings(genre, limit, offset);
        let prefix = CacheKey::rankings_prefix(genre);

        if let Some(page) = self.cache.get(&key) {
            return page;
        }

        // Snapshot the generation before computing so an invalidation that
        // lands mid-computation keeps this result out of the cache.
        let generation = self.cache.generation(&prefix);
        let page = self.compute_rankings(genre, limit, offset).await;
        self.cache.insert(&key, page.clone(), &prefix, generation);
        page
    }

    async fn compute_rankings(&self, genre: &str, limit: usize, offset: usize) -> Vec<RankedItem> {
        let entries = self.ranking.query(genre, limit, offset).await;

        entries
            .into_iter()
            .filter_map(|entry| {
                let item = self.aggregates.get_item(entry.item_id)?;
                let aggregate = self.aggregates.read(entry.item_id).ok()?;
                Some(RankedItem {
                    item_id: entry.item_id,
                    title: item.title,
                    genre: item.genre,
                    rating_count: entry.rating_count,
                    average_rating: aggregate.average_rating(),
                    bayesian_rating: entry.score,
                })
            })
            .collect()
    }

    // ========== Forum ==========

    pub async fn create_thread(&self, thread: ForumThread) -> ServiceResult<ForumThread> {
        if thread.title.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "thread title must not be empty".to_string(),
            ));
        }
        self.threads.create_thread(thread)
    }

    pub async fn set_thread_locked(
        &self,
        thread_id: Uuid,
        locked: bool,
    ) -> ServiceResult<ForumThread> {
        self.threads.set_locked(thread_id, locked)
    }

    pub async fn set_thread_pinned(
        &self,
        thread_id: Uuid,
        pinned: bool,
    ) -> ServiceResult<ForumThread> {
        self.threads.set_pinned(thread_id, pinned)
    }

    /// Create a post; the reply counter and activity timestamp move in the
    /// same logical transaction or not at all
    pub async fn create_post(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> ServiceResult<ThreadCounters> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::InvalidInput(
                "post content must not be empty".to_string(),
            ));
        }

        self.threads
            .record_post(thread_id, author_id, trimmed.to_string(), created_at)
    }

    pub async fn thread(&self, thread_id: Uuid) -> ServiceResult<ForumThread> {
        self.threads.describe(thread_id)
    }

    pub async fn thread_posts(&self, thread_id: Uuid) -> ServiceResult<Vec<ForumPost>> {
        self.threads.posts(thread_id)
    }

    pub async fn list_threads(&self, category_id: Option<i32>) -> Vec<ForumThread> {
        self.threads.list_threads(category_id)
    }

    // ========== Stats ==========

    pub async fn stats(&self) -> SiteStats {
        self.projector.snapshot().await
    }
}
