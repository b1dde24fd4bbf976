// ============================================
// Site Stats Projector
// ============================================
//
// Pure read-side assembly of the site-wide display counters. No state
// of its own beyond a refresh-interval snapshot; staleness here is a
// configuration choice, not a correctness concern.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::models::SiteStats;
use crate::services::aggregates::ReviewStore;
use crate::services::ranking::{RankingEngine, OVERALL_BUCKET};
use crate::services::threads::ThreadActivityTracker;

/// Derives `{rpg_count, review_count, user_count, forum_post_count}` from
/// the live stores, serving a bounded-staleness snapshot
pub struct StatsProjector {
    ranking: Arc<RankingEngine>,
    reviews: Arc<ReviewStore>,
    threads: Arc<ThreadActivityTracker>,
    refresh_interval: Duration,
    snapshot: RwLock<Option<(Instant, SiteStats)>>,
}

impl StatsProjector {
    pub fn new(
        ranking: Arc<RankingEngine>,
        reviews: Arc<ReviewStore>,
        threads: Arc<ThreadActivityTracker>,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            ranking,
            reviews,
            threads,
            refresh_interval,
            snapshot: RwLock::new(None),
        }
    }

    /// Current site counters, recomputed when the cached snapshot ages out
    pub async fn snapshot(&self) -> SiteStats {
        if !self.refresh_interval.is_zero() {
            if let Some((taken_at, stats)) = *self.snapshot.read().await {
                if taken_at.elapsed() < self.refresh_interval {
                    return stats;
                }
            }
        }

        let stats = self.recompute().await;
        *self.snapshot.write().await = Some((Instant::now(), stats));
        stats
    }

    async fn recompute(&self) -> SiteStats {
        let stats = SiteStats {
            rpg_count: self.ranking.bucket_len(OVERALL_BUCKET).await as u64,
            review_count: self.reviews.review_count(),
            user_count: self.reviews.distinct_author_count(),
            forum_post_count: self.threads.total_post_count(),
        };

        debug!(
            rpg_count = stats.rpg_count,
            review_count = stats.review_count,
            user_count = stats.user_count,
            forum_post_count = stats.forum_post_count,
            "Recomputed site stats"
        );
        stats
    }
}
