// ============================================
// Domain Models
// ============================================
//
// Shared data types for the rating/ranking core and the forum
// activity counters. Wire formats live with the (external) API layer;
// these types only carry serde derives so that layer can reuse them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A rated catalog entry (an RPG adventure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpgItem {
    pub id: Uuid,
    pub title: String,
    /// Genre tag; the reserved tag "overall" is never a real genre
    pub genre: String,
    /// Game system (e.g. "D&D 5e"), used only for browse filtering
    pub system: Option<String>,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
}

/// Denormalized rating statistics for one item
///
/// Owned exclusively by the aggregate store; readers only ever see
/// copied snapshots, so a sum/count pair is always consistent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub rating_count: u64,
    pub rating_sum: f64,
}

impl Aggregate {
    pub fn zero() -> Self {
        Self {
            rating_count: 0,
            rating_sum: 0.0,
        }
    }

    /// Plain mean; 0 when the item has no reviews
    pub fn average_rating(&self) -> f64 {
        if self.rating_count == 0 {
            0.0
        } else {
            self.rating_sum / self.rating_count as f64
        }
    }
}

/// A user's review of an item
///
/// At most one active review exists per (author_id, item_id) pair;
/// submitting again replaces the rating instead of inserting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub author_id: Uuid,
    pub item_id: Uuid,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A discussion thread with its denormalized activity counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumThread {
    pub id: Uuid,
    pub category_id: i32,
    pub title: String,
    pub author_id: Uuid,
    /// Display-order hint only; carries no data invariant
    pub is_pinned: bool,
    /// Locked threads reject new posts
    pub is_locked: bool,
    /// Number of posts excluding the opening post
    pub reply_count: u64,
    /// Thread creation time or the latest post time, whichever is later
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A single post inside a thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    /// Caller-supplied; posts may arrive out of order
    pub created_at: DateTime<Utc>,
}

/// One row of a ranked view, enriched for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub item_id: Uuid,
    pub title: String,
    pub genre: String,
    pub rating_count: u64,
    pub average_rating: f64,
    pub bayesian_rating: f64,
}

/// Returned to the caller after a review write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReceipt {
    pub item_id: Uuid,
    pub rating_count: u64,
    pub average_rating: f64,
    pub bayesian_rating: f64,
}

/// Counter values returned after a successful post creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadCounters {
    pub thread_id: Uuid,
    pub reply_count: u64,
    pub last_activity_at: DateTime<Utc>,
}

/// Site-wide display counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStats {
    pub rpg_count: u64,
    pub review_count: u64,
    /// Distinct review authors
    pub user_count: u64,
    pub forum_post_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_rating_zero_when_unreviewed() {
        assert_eq!(Aggregate::zero().average_rating(), 0.0);
    }

    #[test]
    fn test_average_rating() {
        let aggregate = Aggregate {
            rating_count: 4,
            rating_sum: 14.0,
        };
        assert!((aggregate.average_rating() - 3.5).abs() < f64::EPSILON);
    }
}
