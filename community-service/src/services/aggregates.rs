// ============================================
// Aggregate Store
// ============================================
//
// Durable per-item rating statistics (count, sum) plus the review
// registry that feeds them.
//
// Delta application is read-compute-commit: the commit re-checks the
// entry version and rejects with Conflict when a concurrent structural
// change (item removal, interleaved delta) got there first. Callers
// holding the engine's per-item lock never trip this; direct store use
// gets the same safety an external persistence layer would provide.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Aggregate, Review, RpgItem};

#[derive(Debug, Clone)]
struct StoredItem {
    item: RpgItem,
    aggregate: Aggregate,
    version: u64,
}

/// Item catalog with exclusively-owned rating aggregates
pub struct AggregateStore {
    items: DashMap<Uuid, StoredItem>,
}

impl AggregateStore {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Add a catalog entry with a zeroed aggregate
    pub fn register_item(&self, item: RpgItem) -> ServiceResult<()> {
        let id = item.id;
        match self.items.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
                "item {} is already registered",
                id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(StoredItem {
                    item,
                    aggregate: Aggregate::zero(),
                    version: 0,
                });
                info!(item_id = %id, "Registered item");
                Ok(())
            }
        }
    }

    /// Drop a catalog entry, returning its metadata
    pub fn remove_item(&self, item_id: Uuid) -> ServiceResult<RpgItem> {
        let (_, stored) = self
            .items
            .remove(&item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("item {}", item_id)))?;
        info!(item_id = %item_id, "Removed item");
        Ok(stored.item)
    }

    pub fn get_item(&self, item_id: Uuid) -> Option<RpgItem> {
        self.items.get(&item_id).map(|stored| stored.item.clone())
    }

    pub fn contains(&self, item_id: Uuid) -> bool {
        self.items.contains_key(&item_id)
    }

    pub fn item_count(&self) -> u64 {
        self.items.len() as u64
    }

    /// Browse the catalog with optional filters, newest first
    pub fn list_items(
        &self,
        genre: Option<&str>,
        system: Option<&str>,
        featured_only: bool,
    ) -> Vec<RpgItem> {
        let mut items: Vec<RpgItem> = self
            .items
            .iter()
            .map(|stored| stored.item.clone())
            .filter(|item| genre.map_or(true, |g| item.genre == g))
            .filter(|item| system.map_or(true, |s| item.system.as_deref() == Some(s)))
            .filter(|item| !featured_only || item.is_featured)
            .collect();

        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        items
    }

    /// Apply a review delta to an item's aggregate
    ///
    /// `delta = (new ?? 0) - (old ?? 0)`; the count moves by -1/0/+1
    /// depending on which side is present. Fails with `NotFound` for an
    /// unknown item and `Conflict` when the commit loses a structural race
    /// or the count would underflow. Returns the committed snapshot.
    pub fn apply_review(
        &self,
        item_id: Uuid,
        old_rating: Option<f64>,
        new_rating: Option<f64>,
    ) -> ServiceResult<Aggregate> {
        let (version, mut aggregate) = {
            let stored = self
                .items
                .get(&item_id)
                .ok_or_else(|| ServiceError::NotFound(format!("item {}", item_id)))?;
            (stored.version, stored.aggregate)
        };

        let delta = new_rating.unwrap_or(0.0) - old_rating.unwrap_or(0.0);
        aggregate.rating_sum += delta;
        aggregate.rating_count = match (new_rating.is_some(), old_rating.is_some()) {
            (true, false) => aggregate.rating_count + 1,
            (false, true) => aggregate.rating_count.checked_sub(1).ok_or_else(|| {
                ServiceError::Conflict(format!("rating count underflow for item {}", item_id))
            })?,
            _ => aggregate.rating_count,
        };
        if aggregate.rating_count == 0 {
            // Sum of zero active reviews is exactly zero; drop float residue
            // so delete-then-resubmit round-trips precisely.
            aggregate.rating_sum = 0.0;
        }

        let mut stored = self.items.get_mut(&item_id).ok_or_else(|| {
            ServiceError::Conflict(format!("item {} was removed mid-update", item_id))
        })?;
        if stored.version != version {
            return Err(ServiceError::Conflict(format!(
                "aggregate for item {} changed mid-update",
                item_id
            )));
        }
        stored.aggregate = aggregate;
        stored.version += 1;

        debug!(
            item_id = %item_id,
            rating_count = aggregate.rating_count,
            rating_sum = aggregate.rating_sum,
            "Applied review delta"
        );
        Ok(aggregate)
    }

    /// Consistent snapshot of an item's aggregate
    pub fn read(&self, item_id: Uuid) -> ServiceResult<Aggregate> {
        self.items
            .get(&item_id)
            .map(|stored| stored.aggregate)
            .ok_or_else(|| ServiceError::NotFound(format!("item {}", item_id)))
    }
}

impl Default for AggregateStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Active reviews, one per (author, item) pair
///
/// The pair uniqueness is the store's invariant, not the UI's: a second
/// submission for the same pair replaces the rating in place.
pub struct ReviewStore {
    reviews: DashMap<(Uuid, Uuid), Review>,
}

impl ReviewStore {
    pub fn new() -> Self {
        Self {
            reviews: DashMap::new(),
        }
    }

    /// Insert or replace the author's review of an item
    ///
    /// Returns the stored review and the prior rating when this was an
    /// update rather than a first submission.
    pub fn upsert(
        &self,
        author_id: Uuid,
        item_id: Uuid,
        rating: f64,
        now: DateTime<Utc>,
    ) -> (Review, Option<f64>) {
        let mut prior = None;
        let review = self
            .reviews
            .entry((author_id, item_id))
            .and_modify(|existing| {
                prior = Some(existing.rating);
                existing.rating = rating;
                existing.updated_at = now;
            })
            .or_insert_with(|| Review {
                id: Uuid::new_v4(),
                author_id,
                item_id,
                rating,
                created_at: now,
                updated_at: now,
            })
            .clone();

        (review, prior)
    }

    /// Remove the author's review of an item, returning it if present
    pub fn remove(&self, author_id: Uuid, item_id: Uuid) -> Option<Review> {
        self.reviews
            .remove(&(author_id, item_id))
            .map(|(_, review)| review)
    }

    pub fn find(&self, author_id: Uuid, item_id: Uuid) -> Option<Review> {
        self.reviews
            .get(&(author_id, item_id))
            .map(|review| review.value().clone())
    }

    /// Drop every review of an item (catalog removal cascade)
    pub fn purge_item(&self, item_id: Uuid) -> usize {
        let before = self.reviews.len();
        self.reviews.retain(|(_, rid), _| *rid != item_id);
        before - self.reviews.len()
    }

    pub fn review_count(&self) -> u64 {
        self.reviews.len() as u64
    }

    /// Number of distinct review authors
    pub fn distinct_author_count(&self) -> u64 {
        let authors: HashSet<Uuid> = self
            .reviews
            .iter()
            .map(|review| review.author_id)
            .collect();
        authors.len() as u64
    }

    /// Most recent reviews across all items, newest first
    pub fn recent(&self, limit: usize) -> Vec<Review> {
        let mut reviews: Vec<Review> = self.reviews.iter().map(|r| r.value().clone()).collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        reviews.truncate(limit);
        reviews
    }
}

impl Default for ReviewStore {
    fn default() -> Self {
        Self::new()
    }
}
