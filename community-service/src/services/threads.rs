// ============================================
// Thread Activity Tracker
// ============================================
//
// Maintains per-thread reply counts and last-activity timestamps as
// posts are created, and enforces locked/pinned semantics.
//
// A thread's posts and counters live in one map entry, so the post
// append and the counter update are a single critical section: there is
// no observable post-without-counter state. The last-activity timestamp
// only moves forward, which keeps it stable under out-of-order delivery.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{ForumPost, ForumThread, ThreadCounters};

#[derive(Debug)]
struct ThreadRecord {
    thread: ForumThread,
    posts: Vec<ForumPost>,
}

/// Per-thread activity counters with locked/pinned handling
pub struct ThreadActivityTracker {
    threads: DashMap<Uuid, ThreadRecord>,
    total_posts: AtomicU64,
}

impl ThreadActivityTracker {
    pub fn new() -> Self {
        Self {
            threads: DashMap::new(),
            total_posts: AtomicU64::new(0),
        }
    }

    /// Register a thread, normalizing the counter fields this tracker owns
    ///
    /// Reply count starts at zero (the opening post is not a reply) and the
    /// last activity is the thread's own creation time.
    pub fn create_thread(&self, mut thread: ForumThread) -> ServiceResult<ForumThread> {
        let id = thread.id;
        thread.reply_count = 0;
        thread.last_activity_at = thread.created_at;

        match self.threads.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
                "thread {} already exists",
                id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let created = thread.clone();
                slot.insert(ThreadRecord {
                    thread,
                    posts: Vec::new(),
                });
                info!(thread_id = %id, "Thread created");
                Ok(created)
            }
        }
    }

    /// Moderator lock/unlock; the tracker honors the flag, it does not own it
    pub fn set_locked(&self, thread_id: Uuid, locked: bool) -> ServiceResult<ForumThread> {
        let mut record = self
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| ServiceError::NotFound(format!("thread {}", thread_id)))?;

        record.thread.is_locked = locked;
        info!(thread_id = %thread_id, locked, "Thread lock state changed");
        Ok(record.thread.clone())
    }

    /// Moderator pin/unpin; a display-order hint only
    pub fn set_pinned(&self, thread_id: Uuid, pinned: bool) -> ServiceResult<ForumThread> {
        let mut record = self
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| ServiceError::NotFound(format!("thread {}", thread_id)))?;

        record.thread.is_pinned = pinned;
        info!(thread_id = %thread_id, pinned, "Thread pin state changed");
        Ok(record.thread.clone())
    }

    /// Append a post and update the thread's counters in one atomic step
    ///
    /// Fails with `NotFound` for an unknown thread and `ThreadLocked` for a
    /// locked one; either failure leaves the thread untouched. The
    /// last-activity timestamp advances only when the post is not older
    /// than the current value.
    pub fn record_post(
        &self,
        thread_id: Uuid,
        author_id: Uuid,
        content: String,
        created_at: DateTime<Utc>,
    ) -> ServiceResult<ThreadCounters> {
        let mut record = self
            .threads
            .get_mut(&thread_id)
            .ok_or_else(|| ServiceError::NotFound(format!("thread {}", thread_id)))?;

        if record.thread.is_locked {
            return Err(ServiceError::ThreadLocked(format!("thread {}", thread_id)));
        }

        let post = ForumPost {
            id: Uuid::new_v4(),
            thread_id,
            author_id,
            content,
            created_at,
        };

        record.posts.push(post);
        record.thread.reply_count += 1;
        if created_at >= record.thread.last_activity_at {
            record.thread.last_activity_at = created_at;
        }
        self.total_posts.fetch_add(1, Ordering::Relaxed);

        let counters = ThreadCounters {
            thread_id,
            reply_count: record.thread.reply_count,
            last_activity_at: record.thread.last_activity_at,
        };

        debug!(
            thread_id = %thread_id,
            author_id = %author_id,
            reply_count = counters.reply_count,
            "Post recorded"
        );
        Ok(counters)
    }

    /// Read-only snapshot of a thread with its current counters
    pub fn describe(&self, thread_id: Uuid) -> ServiceResult<ForumThread> {
        self.threads
            .get(&thread_id)
            .map(|record| record.thread.clone())
            .ok_or_else(|| ServiceError::NotFound(format!("thread {}", thread_id)))
    }

    /// A thread's posts, oldest first
    pub fn posts(&self, thread_id: Uuid) -> ServiceResult<Vec<ForumPost>> {
        let record = self
            .threads
            .get(&thread_id)
            .ok_or_else(|| ServiceError::NotFound(format!("thread {}", thread_id)))?;

        let mut posts = record.posts.clone();
        posts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(posts)
    }

    /// Threads for the forum index: pinned first, then most recent activity
    pub fn list_threads(&self, category_id: Option<i32>) -> Vec<ForumThread> {
        let mut threads: Vec<ForumThread> = self
            .threads
            .iter()
            .map(|record| record.thread.clone())
            .filter(|thread| category_id.map_or(true, |c| thread.category_id == c))
            .collect();

        threads.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then_with(|| b.last_activity_at.cmp(&a.last_activity_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        threads
    }

    pub fn thread_count(&self) -> u64 {
        self.threads.len() as u64
    }

    /// Posts recorded across all threads
    pub fn total_post_count(&self) -> u64 {
        self.total_posts.load(Ordering::Relaxed)
    }
}

impl Default for ThreadActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn thread(id: u128, category_id: i32) -> ForumThread {
        let created_at = Utc.timestamp_opt(1_000, 0).unwrap();
        ForumThread {
            id: Uuid::from_u128(id),
            category_id,
            title: format!("Thread {}", id),
            author_id: Uuid::from_u128(500 + id),
            is_pinned: false,
            is_locked: false,
            reply_count: 0,
            last_activity_at: created_at,
            created_at,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_record_post_increments_and_advances_activity() {
        let tracker = ThreadActivityTracker::new();
        let id = Uuid::from_u128(1);
        tracker.create_thread(thread(1, 1)).unwrap();

        let counters = tracker
            .record_post(id, Uuid::from_u128(9), "First reply".into(), at(100))
            .unwrap();

        assert_eq!(counters.reply_count, 1);
        assert_eq!(counters.last_activity_at, at(100));
    }

    #[test]
    fn test_out_of_order_post_keeps_activity_monotonic() {
        let tracker = ThreadActivityTracker::new();
        let id = Uuid::from_u128(1);
        tracker.create_thread(thread(1, 1)).unwrap();

        tracker
            .record_post(id, Uuid::from_u128(9), "On time".into(), at(100))
            .unwrap();
        let counters = tracker
            .record_post(id, Uuid::from_u128(9), "Delayed".into(), at(50))
            .unwrap();

        // The count still moves; the timestamp does not move backwards.
        assert_eq!(counters.reply_count, 2);
        assert_eq!(counters.last_activity_at, at(100));
    }

    #[test]
    fn test_locked_thread_rejects_posts_unchanged() {
        let tracker = ThreadActivityTracker::new();
        let id = Uuid::from_u128(1);
        tracker.create_thread(thread(1, 1)).unwrap();
        tracker.set_locked(id, true).unwrap();

        let result = tracker.record_post(id, Uuid::from_u128(9), "Nope".into(), at(100));
        assert!(matches!(result, Err(ServiceError::ThreadLocked(_))));

        let snapshot = tracker.describe(id).unwrap();
        assert_eq!(snapshot.reply_count, 0);
        assert_eq!(snapshot.last_activity_at, snapshot.created_at);
        assert!(tracker.posts(id).unwrap().is_empty());
        assert_eq!(tracker.total_post_count(), 0);
    }

    #[test]
    fn test_unlock_reopens_thread() {
        let tracker = ThreadActivityTracker::new();
        let id = Uuid::from_u128(1);
        tracker.create_thread(thread(1, 1)).unwrap();
        tracker.set_locked(id, true).unwrap();
        tracker.set_locked(id, false).unwrap();

        assert!(tracker
            .record_post(id, Uuid::from_u128(9), "Back open".into(), at(100))
            .is_ok());
    }

    #[test]
    fn test_unknown_thread_is_not_found() {
        let tracker = ThreadActivityTracker::new();
        let missing = Uuid::from_u128(42);

        assert!(matches!(
            tracker.record_post(missing, Uuid::from_u128(9), "Hi".into(), at(1)),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            tracker.describe(missing),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_posts_listed_oldest_first() {
        let tracker = ThreadActivityTracker::new();
        let id = Uuid::from_u128(1);
        tracker.create_thread(thread(1, 1)).unwrap();

        tracker
            .record_post(id, Uuid::from_u128(9), "Second".into(), at(200))
            .unwrap();
        tracker
            .record_post(id, Uuid::from_u128(9), "First".into(), at(100))
            .unwrap();

        let posts = tracker.posts(id).unwrap();
        assert_eq!(posts[0].content, "First");
        assert_eq!(posts[1].content, "Second");
    }

    #[test]
    fn test_list_threads_pinned_first_then_activity() {
        let tracker = ThreadActivityTracker::new();
        tracker.create_thread(thread(1, 1)).unwrap();
        tracker.create_thread(thread(2, 1)).unwrap();
        tracker.create_thread(thread(3, 2)).unwrap();

        tracker
            .record_post(
                Uuid::from_u128(1),
                Uuid::from_u128(9),
                "Busy thread".into(),
                at(5_000),
            )
            .unwrap();
        tracker.set_pinned(Uuid::from_u128(2), true).unwrap();

        let all = tracker.list_threads(None);
        assert_eq!(all[0].id, Uuid::from_u128(2), "pinned leads regardless of activity");
        assert_eq!(all[1].id, Uuid::from_u128(1));

        let category = tracker.list_threads(Some(2));
        assert_eq!(category.len(), 1);
        assert_eq!(category[0].id, Uuid::from_u128(3));
    }
}
