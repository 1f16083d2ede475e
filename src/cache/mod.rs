//! Bounded, time-expiring store of terminal job results.
//!
//! Entries expire `ttl` after insertion. Expired entries are invisible to
//! readers immediately (checked on every read) and are physically removed
//! either on that read or by [`ResultCache::sweep_expired`]. When full, the
//! least recently touched entry is evicted; a live read counts as a touch.

pub mod entry;

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::error::{OrchestratorError, Result};
use crate::scheduler::JobId;

pub use entry::{CacheEntry, JobResult, Outcome};

pub struct ResultCache {
    entries: Mutex<LruCache<JobId, CacheEntry>>,
    capacity: NonZeroUsize,
    ttl: Duration,
    dedup_window: Option<Duration>,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.max_entries).ok_or_else(|| {
            OrchestratorError::Config("cache capacity must be at least 1".to_string())
        })?;

        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            ttl: config.ttl,
            dedup_window: config.dedup_window,
        })
    }

    /// Insert or overwrite the result for `job_id`, stamping a fresh expiry.
    pub async fn put(&self, job_id: JobId, result: JobResult) {
        let entry = CacheEntry::new(result, self.ttl);
        let mut entries = self.entries.lock().await;

        if let Some((evicted, _)) = entries.push(job_id.clone(), entry) {
            if evicted != job_id {
                tracing::debug!(job_id = %evicted, "Evicted least recently used result");
            }
        }
        tracing::debug!(job_id = %job_id, "Cached result");
    }

    /// Live entry for `job_id`, or `None` if absent or expired.
    pub async fn get(&self, job_id: &JobId) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let expired = entries.peek(job_id)?.is_expired_at(now);
        if expired {
            entries.pop(job_id);
            tracing::debug!(job_id = %job_id, "Result expired");
            return None;
        }

        entries.get(job_id).cloned()
    }

    /// Most recently cached live `completed` result for `request_key`.
    ///
    /// With a dedup window configured, only results cached within that window
    /// qualify even if older ones have not expired yet.
    pub async fn find_completed(&self, request_key: &str) -> Option<(JobId, CacheEntry)> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        // Oldest-touched first, so ties on `inserted_at` go to the most
        // recently touched entry.
        let job_id = entries
            .iter()
            .rev()
            .filter(|(_, entry)| {
                !entry.is_expired_at(now)
                    && entry.result.is_completed()
                    && entry.result.request_key == request_key
                    && self
                        .dedup_window
                        .map_or(true, |window| now.duration_since(entry.inserted_at) < window)
            })
            .max_by_key(|(_, entry)| entry.inserted_at)
            .map(|(id, _)| id.clone())?;

        let entry = entries.get(&job_id).cloned()?;
        Some((job_id, entry))
    }

    /// Remove every expired entry and return how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let expired: Vec<JobId> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            entries.pop(id);
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Cleaned up expired results");
        }
        expired.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(ttl_secs: u64, max_entries: usize) -> ResultCache {
        ResultCache::new(&CacheConfig {
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
            dedup_window: None,
        })
        .unwrap()
    }

    fn done(key: &str) -> JobResult {
        JobResult::completed(key, "android-1", json!({ "files": [format!("{key}.apk")] }))
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = ResultCache::new(&CacheConfig {
            max_entries: 0,
            ..CacheConfig::default()
        });
        assert!(matches!(result, Err(OrchestratorError::Config(_))));
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = cache(60, 10);
        let id = JobId::from("a.b.c_1");
        cache.put(id.clone(), done("a.b.c")).await;

        let entry = cache.get(&id).await.unwrap();
        assert_eq!(entry.result, done("a.b.c"));
        assert!(cache.get(&JobId::from("missing")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_unreadable_once_ttl_elapses() {
        let cache = cache(60, 10);
        let id = JobId::from("a.b.c_1");
        cache.put(id.clone(), done("a.b.c")).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get(&id).await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&id).await.is_none());
        // Lazy expiry removed it.
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_do_not_extend_ttl() {
        let cache = cache(10, 10);
        let id = JobId::from("a.b.c_1");
        cache.put(id.clone(), done("a.b.c")).await;

        for _ in 0..9 {
            tokio::time::advance(Duration::from_secs(1)).await;
            assert!(cache.get(&id).await.is_some());
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_touched() {
        let cache = cache(60, 2);
        let first = JobId::from("a_1");
        let second = JobId::from("b_1");
        let third = JobId::from("c_1");

        cache.put(first.clone(), done("a.a")).await;
        cache.put(second.clone(), done("b.b")).await;

        // Touch the older entry so the newer one becomes least recent.
        assert!(cache.get(&first).await.is_some());

        cache.put(third.clone(), done("c.c")).await;
        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&first).await.is_some());
        assert!(cache.get(&second).await.is_none());
        assert!(cache.get(&third).await.is_some());
    }

    #[tokio::test]
    async fn overwrite_does_not_grow_cache() {
        let cache = cache(60, 2);
        let id = JobId::from("a_1");
        cache.put(id.clone(), done("a.a")).await;
        cache
            .put(id.clone(), JobResult::failed("a.a", None, "boom"))
            .await;

        assert_eq!(cache.len().await, 1);
        let entry = cache.get(&id).await.unwrap();
        assert_eq!(entry.result.outcome, Outcome::Failed("boom".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let cache = cache(30, 10);
        cache.put(JobId::from("old_1"), done("o.o")).await;
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.put(JobId::from("new_1"), done("n.n")).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(cache.sweep_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&JobId::from("new_1")).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn find_completed_picks_most_recent_match() {
        let cache = cache(60, 10);
        cache.put(JobId::from("a.b.c_1"), done("a.b.c")).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.put(JobId::from("a.b.c_2"), done("a.b.c")).await;
        cache
            .put(
                JobId::from("a.b.c_3"),
                JobResult::failed("a.b.c", None, "boom"),
            )
            .await;

        let (id, entry) = cache.find_completed("a.b.c").await.unwrap();
        assert_eq!(id, JobId::from("a.b.c_2"));
        assert!(entry.result.is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn find_completed_tie_goes_to_most_recently_touched() {
        let cache = cache(60, 10);
        let first = JobId::from("a.b.c_1");
        let second = JobId::from("a.b.c_2");
        // Paused clock: both entries share one `inserted_at`.
        cache.put(first.clone(), done("a.b.c")).await;
        cache.put(second.clone(), done("a.b.c")).await;

        assert!(cache.get(&first).await.is_some());

        let (id, _) = cache.find_completed("a.b.c").await.unwrap();
        assert_eq!(id, first);
    }

    #[tokio::test]
    async fn find_completed_matches_exact_key_only() {
        let cache = cache(60, 10);
        cache.put(JobId::from("a.b_c_1"), done("a.b_c")).await;

        assert!(cache.find_completed("a.b").await.is_none());
        assert!(cache.find_completed("a.b_c").await.is_some());
    }

    #[tokio::test]
    async fn find_completed_ignores_failures() {
        let cache = cache(60, 10);
        cache
            .put(
                JobId::from("a.b.c_1"),
                JobResult::failed("a.b.c", Some("android-1".into()), "boom"),
            )
            .await;
        assert!(cache.find_completed("a.b.c").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn find_completed_respects_dedup_window() {
        let cache = ResultCache::new(&CacheConfig {
            ttl: Duration::from_secs(600),
            max_entries: 10,
            dedup_window: Some(Duration::from_secs(30)),
        })
        .unwrap();
        let id = JobId::from("a.b.c_1");
        cache.put(id.clone(), done("a.b.c")).await;

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.find_completed("a.b.c").await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.find_completed("a.b.c").await.is_none());
        // Still readable by job id until the TTL.
        assert!(cache.get(&id).await.is_some());
    }
}
