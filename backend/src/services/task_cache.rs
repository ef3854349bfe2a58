//! Preload task tracking.
//!
//! An in-memory store of preload task statuses keyed by product, with an
//! absolute lifetime and a sliding idle timeout per entry. Expired entries are
//! dropped lazily on access and by [`DataPreloadTaskCache::purge_expired`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PreloadSettings;

/// Lifecycle of the preload for one cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Progress of one preload run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPreloadTaskStatus {
    pub task_id: Uuid,
    pub total_count: usize,
    /// Units attempted so far, failed or not.
    pub completed_count: usize,
    /// `"<subset>/<report>: <error>"` per failed unit.
    pub errors: Vec<String>,
    pub is_cancelled: bool,
    pub started_at: DateTime<Utc>,
}

impl DataPreloadTaskStatus {
    pub fn new(total_count: usize) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            total_count,
            completed_count: 0,
            errors: Vec::new(),
            is_cancelled: false,
            started_at: Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count >= self.total_count
    }

    pub fn state(&self) -> PreloadState {
        if self.is_cancelled {
            PreloadState::Cancelled
        } else if self.is_complete() {
            PreloadState::Completed
        } else {
            PreloadState::Running
        }
    }

    /// Running and not cancelled.
    pub fn is_live(&self) -> bool {
        self.state() == PreloadState::Running
    }
}

struct CacheEntry {
    status: DataPreloadTaskStatus,
    cancel: CancellationToken,
    created: Instant,
    last_access: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant, absolute: Duration, sliding: Duration) -> bool {
        now.duration_since(self.created) >= absolute
            || now.duration_since(self.last_access) >= sliding
    }
}

/// Keyed store of preload task statuses.
#[derive(Clone)]
pub struct DataPreloadTaskCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    absolute_expiration: Duration,
    sliding_expiration: Duration,
}

impl DataPreloadTaskCache {
    pub fn new(absolute_expiration: Duration, sliding_expiration: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            absolute_expiration,
            sliding_expiration,
        }
    }

    pub fn from_settings(settings: &PreloadSettings) -> Self {
        Self::new(settings.absolute_expiration(), settings.sliding_expiration())
    }

    /// Current status for `key`, refreshing its sliding expiry.
    pub fn get(&self, key: &str) -> Option<DataPreloadTaskStatus> {
        let mut entries = self.entries.lock();
        let entry = self.live_entry(&mut entries, key)?;
        entry.last_access = Instant::now();
        Some(entry.status.clone())
    }

    /// Store `status` under `key` unless a live task is already stored there.
    ///
    /// # Returns
    /// `(status, true)` when `status` was stored, or the existing live
    /// task's status and `false`.
    pub fn start_if_idle(
        &self,
        key: &str,
        status: DataPreloadTaskStatus,
        cancel: CancellationToken,
    ) -> (DataPreloadTaskStatus, bool) {
        let mut entries = self.entries.lock();
        if let Some(entry) = self.live_entry(&mut entries, key) {
            if entry.status.is_live() {
                entry.last_access = Instant::now();
                return (entry.status.clone(), false);
            }
        }
        let now = Instant::now();
        entries.insert(
            key.to_string(),
            CacheEntry {
                status: status.clone(),
                cancel,
                created: now,
                last_access: now,
            },
        );
        (status, true)
    }

    /// Apply `update` to the status of `task_id`, if it is still the task
    /// stored under `key`.
    pub fn update<F>(&self, key: &str, task_id: Uuid, update: F) -> bool
    where
        F: FnOnce(&mut DataPreloadTaskStatus),
    {
        let mut entries = self.entries.lock();
        match self.live_entry(&mut entries, key) {
            Some(entry) if entry.status.task_id == task_id => {
                update(&mut entry.status);
                entry.last_access = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Cancel the task under `key` and mark it cancelled.
    pub fn cancel(&self, key: &str) -> Option<DataPreloadTaskStatus> {
        let mut entries = self.entries.lock();
        let entry = self.live_entry(&mut entries, key)?;
        entry.cancel.cancel();
        entry.status.is_cancelled = true;
        entry.last_access = Instant::now();
        Some(entry.status.clone())
    }

    pub fn remove(&self, key: &str) -> Option<DataPreloadTaskStatus> {
        self.entries.lock().remove(key).map(|entry| entry.status)
    }

    /// Drop every expired entry; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| {
            !entry.is_expired(now, self.absolute_expiration, self.sliding_expiration)
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_entry<'a>(
        &self,
        entries: &'a mut HashMap<String, CacheEntry>,
        key: &str,
    ) -> Option<&'a mut CacheEntry> {
        let now = Instant::now();
        let expired = entries
            .get(key)
            .map(|entry| entry.is_expired(now, self.absolute_expiration, self.sliding_expiration))?;
        if expired {
            log::debug!("Preload task '{}' expired", key);
            entries.remove(key);
            return None;
        }
        let entry = entries.get_mut(key)?;
        // The token may have been cancelled through a parent.
        if entry.cancel.is_cancelled() && !entry.status.is_complete() {
            entry.status.is_cancelled = true;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "brandvue/default";

    fn cache() -> DataPreloadTaskCache {
        DataPreloadTaskCache::new(Duration::from_secs(7200), Duration::from_secs(600))
    }

    #[test]
    fn test_parent_cancellation_marks_task_cancelled() {
        let cache = cache();
        let parent = CancellationToken::new();
        let (status, _) =
            cache.start_if_idle(KEY, DataPreloadTaskStatus::new(3), parent.child_token());

        parent.cancel();

        let current = cache.get(KEY).unwrap();
        assert!(current.is_cancelled);
        assert_eq!(current.state(), PreloadState::Cancelled);
        let (restarted, started) =
            cache.start_if_idle(KEY, DataPreloadTaskStatus::new(3), CancellationToken::new());
        assert!(started);
        assert_ne!(restarted.task_id, status.task_id);
    }

    #[test]
    fn test_cancelling_after_completion_keeps_completed() {
        let cache = cache();
        let token = CancellationToken::new();
        let (status, _) = cache.start_if_idle(KEY, DataPreloadTaskStatus::new(1), token.clone());
        cache.update(KEY, status.task_id, |s| s.completed_count = 1);

        token.cancel();

        assert_eq!(cache.get(KEY).unwrap().state(), PreloadState::Completed);
    }

    #[test]
    fn test_status_state_transitions() {
        let mut status = DataPreloadTaskStatus::new(2);
        assert_eq!(status.state(), PreloadState::Running);
        status.completed_count = 2;
        assert_eq!(status.state(), PreloadState::Completed);
        status.is_cancelled = true;
        assert_eq!(status.state(), PreloadState::Cancelled);
    }

    #[test]
    fn test_empty_task_is_complete() {
        assert!(DataPreloadTaskStatus::new(0).is_complete());
    }

    #[tokio::test]
    async fn test_start_if_idle_keeps_live_task() {
        let cache = cache();
        let first = DataPreloadTaskStatus::new(3);
        let (stored, started) = cache.start_if_idle(KEY, first.clone(), CancellationToken::new());
        assert!(started);
        assert_eq!(stored.task_id, first.task_id);

        let (existing, started) =
            cache.start_if_idle(KEY, DataPreloadTaskStatus::new(5), CancellationToken::new());
        assert!(!started);
        assert_eq!(existing.task_id, first.task_id);
    }

    #[tokio::test]
    async fn test_update_ignores_stale_task() {
        let cache = cache();
        let status = DataPreloadTaskStatus::new(3);
        cache.start_if_idle(KEY, status.clone(), CancellationToken::new());

        assert!(cache.update(KEY, status.task_id, |s| s.completed_count += 1));
        assert!(!cache.update(KEY, Uuid::new_v4(), |s| s.completed_count += 1));
        assert_eq!(cache.get(KEY).unwrap().completed_count, 1);
    }

    #[tokio::test]
    async fn test_cancel_fires_token() {
        let cache = cache();
        let token = CancellationToken::new();
        cache.start_if_idle(KEY, DataPreloadTaskStatus::new(1), token.clone());

        let status = cache.cancel(KEY).unwrap();
        assert!(status.is_cancelled);
        assert!(token.is_cancelled());
        assert!(cache.cancel("other").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_expiry_is_refreshed_by_reads() {
        let cache = cache();
        cache.start_if_idle(KEY, DataPreloadTaskStatus::new(1), CancellationToken::new());

        tokio::time::advance(Duration::from_secs(500)).await;
        assert!(cache.get(KEY).is_some());
        tokio::time::advance(Duration::from_secs(500)).await;
        assert!(cache.get(KEY).is_some());
        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(cache.get(KEY).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_absolute_expiry_and_purge() {
        let cache = DataPreloadTaskCache::new(Duration::from_secs(60), Duration::from_secs(600));
        cache.start_if_idle(KEY, DataPreloadTaskStatus::new(1), CancellationToken::new());
        cache.start_if_idle("other", DataPreloadTaskStatus::new(1), CancellationToken::new());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }
}
