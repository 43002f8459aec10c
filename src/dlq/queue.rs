//! Dead letter queue.
//!
//! # Responsibilities
//! - Archive failed requests and track their re-attempt budget
//! - Gate re-attempts with exponential backoff measured from `created_at`
//! - Keep the active set within `max_queue_size`
//! - Persist every mutation to the backing file
//!
//! # Design Decisions
//! - The state mutex is held only to mutate and snapshot; the file write happens
//!   after it is released, on the blocking pool when a runtime is present
//! - Every snapshot carries a generation; a separate write lock serializes writers
//!   and drops any snapshot older than the one already on disk
//! - In-memory state is authoritative; a failed write is logged, not fatal
//! - A non-retryable reason is sticky: refreshing an entry never makes it retryable
//! - An unreadable file is moved aside to `<name>.corrupt` before starting empty
//! - Full queue: purge exhausted/permanent entries past the grace period,
//!   then evict oldest-first regardless of retryability

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::DeadLetterConfig;
use crate::dlq::persistence::{load_snapshot, write_snapshot, DeadLetterError, Snapshot};
use crate::dlq::types::{now_secs, FailedRequest, Filter, Statistics};
use crate::observability::metrics;

#[derive(Debug, Default)]
struct QueueState {
    active: HashMap<String, FailedRequest>,
    resolved: HashMap<String, FailedRequest>,
    generation: u64,
}

impl QueueState {
    fn snapshot(&self) -> Snapshot {
        let mut failed_requests: Vec<_> = self.active.values().cloned().collect();
        failed_requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let mut resolved_requests: Vec<_> = self.resolved.values().cloned().collect();
        resolved_requests.sort_by(|a, b| a.resolved_at.cmp(&b.resolved_at).then_with(|| a.id.cmp(&b.id)));

        Snapshot {
            failed_requests,
            resolved_requests,
            last_updated: now_secs(),
        }
    }
}

/// A snapshot taken under the state lock, written after the lock is released.
struct PendingWrite {
    path: PathBuf,
    generation: u64,
    snapshot: Snapshot,
    written: Arc<Mutex<u64>>,
}

impl PendingWrite {
    fn write(self) -> Result<(), DeadLetterError> {
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if *written >= self.generation {
            return Ok(());
        }
        write_snapshot(&self.path, &self.snapshot)?;
        *written = self.generation;
        Ok(())
    }

    fn write_logged(self) {
        if let Err(e) = self.write() {
            tracing::error!(error = %e, "Failed to persist dead letter queue");
        }
    }
}

/// Move an unreadable file out of the way so the next write cannot clobber it.
fn quarantine(path: &Path) {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".corrupt");
    let target = path.with_file_name(name);
    match std::fs::rename(path, &target) {
        Ok(()) => tracing::warn!(from = %path.display(), to = %target.display(), "Moved unreadable dead letter file aside"),
        Err(e) => tracing::error!(path = %path.display(), error = %e, "Could not move unreadable dead letter file aside"),
    }
}

/// Durable store of requests that exhausted their retries.
#[derive(Debug)]
pub struct DeadLetterQueue {
    config: DeadLetterConfig,
    inner: Mutex<QueueState>,
    written: Arc<Mutex<u64>>,
}

impl DeadLetterQueue {
    /// Open the queue, loading `config.path` if it exists.
    ///
    /// A missing or unreadable file yields an empty queue. An unparseable file is
    /// renamed to `<name>.corrupt` first.
    pub fn open(config: DeadLetterConfig) -> Self {
        let mut state = QueueState::default();

        if let Some(path) = &config.path {
            match load_snapshot(path) {
                Ok(Some(snapshot)) => {
                    state.active = snapshot
                        .failed_requests
                        .into_iter()
                        .map(|r| (r.id.clone(), r))
                        .collect();
                    state.resolved = snapshot
                        .resolved_requests
                        .into_iter()
                        .map(|r| (r.id.clone(), r))
                        .collect();
                    tracing::info!(
                        path = %path.display(),
                        active = state.active.len(),
                        resolved = state.resolved.len(),
                        "Loaded dead letter queue"
                    );
                }
                Ok(None) => {
                    tracing::debug!(path = %path.display(), "No dead letter file yet, starting empty");
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Dead letter file unreadable, starting empty");
                    if matches!(e, DeadLetterError::Format(_)) {
                        quarantine(path);
                    }
                }
            }
        }

        metrics::record_dlq_size(state.active.len(), state.resolved.len());
        Self {
            config,
            inner: Mutex::new(state),
            written: Arc::new(Mutex::new(0)),
        }
    }

    /// An in-memory queue with default settings.
    pub fn in_memory() -> Self {
        Self::open(DeadLetterConfig::default())
    }

    pub fn config(&self) -> &DeadLetterConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bump the generation and snapshot the state for writing. Call with the lock held.
    fn stage(&self, state: &mut QueueState) -> Option<PendingWrite> {
        metrics::record_dlq_size(state.active.len(), state.resolved.len());
        let path = self.config.path.clone()?;
        state.generation += 1;
        Some(PendingWrite {
            path,
            generation: state.generation,
            snapshot: state.snapshot(),
            written: Arc::clone(&self.written),
        })
    }

    /// Write a staged snapshot. Call after releasing the state lock.
    fn dispatch(&self, pending: Option<PendingWrite>) {
        let Some(pending) = pending else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || pending.write_logged());
            }
            Err(_) => pending.write_logged(),
        }
    }

    /// Write the current state to the backing file on the calling thread.
    pub fn persist(&self) -> Result<(), DeadLetterError> {
        let pending = self.stage(&mut self.lock());
        match pending {
            Some(pending) => pending.write(),
            None => Ok(()),
        }
    }

    /// Write the current state on the blocking pool and wait for it to land.
    pub async fn flush(&self) -> Result<(), DeadLetterError> {
        let Some(pending) = self.stage(&mut self.lock()) else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || pending.write())
            .await
            .map_err(|e| DeadLetterError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    /// Archive a failed request and return its id.
    ///
    /// If an active entry already exists for the same `resource_key`, that entry is
    /// refreshed with the new failure and its id is returned instead.
    pub fn add(&self, mut request: FailedRequest) -> String {
        request.retry_count = request.retry_count.min(request.max_retries);
        request.resolved_at = None;

        let mut state = self.lock();

        let existing = state
            .active
            .values_mut()
            .find(|r| r.resource_key == request.resource_key);
        if let Some(entry) = existing {
            if entry.failure_reason.is_retryable() {
                entry.failure_reason = request.failure_reason;
            }
            entry.error_message = request.error_message;
            entry.context.extend(request.context);
            if request.payload.is_some() {
                entry.payload = request.payload;
            }
            let id = entry.id.clone();
            tracing::debug!(id = %id, resource_key = %entry.resource_key, "Refreshed existing dead letter entry");
            let pending = self.stage(&mut state);
            drop(state);
            self.dispatch(pending);
            return id;
        }

        self.make_room(&mut state, now_secs());

        let id = request.id.clone();
        tracing::warn!(
            id = %id,
            resource_key = %request.resource_key,
            reason = %request.failure_reason,
            error = %request.error_message,
            "Request dead-lettered"
        );
        state.active.insert(id.clone(), request);
        let pending = self.stage(&mut state);
        drop(state);
        self.dispatch(pending);
        id
    }

    /// Evict until one more entry fits under `max_queue_size`.
    fn make_room(&self, state: &mut QueueState, now: u64) {
        let max = self.config.max_queue_size.max(1);
        if state.active.len() < max {
            return;
        }

        let grace = self.config.eviction_grace_secs;
        let before = state.active.len();
        state.active.retain(|_, r| {
            let spent = r.is_exhausted() || !r.failure_reason.is_retryable();
            !(spent && now.saturating_sub(r.created_at) >= grace)
        });
        let purged = before - state.active.len();

        let mut evicted = 0;
        if state.active.len() >= max {
            let mut by_age: Vec<(u64, String)> = state
                .active
                .values()
                .map(|r| (r.created_at, r.id.clone()))
                .collect();
            by_age.sort();
            let excess = state.active.len() + 1 - max;
            for (_, id) in by_age.into_iter().take(excess) {
                state.active.remove(&id);
                evicted += 1;
            }
        }

        tracing::warn!(purged, evicted, max_queue_size = max, "Dead letter queue full, made room");
        metrics::record_dlq_eviction(purged + evicted);
    }

    /// Look up a request in the active or resolved set.
    pub fn get(&self, id: &str) -> Option<FailedRequest> {
        let state = self.lock();
        state
            .active
            .get(id)
            .or_else(|| state.resolved.get(id))
            .cloned()
    }

    /// Active requests eligible for a re-attempt now, oldest first.
    pub fn get_retryable(&self) -> Vec<FailedRequest> {
        self.get_retryable_at(now_secs())
    }

    /// Active requests eligible for a re-attempt at `now`, oldest first.
    pub fn get_retryable_at(&self, now: u64) -> Vec<FailedRequest> {
        let state = self.lock();
        let mut ready: Vec<_> = state
            .active
            .values()
            .filter(|r| self.is_retryable_at(r, now))
            .cloned()
            .collect();
        ready.sort_by_key(|r| r.created_at);
        ready
    }

    fn is_retryable_at(&self, request: &FailedRequest, now: u64) -> bool {
        request.is_retryable_at(now, self.config.base_backoff_secs, self.config.backoff_multiplier)
    }

    /// Record a failed re-attempt: bump `retry_count` (never past `max_retries`)
    /// and restart the backoff clock.
    pub fn increment_retry(&self, id: &str) -> Result<FailedRequest, DeadLetterError> {
        let mut state = self.lock();
        let entry = state
            .active
            .get_mut(id)
            .ok_or_else(|| DeadLetterError::NotFound(id.to_string()))?;

        entry.retry_count = (entry.retry_count + 1).min(entry.max_retries);
        entry.created_at = now_secs();
        let updated = entry.clone();

        if updated.is_exhausted() {
            tracing::warn!(id = %id, retries = updated.retry_count, "Dead letter entry exhausted its re-attempts");
        }
        let pending = self.stage(&mut state);
        drop(state);
        self.dispatch(pending);
        Ok(updated)
    }

    /// Refresh the failure details of an active entry after a failed re-attempt.
    pub fn update_failure(
        &self,
        id: &str,
        reason: crate::failure::FailureReason,
        message: &str,
    ) -> Result<(), DeadLetterError> {
        let mut state = self.lock();
        let entry = state
            .active
            .get_mut(id)
            .ok_or_else(|| DeadLetterError::NotFound(id.to_string()))?;
        entry.failure_reason = reason;
        entry.error_message = message.to_string();
        let pending = self.stage(&mut state);
        drop(state);
        self.dispatch(pending);
        Ok(())
    }

    /// Move a request to the resolved set.
    pub fn mark_resolved(&self, id: &str) -> Result<(), DeadLetterError> {
        let mut state = self.lock();
        let mut entry = state
            .active
            .remove(id)
            .ok_or_else(|| DeadLetterError::NotFound(id.to_string()))?;

        entry.resolved_at = Some(now_secs());
        tracing::info!(id = %id, resource_key = %entry.resource_key, "Dead letter entry resolved");
        state.resolved.insert(entry.id.clone(), entry);
        let pending = self.stage(&mut state);
        drop(state);
        self.dispatch(pending);
        Ok(())
    }

    /// Delete a request from either set.
    pub fn remove(&self, id: &str) -> Option<FailedRequest> {
        let mut state = self.lock();
        let removed = state.active.remove(id).or_else(|| state.resolved.remove(id));
        if removed.is_some() {
            let pending = self.stage(&mut state);
            drop(state);
            self.dispatch(pending);
        }
        removed
    }

    /// Active requests matching `filter`, oldest first.
    pub fn list(&self, filter: &Filter) -> Vec<FailedRequest> {
        let now = now_secs();
        let state = self.lock();
        let mut matches: Vec<_> = state
            .active
            .values()
            .filter(|r| filter.reason.map_or(true, |reason| r.failure_reason == reason))
            .filter(|r| !filter.retryable_only || self.is_retryable_at(r, now))
            .filter(|r| {
                filter
                    .resource_key_contains
                    .as_deref()
                    .map_or(true, |needle| r.resource_key.contains(needle))
            })
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.created_at);
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        matches
    }

    /// Resolved requests, most recently resolved first.
    pub fn list_resolved(&self) -> Vec<FailedRequest> {
        let state = self.lock();
        let mut resolved: Vec<_> = state.resolved.values().cloned().collect();
        resolved.sort_by(|a, b| b.resolved_at.cmp(&a.resolved_at));
        resolved
    }

    pub fn stats(&self) -> Statistics {
        let now = now_secs();
        let state = self.lock();

        let mut stats = Statistics {
            active: state.active.len(),
            resolved: state.resolved.len(),
            max_queue_size: self.config.max_queue_size,
            ..Statistics::default()
        };
        for r in state.active.values() {
            *stats.by_reason.entry(r.failure_reason).or_insert(0) += 1;
            if !r.failure_reason.is_retryable() {
                stats.permanent += 1;
            } else if r.is_exhausted() {
                stats.exhausted += 1;
            } else if self.is_retryable_at(r, now) {
                stats.retryable += 1;
            }
            stats.oldest_created_at = Some(
                stats
                    .oldest_created_at
                    .map_or(r.created_at, |oldest| oldest.min(r.created_at)),
            );
        }
        stats
    }

    /// Purge resolved entries older than the retention window. Returns how many went.
    pub fn purge_resolved(&self) -> usize {
        self.purge_resolved_at(now_secs())
    }

    pub fn purge_resolved_at(&self, now: u64) -> usize {
        let retention = self.config.retention().as_secs();
        let mut state = self.lock();
        let before = state.resolved.len();
        state.resolved.retain(|_, r| {
            let resolved_at = r.resolved_at.unwrap_or(r.created_at);
            now.saturating_sub(resolved_at) < retention
        });
        let purged = before - state.resolved.len();

        if purged > 0 {
            tracing::info!(purged, "Purged resolved dead letter entries past retention");
            let pending = self.stage(&mut state);
            drop(state);
            self.dispatch(pending);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureReason;

    fn config(max_queue_size: usize) -> DeadLetterConfig {
        DeadLetterConfig {
            max_queue_size,
            max_retries: 3,
            ..DeadLetterConfig::default()
        }
    }

    fn failed(key: &str, reason: FailureReason, created_at: u64) -> FailedRequest {
        FailedRequest {
            created_at,
            ..FailedRequest::new(key, reason, "boom", 3)
        }
    }

    #[test]
    fn test_add_and_get() {
        let dlq = DeadLetterQueue::open(config(10));
        let id = dlq.add(FailedRequest::new("a", FailureReason::Timeout, "slow", 3));

        let got = dlq.get(&id).unwrap();
        assert_eq!(got.resource_key, "a");
        assert_eq!(got.retry_count, 0);
        assert_eq!(dlq.len(), 1);
    }

    #[test]
    fn test_same_resource_key_deduplicates() {
        let dlq = DeadLetterQueue::open(config(10));
        let first = dlq.add(FailedRequest::new("a", FailureReason::Timeout, "slow", 3));
        let second = dlq.add(
            FailedRequest::new("a", FailureReason::NetworkError, "refused", 3).with_context("attempt", "2"),
        );

        assert_eq!(first, second);
        assert_eq!(dlq.len(), 1);
        let entry = dlq.get(&first).unwrap();
        assert_eq!(entry.failure_reason, FailureReason::NetworkError);
        assert_eq!(entry.context["attempt"], "2");
    }

    #[test]
    fn test_dedup_keeps_non_retryable_reason() {
        let dlq = DeadLetterQueue::open(config(10));
        let id = dlq.add(failed("https://example.com/p", FailureReason::AuthenticationError, 0));
        let again = dlq.add(
            FailedRequest::new("https://example.com/p", FailureReason::NetworkError, "reset", 3)
                .with_context("attempt", "2"),
        );

        assert_eq!(id, again);
        let entry = dlq.get(&id).unwrap();
        assert_eq!(entry.failure_reason, FailureReason::AuthenticationError);
        assert_eq!(entry.error_message, "reset");
        assert_eq!(entry.context["attempt"], "2");
        assert!(dlq.get_retryable_at(1_000_000).is_empty());
    }

    #[test]
    fn test_retryable_respects_backoff_boundary() {
        let dlq = DeadLetterQueue::open(config(10));
        dlq.add(failed("a", FailureReason::NetworkError, 1_000));

        assert!(dlq.get_retryable_at(1_059).is_empty());
        assert_eq!(dlq.get_retryable_at(1_060).len(), 1);
    }

    #[test]
    fn test_permanent_never_retryable() {
        let dlq = DeadLetterQueue::open(config(10));
        dlq.add(failed("a", FailureReason::AuthenticationError, 0));
        dlq.add(failed("b", FailureReason::PermanentFailure, 0));
        dlq.add(failed("c", FailureReason::InvalidResponse, 0));

        assert!(dlq.get_retryable_at(u64::MAX / 2).is_empty());
        assert_eq!(dlq.stats().permanent, 3);
    }

    #[test]
    fn test_increment_retry_caps_and_restarts_clock() {
        let dlq = DeadLetterQueue::open(config(10));
        let id = dlq.add(failed("a", FailureReason::Timeout, 0));

        for _ in 0..10 {
            dlq.increment_retry(&id).unwrap();
        }
        let entry = dlq.get(&id).unwrap();
        assert_eq!(entry.retry_count, 3);
        assert!(entry.created_at > 0);
        assert!(dlq.get_retryable_at(u64::MAX / 2).is_empty());
        assert_eq!(dlq.stats().exhausted, 1);
    }

    #[test]
    fn test_increment_unknown_id() {
        let dlq = DeadLetterQueue::in_memory();
        assert!(matches!(dlq.increment_retry("nope"), Err(DeadLetterError::NotFound(_))));
    }

    #[test]
    fn test_mark_resolved_and_purge() {
        let dlq = DeadLetterQueue::open(config(10));
        let id = dlq.add(failed("a", FailureReason::Timeout, 0));
        dlq.mark_resolved(&id).unwrap();

        assert!(dlq.is_empty());
        let resolved = dlq.get(&id).unwrap();
        let resolved_at = resolved.resolved_at.unwrap();

        let retention = dlq.config().retention().as_secs();
        assert_eq!(dlq.purge_resolved_at(resolved_at + retention - 1), 0);
        assert_eq!(dlq.purge_resolved_at(resolved_at + retention), 1);
        assert!(dlq.get(&id).is_none());
    }

    #[test]
    fn test_remove() {
        let dlq = DeadLetterQueue::in_memory();
        let id = dlq.add(failed("a", FailureReason::Timeout, 0));
        assert!(dlq.remove(&id).is_some());
        assert!(dlq.remove(&id).is_none());
    }

    #[test]
    fn test_full_queue_purges_spent_entries_first() {
        let dlq = DeadLetterQueue::open(config(3));
        let spent = dlq.add(failed("spent", FailureReason::PermanentFailure, 0));
        let old = dlq.add(failed("old", FailureReason::Timeout, 10));
        let newer = dlq.add(failed("newer", FailureReason::Timeout, 20));

        let fresh = dlq.add(FailedRequest::new("fresh", FailureReason::Timeout, "x", 3));

        assert!(dlq.get(&spent).is_none());
        assert!(dlq.get(&old).is_some());
        assert!(dlq.get(&newer).is_some());
        assert!(dlq.get(&fresh).is_some());
    }

    #[test]
    fn test_full_queue_evicts_oldest() {
        let dlq = DeadLetterQueue::open(config(2));
        let old = dlq.add(failed("old", FailureReason::Timeout, 10));
        let newer = dlq.add(failed("newer", FailureReason::Timeout, 20));

        let fresh = dlq.add(FailedRequest::new("fresh", FailureReason::Timeout, "x", 3));

        assert_eq!(dlq.len(), 2);
        assert!(dlq.get(&old).is_none());
        assert!(dlq.get(&newer).is_some());
        assert!(dlq.get(&fresh).is_some());
    }

    #[test]
    fn test_list_filter() {
        let dlq = DeadLetterQueue::open(config(10));
        dlq.add(failed("https://a.example/1", FailureReason::Timeout, 0));
        dlq.add(failed("https://b.example/2", FailureReason::RateLimited, 5));
        dlq.add(failed("https://a.example/3", FailureReason::PermanentFailure, 10));

        let by_reason = dlq.list(&Filter {
            reason: Some(FailureReason::RateLimited),
            ..Filter::default()
        });
        assert_eq!(by_reason.len(), 1);

        let by_key = dlq.list(&Filter {
            resource_key_contains: Some("a.example".into()),
            ..Filter::default()
        });
        assert_eq!(by_key.len(), 2);
        assert_eq!(by_key[0].resource_key, "https://a.example/1");

        let retryable = dlq.list(&Filter {
            retryable_only: true,
            ..Filter::default()
        });
        assert_eq!(retryable.len(), 2);

        let limited = dlq.list(&Filter {
            limit: Some(1),
            ..Filter::default()
        });
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = DeadLetterConfig {
            path: Some(dir.path().join("dlq.json")),
            ..config(10)
        };

        let dlq = DeadLetterQueue::open(config.clone());
        let a = dlq.add(
            failed("a", FailureReason::Timeout, 100)
                .with_payload(serde_json::json!({"url": "https://a.example"}))
                .with_context("operation", "fetch_page"),
        );
        let b = dlq.add(failed("b", FailureReason::PermanentFailure, 200));
        dlq.mark_resolved(&b).unwrap();

        let reloaded = DeadLetterQueue::open(config);
        assert_eq!(reloaded.get(&a), dlq.get(&a));
        assert_eq!(reloaded.get(&b), dlq.get(&b));
        assert_eq!(reloaded.stats(), dlq.stats());
    }

    #[test]
    fn test_corrupt_file_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.json");
        std::fs::write(&path, "garbage").unwrap();

        let dlq = DeadLetterQueue::open(DeadLetterConfig {
            path: Some(path.clone()),
            ..config(10)
        });
        assert!(dlq.is_empty());
        dlq.add(failed("a", FailureReason::Timeout, 0));

        let kept = dir.path().join("dlq.json.corrupt");
        assert_eq!(std::fs::read_to_string(kept).unwrap(), "garbage");
        assert_eq!(load_snapshot(&path).unwrap().unwrap().failed_requests.len(), 1);
    }

    #[tokio::test]
    async fn test_async_writes_land_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let config = DeadLetterConfig {
            path: Some(dir.path().join("dlq.json")),
            ..config(10)
        };

        let dlq = DeadLetterQueue::open(config.clone());
        for i in 0..20 {
            dlq.add(failed(&format!("k{i}"), FailureReason::Timeout, i));
        }
        let last = dlq.add(failed("last", FailureReason::NetworkError, 99));
        dlq.flush().await.unwrap();

        let reloaded = DeadLetterQueue::open(config);
        assert_eq!(reloaded.len(), 21);
        assert_eq!(reloaded.get(&last), dlq.get(&last));
    }

    #[test]
    fn test_stale_snapshot_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlq.json");
        let written = Arc::new(Mutex::new(0));
        let pending = |generation: u64, keys: &[&str]| PendingWrite {
            path: path.clone(),
            generation,
            snapshot: Snapshot {
                failed_requests: keys
                    .iter()
                    .map(|k| failed(k, FailureReason::Timeout, 0))
                    .collect(),
                ..Snapshot::default()
            },
            written: Arc::clone(&written),
        };

        pending(2, &["a", "b"]).write().unwrap();
        pending(1, &["a"]).write().unwrap();

        assert_eq!(load_snapshot(&path).unwrap().unwrap().failed_requests.len(), 2);
        assert_eq!(*written.lock().unwrap(), 2);
    }
}
