//! Timestamp log storage.
//!
//! A log is an ordered, per-key sequence of request timestamps. Backends
//! declare their scan direction through [`TimestampLog::order`] so callers
//! never depend on an implicit insertion convention.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::window::Timestamp;
use crate::error::StoreError;

/// Default namespace for request log keys.
pub const DEFAULT_REQUEST_NAMESPACE: &str = "user-request";

/// Direction in which [`TimestampLog::read_all`] returns entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOrder {
    /// Appends go to the head, reads scan head to tail
    NewestFirst,
    /// Appends go to the tail, reads scan head to tail
    OldestFirst,
}

/// Storage for per-key request timestamp logs.
///
/// Every operation on one key must be atomic with respect to other operations
/// on the same key. Operations never observe or affect other keys, except
/// [`sweep`](TimestampLog::sweep) which visits all of them.
#[async_trait]
pub trait TimestampLog: Send + Sync {
    /// Scan direction of [`read_all`](TimestampLog::read_all).
    fn order(&self) -> LogOrder;

    /// Record one entry. Duplicate timestamps are kept.
    async fn append(&self, key: &str, at: Timestamp) -> Result<(), StoreError>;

    /// Full sequence for a key in [`order`](TimestampLog::order), empty if unknown.
    async fn read_all(&self, key: &str) -> Result<Vec<Timestamp>, StoreError>;

    /// Remove every entry strictly older than `window_start`, deleting the key
    /// if nothing remains.
    async fn prune(&self, key: &str, window_start: Timestamp) -> Result<(), StoreError>;

    /// Number of entries at or after `window_start`, without mutating the log.
    async fn count(&self, key: &str, window_start: Timestamp) -> Result<usize, StoreError>;

    /// Drop a key and all of its entries.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Prune every key against `window_start`. Returns the number of keys deleted.
    async fn sweep(&self, window_start: Timestamp) -> Result<usize, StoreError>;

    /// Release backend resources on shutdown.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Read a key's log and return it newest-first, whatever the backend order.
pub async fn read_newest_first(
    log: &dyn TimestampLog,
    key: &str,
) -> Result<Vec<Timestamp>, StoreError> {
    let mut entries = log.read_all(key).await?;
    if log.order() == LogOrder::OldestFirst {
        entries.reverse();
    }
    Ok(entries)
}

/// In-process timestamp log backed by a sharded concurrent map.
///
/// Appends push to the front of each key's deque, so reads are newest-first.
/// Per-key atomicity comes from the shard lock held for each operation.
#[derive(Default)]
pub struct InMemoryTimestampLog {
    logs: DashMap<String, VecDeque<Timestamp>>,
}

impl InMemoryTimestampLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently holding entries.
    pub fn key_count(&self) -> usize {
        self.logs.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.logs.contains_key(key)
    }
}

#[async_trait]
impl TimestampLog for InMemoryTimestampLog {
    fn order(&self) -> LogOrder {
        LogOrder::NewestFirst
    }

    async fn append(&self, key: &str, at: Timestamp) -> Result<(), StoreError> {
        self.logs.entry(key.to_string()).or_default().push_front(at);
        trace!(key = %key, at = %at, "Appended timestamp");
        Ok(())
    }

    async fn read_all(&self, key: &str) -> Result<Vec<Timestamp>, StoreError> {
        Ok(self
            .logs
            .get(key)
            .map(|entries| entries.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn prune(&self, key: &str, window_start: Timestamp) -> Result<(), StoreError> {
        let emptied = match self.logs.get_mut(key) {
            Some(mut entries) => {
                entries.retain(|at| *at >= window_start);
                entries.is_empty()
            }
            None => return Ok(()),
        };

        // An append may land between the two locks; only remove a still-empty log.
        if emptied && self.logs.remove_if(key, |_, entries| entries.is_empty()).is_some() {
            trace!(key = %key, "Deleted empty log");
        }
        Ok(())
    }

    async fn count(&self, key: &str, window_start: Timestamp) -> Result<usize, StoreError> {
        Ok(self
            .logs
            .get(key)
            .map(|entries| entries.iter().filter(|at| **at >= window_start).count())
            .unwrap_or(0))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.logs.remove(key);
        Ok(())
    }

    async fn sweep(&self, window_start: Timestamp) -> Result<usize, StoreError> {
        let before = self.logs.len();
        self.logs.retain(|_, entries| {
            entries.retain(|at| *at >= window_start);
            !entries.is_empty()
        });
        let removed = before.saturating_sub(self.logs.len());

        debug!(
            removed = removed,
            remaining = self.logs.len(),
            "Timestamp log sweep complete"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_read_unknown_key_is_empty() {
        let log = InMemoryTimestampLog::new();
        assert!(log.read_all("missing").await.unwrap().is_empty());
        assert_eq!(log.count("missing", at(0)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reads_are_newest_first() {
        let log = InMemoryTimestampLog::new();
        for secs in [0, 10, 20] {
            log.append("k", at(secs)).await.unwrap();
        }

        assert_eq!(log.order(), LogOrder::NewestFirst);
        assert_eq!(log.read_all("k").await.unwrap(), vec![at(20), at(10), at(0)]);
    }

    #[tokio::test]
    async fn test_duplicate_timestamps_are_kept() {
        let log = InMemoryTimestampLog::new();
        log.append("k", at(5)).await.unwrap();
        log.append("k", at(5)).await.unwrap();

        assert_eq!(log.read_all("k").await.unwrap(), vec![at(5), at(5)]);
    }

    #[tokio::test]
    async fn test_prune_removes_strictly_older() {
        let log = InMemoryTimestampLog::new();
        for secs in [0, 10, 20, 70] {
            log.append("k", at(secs)).await.unwrap();
        }

        log.prune("k", at(10)).await.unwrap();
        assert_eq!(log.read_all("k").await.unwrap(), vec![at(70), at(20), at(10)]);
    }

    #[tokio::test]
    async fn test_prune_is_idempotent() {
        let log = InMemoryTimestampLog::new();
        for secs in [0, 10, 20, 70] {
            log.append("k", at(secs)).await.unwrap();
        }

        log.prune("k", at(15)).await.unwrap();
        let once = log.read_all("k").await.unwrap();
        log.prune("k", at(15)).await.unwrap();
        let twice = log.read_all("k").await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(once, vec![at(70), at(20)]);
    }

    #[tokio::test]
    async fn test_prune_deletes_emptied_key() {
        let log = InMemoryTimestampLog::new();
        log.append("k", at(0)).await.unwrap();
        log.append("other", at(0)).await.unwrap();

        log.prune("k", at(100)).await.unwrap();

        assert!(!log.contains_key("k"));
        assert!(log.contains_key("other"));
        assert_eq!(log.key_count(), 1);

        // Pruning an unknown key is a no-op
        log.prune("k", at(100)).await.unwrap();
    }

    #[tokio::test]
    async fn test_count_does_not_mutate() {
        let log = InMemoryTimestampLog::new();
        for secs in [0, 10, 20] {
            log.append("k", at(secs)).await.unwrap();
        }

        assert_eq!(log.count("k", at(10)).await.unwrap(), 2);
        assert_eq!(log.read_all("k").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let log = InMemoryTimestampLog::new();
        log.append("k", at(0)).await.unwrap();
        log.delete("k").await.unwrap();

        assert!(!log.contains_key("k"));
        assert!(log.read_all("k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_prunes_all_keys() {
        let log = InMemoryTimestampLog::new();
        log.append("stale", at(0)).await.unwrap();
        log.append("mixed", at(0)).await.unwrap();
        log.append("mixed", at(50)).await.unwrap();
        log.append("fresh", at(60)).await.unwrap();

        let removed = log.sweep(at(30)).await.unwrap();

        assert_eq!(removed, 1);
        assert!(!log.contains_key("stale"));
        assert_eq!(log.read_all("mixed").await.unwrap(), vec![at(50)]);
        assert_eq!(log.read_all("fresh").await.unwrap(), vec![at(60)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let log = Arc::new(InMemoryTimestampLog::new());

        let tasks = (0..200).map(|i| {
            let log = Arc::clone(&log);
            tokio::spawn(async move { log.append("shared", at(i % 7)).await })
        });

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(log.read_all("shared").await.unwrap().len(), 200);
    }

    struct OldestFirstLog(InMemoryTimestampLog);

    #[async_trait]
    impl TimestampLog for OldestFirstLog {
        fn order(&self) -> LogOrder {
            LogOrder::OldestFirst
        }

        async fn append(&self, key: &str, at: Timestamp) -> Result<(), StoreError> {
            self.0.append(key, at).await
        }

        async fn read_all(&self, key: &str) -> Result<Vec<Timestamp>, StoreError> {
            let mut entries = self.0.read_all(key).await?;
            entries.reverse();
            Ok(entries)
        }

        async fn prune(&self, key: &str, window_start: Timestamp) -> Result<(), StoreError> {
            self.0.prune(key, window_start).await
        }

        async fn count(&self, key: &str, window_start: Timestamp) -> Result<usize, StoreError> {
            self.0.count(key, window_start).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.0.delete(key).await
        }

        async fn sweep(&self, window_start: Timestamp) -> Result<usize, StoreError> {
            self.0.sweep(window_start).await
        }
    }

    #[tokio::test]
    async fn test_read_newest_first_normalizes_order() {
        let log = OldestFirstLog(InMemoryTimestampLog::new());
        for secs in [0, 10, 20] {
            log.append("k", at(secs)).await.unwrap();
        }

        assert_eq!(log.read_all("k").await.unwrap(), vec![at(0), at(10), at(20)]);
        assert_eq!(
            read_newest_first(&log, "k").await.unwrap(),
            vec![at(20), at(10), at(0)]
        );
    }
}
