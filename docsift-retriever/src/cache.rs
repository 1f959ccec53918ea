//! Content-addressed cache of built documents.
//!
//! [`ArtifactCache::get_or_build`] maps a document's [`Fingerprint`] to its chunks and
//! vector index. Known documents are served straight from the [`EntryStore`]; unknown
//! ones are built once by the caller-supplied closure and persisted.
//!
//! ## Concurrency
//!
//! - Lookups of an existing entry take no lock.
//! - The build path is serialized per fingerprint: the first caller builds, later
//!   callers for the same document wait and then read what was stored.
//! - The build runs on its own tokio task, so a caller that gives up (timeout, dropped
//!   request) does not cancel it; the entry still lands in the store.
//!
//! ## Failure policy
//!
//! A build error is returned and nothing is stored. A storage failure *after* a
//! successful build still returns the fresh entry, with the failure attached as
//! [`CacheOutcome::persist_error`].

use crate::error::{FailureReport, Result, RetrievalError};
use crate::fingerprint::{Fingerprint, fingerprint_bytes};
use crate::index::VectorIndex;
use crate::storage::{CacheEntry, CacheError, EntryStore, EntrySummary, LoadOutcome};
use chrono::{SubsecRound, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

/// What a build produces: chunks in document order and one vector per chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifacts {
    pub chunks: Vec<String>,
    pub index: VectorIndex,
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub persist_failures: u64,
    /// Stored records ignored because of a format or profile mismatch
    pub rejected_records: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone)]
pub struct CacheOutcome {
    pub entry: Arc<CacheEntry>,
    pub was_cache_hit: bool,
    /// Set when the entry was built but could not be stored.
    pub persist_error: Option<FailureReport>,
}

/// One async mutex per fingerprint currently being built.
#[derive(Default)]
struct BuildLocks {
    inner: std::sync::Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl BuildLocks {
    fn acquire(&self, fingerprint: Fingerprint) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(fingerprint).or_default())
    }

    /// Forget the lock once nobody else holds or waits on it.
    fn release(&self, fingerprint: &Fingerprint) {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(fingerprint)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(fingerprint);
        }
    }

    /// Wait for exclusive use of `fingerprint`. The map entry is forgotten when the
    /// permit drops, including when the wait itself is cancelled.
    async fn lock(self: &Arc<Self>, fingerprint: Fingerprint) -> BuildPermit {
        let mut permit = BuildPermit {
            guard: None,
            locks: Arc::clone(self),
            fingerprint,
        };
        let lock = self.acquire(fingerprint);
        permit.guard = Some(lock.lock_owned().await);
        permit
    }

    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct BuildPermit {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<BuildLocks>,
    fingerprint: Fingerprint,
}

impl Drop for BuildPermit {
    fn drop(&mut self) {
        // Unlock first so the strong count reflects only waiters.
        self.guard.take();
        self.locks.release(&self.fingerprint);
    }
}

pub struct ArtifactCache {
    store: Arc<dyn EntryStore>,
    profile: String,
    max_entries: Option<usize>,
    locks: Arc<BuildLocks>,
    stats: Arc<RwLock<CacheStats>>,
}

impl ArtifactCache {
    /// `profile` identifies how entries are built (embedding model and chunker
    /// settings); records stored under another profile are treated as misses.
    pub fn new(store: Arc<dyn EntryStore>, profile: impl Into<String>) -> Self {
        Self {
            store,
            profile: profile.into(),
            max_entries: None,
            locks: Arc::new(BuildLocks::default()),
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    /// Keep at most `max_entries` records, evicting the least recently used.
    pub fn with_max_entries(self, max_entries: Option<usize>) -> Self {
        Self {
            max_entries,
            ..self
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// Fingerprint `document` and return its entry, building it with `build` on a miss.
    pub async fn get_or_build<F, Fut>(&self, document: &[u8], build: F) -> Result<CacheOutcome>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Artifacts>> + Send + 'static,
    {
        let fingerprint = fingerprint_bytes(document);
        self.get_or_build_for(fingerprint, document.len() as u64, build)
            .await
    }

    /// Like [`get_or_build`](Self::get_or_build) for a document that is already fingerprinted.
    pub async fn get_or_build_for<F, Fut>(
        &self,
        fingerprint: Fingerprint,
        byte_len: u64,
        build: F,
    ) -> Result<CacheOutcome>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Artifacts>> + Send + 'static,
    {
        if let Some(entry) = self.load(&fingerprint).await? {
            return Ok(self.hit(entry).await);
        }

        let permit = self.locks.lock(fingerprint).await;

        // Another caller may have finished the build while we waited.
        if let Some(entry) = self.load(&fingerprint).await? {
            drop(permit);
            return Ok(self.hit(entry).await);
        }

        info!("Cache miss for {}, building", fingerprint.short());
        {
            let mut stats = self.stats.write().await;
            stats.misses += 1;
            stats.builds += 1;
        }

        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);
        let profile = self.profile.clone();
        let max_entries = self.max_entries;

        // The permit moves into the task so it is released when the build ends,
        // whether or not this caller is still waiting.
        let task = tokio::spawn(async move {
            let _permit = permit;
            let artifacts = build().await?;
            let entry = Arc::new(CacheEntry::new(
                fingerprint,
                artifacts.chunks,
                artifacts.index,
                byte_len,
                Utc::now().trunc_subsecs(3),
            )?);
            let persist_error =
                persist(store.as_ref(), &entry, &profile, max_entries, &stats).await;
            Ok::<_, RetrievalError>((entry, persist_error))
        });

        let (entry, persist_error) = match task.await {
            Ok(result) => result?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => {
                return Err(CacheError::BuildAborted {
                    fingerprint: fingerprint.to_hex(),
                }
                .into());
            }
        };

        Ok(CacheOutcome {
            entry,
            was_cache_hit: false,
            persist_error,
        })
    }

    /// Read-only probe; does not build and does not touch the hit/miss counters.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Arc<CacheEntry>>> {
        self.load(fingerprint).await
    }

    /// Drop the stored entry for `fingerprint`. Returns whether one existed.
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let removed = self.store.remove(fingerprint).await?;
        if removed {
            info!("Invalidated cache entry {}", fingerprint.short());
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<usize> {
        let removed = self.store.clear().await?;
        info!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    pub async fn entries(&self) -> Result<Vec<EntrySummary>> {
        Ok(self.store.list().await?)
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    async fn load(&self, fingerprint: &Fingerprint) -> Result<Option<Arc<CacheEntry>>> {
        match self.store.load(fingerprint, &self.profile).await? {
            LoadOutcome::Found(entry) => Ok(Some(Arc::new(entry))),
            LoadOutcome::Missing => Ok(None),
            LoadOutcome::Rejected { reason } => {
                warn!(
                    "Ignoring stored entry {}: {}; it will be rebuilt",
                    fingerprint.short(),
                    reason
                );
                self.stats.write().await.rejected_records += 1;
                Ok(None)
            }
        }
    }

    async fn hit(&self, entry: Arc<CacheEntry>) -> CacheOutcome {
        debug!("Cache hit for {}", entry.fingerprint.short());
        self.stats.write().await.hits += 1;
        CacheOutcome {
            entry,
            was_cache_hit: true,
            persist_error: None,
        }
    }
}

async fn persist(
    store: &dyn EntryStore,
    entry: &CacheEntry,
    profile: &str,
    max_entries: Option<usize>,
    stats: &RwLock<CacheStats>,
) -> Option<FailureReport> {
    if let Err(e) = store.save(entry, profile).await {
        warn!(
            "Failed to store cache entry {}: {}",
            entry.fingerprint.short(),
            e
        );
        stats.write().await.persist_failures += 1;
        return Some(RetrievalError::from(e).report());
    }

    if let Some(capacity) = max_entries {
        match store.evict_to(capacity).await {
            Ok(0) => {}
            Ok(evicted) => {
                debug!("Evicted {} least recently used entries", evicted);
                stats.write().await.evictions += evicted as u64;
            }
            Err(e) => warn!("Failed to evict old cache entries: {}", e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::index::IndexError;
    use crate::storage::SqliteEntryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing_test::traced_test;

    const PROFILE: &str = "test-model|sliding_window(window=4,overlap=1)";

    fn artifacts(chunks: &[&str]) -> Artifacts {
        let vectors = (0..chunks.len())
            .map(|i| {
                let mut v = vec![0.1; 3];
                v[i % 3] = 1.0;
                v
            })
            .collect();
        Artifacts {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            index: VectorIndex::build(vectors).unwrap(),
        }
    }

    async fn memory_cache() -> ArtifactCache {
        let store = SqliteEntryStore::open_memory().await.unwrap();
        ArtifactCache::new(Arc::new(store), PROFILE)
    }

    #[tokio::test]
    async fn test_build_once_then_hit() {
        let cache = memory_cache().await;
        let calls = Arc::new(AtomicUsize::new(0));

        for expected_hit in [false, true] {
            let counter = Arc::clone(&calls);
            let outcome = cache
                .get_or_build(b"1.1 Scope\nText A", move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(artifacts(&["1.1 Scope\nText A"]))
                })
                .await
                .unwrap();
            assert_eq!(outcome.was_cache_hit, expected_hit);
            assert_eq!(outcome.entry.chunks, vec!["1.1 Scope\nText A"]);
            assert!(outcome.persist_error.is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.builds), (1, 1, 1));
        assert_eq!(cache.locks.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_build_once() {
        let cache = Arc::new(memory_cache().await);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let counter = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build(b"shared document", move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(artifacts(&["a", "b"]))
                    })
                    .await
            }));
        }

        let mut built = 0;
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert_eq!(outcome.entry.chunks, vec!["a", "b"]);
            if !outcome.was_cache_hit {
                built += 1;
            }
        }
        assert_eq!(built, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_build_error_is_not_stored() {
        let cache = memory_cache().await;
        let err = cache
            .get_or_build(b"doc", || async { Err(IndexError::InvalidK.into()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        assert!(cache.lookup(&fingerprint_bytes(b"doc")).await.unwrap().is_none());

        let outcome = cache
            .get_or_build(b"doc", || async { Ok(artifacts(&["ok"])) })
            .await
            .unwrap();
        assert!(!outcome.was_cache_hit);
    }

    #[tokio::test]
    async fn test_mismatched_chunks_and_vectors_rejected() {
        let cache = memory_cache().await;
        let err = cache
            .get_or_build(b"doc", || async {
                let mut built = artifacts(&["one", "two"]);
                built.chunks.push("three".to_string());
                Ok(built)
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Index(IndexError::LengthMismatch {
                chunks: 3,
                vectors: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_abandoned_build_still_populates_cache() {
        let cache = memory_cache().await;
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            cache.get_or_build(b"slow document", move || async move {
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(artifacts(&["eventually"]))
            }),
        )
        .await;
        assert!(abandoned.is_err(), "caller should have timed out");
        started_rx.await.unwrap();

        let fingerprint = fingerprint_bytes(b"slow document");
        let mut found = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            found = cache.lookup(&fingerprint).await.unwrap();
            if found.is_some() {
                break;
            }
        }
        assert_eq!(found.unwrap().chunks, vec!["eventually"]);

        // The detached build forgets its lock once it finishes.
        for _ in 0..50 {
            if cache.locks.len() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(cache.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak_lock() {
        let cache = Arc::new(memory_cache().await);
        let fingerprint = fingerprint_bytes(b"contended");
        let holder = cache.locks.lock(fingerprint).await;

        let waiter = tokio::time::timeout(
            Duration::from_millis(20),
            cache.locks.lock(fingerprint),
        )
        .await;
        assert!(waiter.is_err(), "waiter should still be blocked");
        assert_eq!(cache.locks.len(), 1);

        drop(holder);
        assert_eq!(cache.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_profile_change_rebuilds() {
        let store: Arc<dyn EntryStore> = Arc::new(SqliteEntryStore::open_memory().await.unwrap());
        let old = ArtifactCache::new(Arc::clone(&store), "old-model|sections");
        old.get_or_build(b"doc", || async { Ok(artifacts(&["old"])) })
            .await
            .unwrap();

        let new = ArtifactCache::new(store, PROFILE);
        let outcome = new
            .get_or_build(b"doc", || async { Ok(artifacts(&["new"])) })
            .await
            .unwrap();
        assert!(!outcome.was_cache_hit);
        assert_eq!(outcome.entry.chunks, vec!["new"]);
        assert_eq!(new.stats().await.rejected_records, 2);

        // The rebuilt record replaced the stale one.
        let again = new
            .get_or_build(b"doc", || async { Ok(artifacts(&["unused"])) })
            .await
            .unwrap();
        assert!(again.was_cache_hit);
        assert_eq!(again.entry.chunks, vec!["new"]);
    }

    struct FailingStore;

    #[async_trait]
    impl EntryStore for FailingStore {
        async fn load(&self, _: &Fingerprint, _: &str) -> std::result::Result<LoadOutcome, CacheError> {
            Ok(LoadOutcome::Missing)
        }

        async fn save(&self, _: &CacheEntry, _: &str) -> std::result::Result<(), CacheError> {
            Err(std::io::Error::other("disk full").into())
        }

        async fn remove(&self, _: &Fingerprint) -> std::result::Result<bool, CacheError> {
            Ok(false)
        }

        async fn clear(&self) -> std::result::Result<usize, CacheError> {
            Ok(0)
        }

        async fn list(&self) -> std::result::Result<Vec<EntrySummary>, CacheError> {
            Ok(Vec::new())
        }

        async fn evict_to(&self, _: usize) -> std::result::Result<usize, CacheError> {
            Ok(0)
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_persist_failure_still_returns_entry() {
        let cache = ArtifactCache::new(Arc::new(FailingStore), PROFILE);
        let outcome = cache
            .get_or_build(b"doc", || async { Ok(artifacts(&["fresh", "chunks"])) })
            .await
            .unwrap();

        assert!(!outcome.was_cache_hit);
        assert_eq!(outcome.entry.chunks, vec!["fresh", "chunks"]);
        assert_eq!(outcome.entry.index.len(), 2);
        let report = outcome.persist_error.unwrap();
        assert_eq!(report.kind, ErrorKind::CacheIo);
        assert!(report.message.contains("disk full"));
        assert_eq!(cache.stats().await.persist_failures, 1);
        assert!(logs_contain("Failed to store cache entry"));
    }

    #[tokio::test]
    async fn test_admin_operations_and_eviction() {
        let cache = memory_cache().await.with_max_entries(Some(2));
        for doc in [&b"doc-1"[..], &b"doc-2"[..], &b"doc-3"[..]] {
            cache
                .get_or_build(doc, || async { Ok(artifacts(&["x"])) })
                .await
                .unwrap();
        }

        let entries = cache.entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].fingerprint, fingerprint_bytes(b"doc-3"));
        assert_eq!(cache.stats().await.evictions, 1);
        assert!(cache.lookup(&fingerprint_bytes(b"doc-1")).await.unwrap().is_none());

        assert!(cache.invalidate(&fingerprint_bytes(b"doc-3")).await.unwrap());
        assert!(!cache.invalidate(&fingerprint_bytes(b"doc-3")).await.unwrap());
        assert_eq!(cache.clear().await.unwrap(), 1);
        assert!(cache.entries().await.unwrap().is_empty());
    }
}
