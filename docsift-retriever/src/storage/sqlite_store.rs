//! SQLite implementation of [`EntryStore`].
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE documents (
//!     fingerprint BLOB PRIMARY KEY,      -- blake3 digest (32 bytes)
//!     format_version INTEGER NOT NULL,
//!     profile TEXT NOT NULL,             -- embedding model id + chunker parameters
//!     dimension INTEGER NOT NULL,
//!     chunk_count INTEGER NOT NULL,
//!     vectors BLOB NOT NULL,             -- row-major f32 matrix, native byte order
//!     byte_len INTEGER NOT NULL,         -- size of the source document
//!     created_at INTEGER NOT NULL,       -- unix milliseconds
//!     last_access INTEGER NOT NULL       -- recency counter for LRU eviction
//! );
//!
//! CREATE TABLE document_chunks (
//!     fingerprint BLOB NOT NULL REFERENCES documents(fingerprint) ON DELETE CASCADE,
//!     position INTEGER NOT NULL,
//!     content TEXT NOT NULL,
//!     PRIMARY KEY (fingerprint, position)
//! );
//! ```
//!
//! Every write replaces a whole record inside one transaction, so readers see either
//! the previous record or the complete new one.

use super::{CacheEntry, CacheError, EntryStore, EntrySummary, FORMAT_VERSION, LoadOutcome};
use crate::fingerprint::Fingerprint;
use crate::index::VectorIndex;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name of the cache database inside the cache directory.
pub const DB_FILE_NAME: &str = "docsift-cache.db";

#[derive(Clone, Debug)]
pub struct SqliteEntryStore {
    pool: SqlitePool,
    db_path: Option<PathBuf>,
}

impl SqliteEntryStore {
    /// Opens (creating if needed) `<cache_dir>/docsift-cache.db`.
    pub async fn open(cache_dir: &Path) -> Result<Self, CacheError> {
        tokio::fs::create_dir_all(cache_dir).await?;
        let db_path = cache_dir.join(DB_FILE_NAME);

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .page_size(1 << 16),
        )
        .await?;
        tracing::debug!("Opened cache database at {}", db_path.display());
        Self::new_with_pool(pool, Some(db_path)).await
    }

    /// In-memory store for tests. Lives as long as the store's single connection.
    pub async fn open_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
            .await?;
        Self::new_with_pool(pool, None).await
    }

    async fn new_with_pool(pool: SqlitePool, db_path: Option<PathBuf>) -> Result<Self, CacheError> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool, db_path })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                fingerprint BLOB PRIMARY KEY,
                format_version INTEGER NOT NULL,
                profile TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                vectors BLOB NOT NULL,
                byte_len INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_access INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_chunks (
                fingerprint BLOB NOT NULL,
                position INTEGER NOT NULL,
                content TEXT NOT NULL,
                PRIMARY KEY (fingerprint, position),
                FOREIGN KEY (fingerprint) REFERENCES documents(fingerprint) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_last_access ON documents(last_access)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Location of the database file, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_chunks(&self, fingerprint: &Fingerprint) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query(
            "SELECT content FROM document_chunks WHERE fingerprint = ? ORDER BY position",
        )
        .bind(fingerprint.as_bytes().as_slice())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("content").map_err(CacheError::from))
            .collect()
    }
}

fn timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[async_trait]
impl EntryStore for SqliteEntryStore {
    async fn load(&self, fingerprint: &Fingerprint, profile: &str) -> Result<LoadOutcome, CacheError> {
        let row = sqlx::query(
            "SELECT format_version, profile, dimension, chunk_count, vectors, byte_len, created_at
             FROM documents WHERE fingerprint = ?",
        )
        .bind(fingerprint.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(LoadOutcome::Missing);
        };

        let format_version: i64 = row.try_get("format_version")?;
        if format_version != FORMAT_VERSION {
            return Ok(LoadOutcome::Rejected {
                reason: format!(
                    "format version {format_version} does not match {FORMAT_VERSION}"
                ),
            });
        }

        let stored_profile: String = row.try_get("profile")?;
        if stored_profile != profile {
            return Ok(LoadOutcome::Rejected {
                reason: format!("built with profile '{stored_profile}', expected '{profile}'"),
            });
        }

        let dimension: i64 = row.try_get("dimension")?;
        let chunk_count: i64 = row.try_get("chunk_count")?;
        let blob: Vec<u8> = row.try_get("vectors")?;
        let expected_bytes = dimension * chunk_count * std::mem::size_of::<f32>() as i64;
        if dimension < 0 || chunk_count < 0 || blob.len() as i64 != expected_bytes {
            return Ok(LoadOutcome::Rejected {
                reason: format!(
                    "vector blob is {} bytes, expected {expected_bytes} for {chunk_count} x {dimension}",
                    blob.len()
                ),
            });
        }

        let chunks = self.load_chunks(fingerprint).await?;
        if chunks.len() as i64 != chunk_count {
            return Ok(LoadOutcome::Rejected {
                reason: format!("found {} chunk rows, expected {chunk_count}", chunks.len()),
            });
        }

        let data: Vec<f32> = bytemuck::pod_collect_to_vec(&blob);
        let index = match VectorIndex::from_flat(dimension as usize, data) {
            Ok(index) => index,
            Err(e) => return Ok(LoadOutcome::Rejected { reason: e.to_string() }),
        };

        let byte_len: i64 = row.try_get("byte_len")?;
        let created_at: i64 = row.try_get("created_at")?;
        let entry = match CacheEntry::new(
            *fingerprint,
            chunks,
            index,
            byte_len.max(0) as u64,
            timestamp(created_at),
        ) {
            Ok(entry) => entry,
            Err(e) => return Ok(LoadOutcome::Rejected { reason: e.to_string() }),
        };

        sqlx::query(
            "UPDATE documents
             SET last_access = (SELECT COALESCE(MAX(last_access), 0) + 1 FROM documents)
             WHERE fingerprint = ?",
        )
        .bind(fingerprint.as_bytes().as_slice())
        .execute(&self.pool)
        .await?;

        Ok(LoadOutcome::Found(entry))
    }

    async fn save(&self, entry: &CacheEntry, profile: &str) -> Result<(), CacheError> {
        let key = entry.fingerprint.as_bytes().as_slice();
        let vectors: &[u8] = bytemuck::cast_slice(entry.index.as_flat());

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM document_chunks WHERE fingerprint = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE fingerprint = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO documents
                (fingerprint, format_version, profile, dimension, chunk_count, vectors,
                 byte_len, created_at, last_access)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?,
                     (SELECT COALESCE(MAX(last_access), 0) + 1 FROM documents))",
        )
        .bind(key)
        .bind(FORMAT_VERSION)
        .bind(profile)
        .bind(entry.index.dimension() as i64)
        .bind(entry.chunks.len() as i64)
        .bind(vectors)
        .bind(entry.byte_len as i64)
        .bind(entry.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        for (position, content) in entry.chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO document_chunks (fingerprint, position, content) VALUES (?, ?, ?)",
            )
            .bind(key)
            .bind(position as i64)
            .bind(content.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            "Stored {} chunks for {}",
            entry.chunks.len(),
            entry.fingerprint.short()
        );
        Ok(())
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, CacheError> {
        let key = fingerprint.as_bytes().as_slice();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_chunks WHERE fingerprint = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM documents WHERE fingerprint = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed > 0)
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_chunks")
            .execute(&mut *tx)
            .await?;
        let removed = sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn list(&self) -> Result<Vec<EntrySummary>, CacheError> {
        let rows = sqlx::query(
            "SELECT fingerprint, format_version, dimension, chunk_count, byte_len, created_at
             FROM documents ORDER BY last_access DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let key: Vec<u8> = row.try_get("fingerprint")?;
            let Some(fingerprint) = Fingerprint::from_slice(&key) else {
                tracing::warn!("Skipping cache record with a {}-byte key", key.len());
                continue;
            };
            let dimension: i64 = row.try_get("dimension")?;
            let chunk_count: i64 = row.try_get("chunk_count")?;
            let byte_len: i64 = row.try_get("byte_len")?;
            let created_at: i64 = row.try_get("created_at")?;
            summaries.push(EntrySummary {
                fingerprint,
                chunk_count: chunk_count.max(0) as usize,
                dimension: dimension.max(0) as usize,
                byte_len: byte_len.max(0) as u64,
                created_at: timestamp(created_at),
                format_version: row.try_get("format_version")?,
            });
        }
        Ok(summaries)
    }

    async fn evict_to(&self, capacity: usize) -> Result<usize, CacheError> {
        let mut tx = self.pool.begin().await?;
        let evicted = sqlx::query(
            "DELETE FROM documents WHERE fingerprint IN (
                SELECT fingerprint FROM documents ORDER BY last_access DESC LIMIT -1 OFFSET ?
             )",
        )
        .bind(capacity as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if evicted > 0 {
            sqlx::query(
                "DELETE FROM document_chunks
                 WHERE fingerprint NOT IN (SELECT fingerprint FROM documents)",
            )
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(evicted as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint_bytes;

    const PROFILE: &str = "test-model|sliding_window(window=4,overlap=1)";

    fn entry(seed: &[u8], chunks: &[&str]) -> CacheEntry {
        let vectors = (0..chunks.len())
            .map(|i| {
                let mut v = vec![0.0; 4];
                v[i % 4] = 1.0;
                v[(i + 1) % 4] = 0.5;
                v
            })
            .collect();
        CacheEntry::new(
            fingerprint_bytes(seed),
            chunks.iter().map(|c| c.to_string()).collect(),
            VectorIndex::build(vectors).unwrap(),
            seed.len() as u64,
            timestamp(1_700_000_000_123),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_and_load() -> anyhow::Result<()> {
        let store = SqliteEntryStore::open_memory().await?;
        let stored = entry(b"doc-a", &["first chunk", "second chunk", "third"]);

        assert_eq!(
            store.load(&stored.fingerprint, PROFILE).await?,
            LoadOutcome::Missing
        );
        store.save(&stored, PROFILE).await?;

        match store.load(&stored.fingerprint, PROFILE).await? {
            LoadOutcome::Found(loaded) => assert_eq!(loaded, stored),
            other => panic!("expected a stored entry, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_entry_round_trip() -> anyhow::Result<()> {
        let store = SqliteEntryStore::open_memory().await?;
        let empty = entry(b"", &[]);
        store.save(&empty, PROFILE).await?;
        assert_eq!(
            store.load(&empty.fingerprint, PROFILE).await?,
            LoadOutcome::Found(empty)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_profile_and_version_mismatch_rejected() -> anyhow::Result<()> {
        let store = SqliteEntryStore::open_memory().await?;
        let stored = entry(b"doc-b", &["one", "two"]);
        store.save(&stored, PROFILE).await?;

        assert!(matches!(
            store.load(&stored.fingerprint, "other-model|sections").await?,
            LoadOutcome::Rejected { .. }
        ));

        sqlx::query("UPDATE documents SET format_version = 99")
            .execute(store.pool())
            .await?;
        match store.load(&stored.fingerprint, PROFILE).await? {
            LoadOutcome::Rejected { reason } => assert!(reason.contains("format version 99")),
            other => panic!("expected rejection, got {other:?}"),
        }

        // The next save replaces the stale record.
        store.save(&stored, PROFILE).await?;
        assert!(matches!(
            store.load(&stored.fingerprint, PROFILE).await?,
            LoadOutcome::Found(_)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_blob_rejected() -> anyhow::Result<()> {
        let store = SqliteEntryStore::open_memory().await?;
        let stored = entry(b"doc-c", &["one", "two"]);
        store.save(&stored, PROFILE).await?;

        sqlx::query("UPDATE documents SET vectors = substr(vectors, 1, 8)")
            .execute(store.pool())
            .await?;
        assert!(matches!(
            store.load(&stored.fingerprint, PROFILE).await?,
            LoadOutcome::Rejected { .. }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_clear_and_list() -> anyhow::Result<()> {
        let store = SqliteEntryStore::open_memory().await?;
        let a = entry(b"doc-a", &["a"]);
        let b = entry(b"doc-b", &["b", "bb"]);
        store.save(&a, PROFILE).await?;
        store.save(&b, PROFILE).await?;

        let listed = store.list().await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].fingerprint, b.fingerprint);
        assert_eq!(listed[0].chunk_count, 2);
        assert_eq!(listed[0].dimension, 4);

        assert!(store.remove(&a.fingerprint).await?);
        assert!(!store.remove(&a.fingerprint).await?);
        assert_eq!(store.clear().await?, 1);
        assert!(store.list().await?.is_empty());

        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks")
            .fetch_one(store.pool())
            .await?;
        assert_eq!(orphans, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() -> anyhow::Result<()> {
        let store = SqliteEntryStore::open_memory().await?;
        let a = entry(b"doc-a", &["a"]);
        let b = entry(b"doc-b", &["b"]);
        let c = entry(b"doc-c", &["c"]);
        store.save(&a, PROFILE).await?;
        store.save(&b, PROFILE).await?;
        // Touch `a` so `b` becomes the oldest.
        store.load(&a.fingerprint, PROFILE).await?;
        store.save(&c, PROFILE).await?;

        assert_eq!(store.evict_to(2).await?, 1);
        assert_eq!(store.load(&b.fingerprint, PROFILE).await?, LoadOutcome::Missing);
        assert!(matches!(
            store.load(&a.fingerprint, PROFILE).await?,
            LoadOutcome::Found(_)
        ));
        assert_eq!(store.evict_to(5).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_persists_across_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let stored = entry(b"durable", &["kept", "across", "restarts"]);
        {
            let store = SqliteEntryStore::open(dir.path()).await?;
            assert_eq!(store.db_path(), Some(dir.path().join(DB_FILE_NAME).as_path()));
            store.save(&stored, PROFILE).await?;
            store.pool().close().await;
        }

        let reopened = SqliteEntryStore::open(dir.path()).await?;
        assert_eq!(
            reopened.load(&stored.fingerprint, PROFILE).await?,
            LoadOutcome::Found(stored)
        );
        Ok(())
    }
}
