//! Durable storage for cache entries.
//!
//! The [`ArtifactCache`](crate::cache::ArtifactCache) decides *when* to build and store;
//! an [`EntryStore`] only knows how to persist and reload one document's chunks and
//! vectors, addressed purely by [`Fingerprint`].
//!
//! ## Records
//!
//! A stored record carries a format version and a *profile* string (embedding model id
//! plus chunker parameters). A record written under a different version or profile is
//! reported as [`LoadOutcome::Rejected`] rather than an error, and is overwritten by
//! the next successful build for that fingerprint.
//!
//! ```text
//! ArtifactCache ── EntryStore ── SqliteEntryStore (documents + document_chunks tables)
//! ```

use crate::fingerprint::Fingerprint;
use crate::index::{IndexError, VectorIndex};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod sqlite_store;

pub use sqlite_store::SqliteEntryStore;

/// Version of the record layout. Bump when the stored representation changes.
pub const FORMAT_VERSION: i64 = 1;

/// Failure reading or writing the cache's durable storage.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("build for {fingerprint} was aborted before it finished")]
    BuildAborted { fingerprint: String },
}

/// A document's chunks and their vector index, as produced by one build.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub chunks: Vec<String>,
    pub index: VectorIndex,
    /// Size of the source document in bytes
    pub byte_len: u64,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Pair chunks with their vectors; position *i* of the index must belong to chunk *i*.
    pub fn new(
        fingerprint: Fingerprint,
        chunks: Vec<String>,
        index: VectorIndex,
        byte_len: u64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, IndexError> {
        if chunks.len() != index.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: index.len(),
            });
        }
        Ok(Self {
            fingerprint,
            chunks,
            index,
            byte_len,
            created_at,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            fingerprint: self.fingerprint,
            chunk_count: self.chunks.len(),
            dimension: self.index.dimension(),
            byte_len: self.byte_len,
            created_at: self.created_at,
            format_version: FORMAT_VERSION,
        }
    }
}

/// Entry metadata without chunk text or vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub fingerprint: Fingerprint,
    pub chunk_count: usize,
    pub dimension: usize,
    pub byte_len: u64,
    pub created_at: DateTime<Utc>,
    pub format_version: i64,
}

/// Result of looking up one fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Found(CacheEntry),
    Missing,
    /// A record exists but cannot be used under the current format and profile.
    Rejected { reason: String },
}

/// Persistence for cache entries. See module docs for the record rules.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Load the record for `fingerprint`, marking it as most recently used if found.
    async fn load(&self, fingerprint: &Fingerprint, profile: &str) -> Result<LoadOutcome, CacheError>;

    /// Atomically replace whatever is stored for the entry's fingerprint.
    async fn save(&self, entry: &CacheEntry, profile: &str) -> Result<(), CacheError>;

    /// Delete one record, returning whether it existed.
    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, CacheError>;

    /// Delete every record, returning how many were removed.
    async fn clear(&self) -> Result<usize, CacheError>;

    /// Summaries of all records, most recently used first.
    async fn list(&self) -> Result<Vec<EntrySummary>, CacheError>;

    /// Delete the least recently used records until at most `capacity` remain.
    async fn evict_to(&self, capacity: usize) -> Result<usize, CacheError>;
}
