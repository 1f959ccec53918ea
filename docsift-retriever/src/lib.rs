//! docsift-retriever: content-addressed document retrieval
//!
//! Ingests a document once, splits it into chunks, embeds every chunk and keeps the
//! result in a persistent cache keyed by the document's content fingerprint. Queries
//! are answered by exact nearest-neighbor search over the cached vectors.
//!
//! ## Key Modules
//!
//! - **[`fingerprint`]**: streaming BLAKE3 document identity
//! - **[`extract`]**: bytes to text
//! - **[`index`]**: exact vector search over normalized embeddings
//! - **[`storage`]**: durable cache records with a SQLite implementation
//! - **[`cache`]**: get-or-build with per-document build serialization
//! - **[`pipeline`]**: the end-to-end flow with progress events
//! - **[`config`]**: TOML configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docsift_embed::{EmbedConfig, FastEmbedProvider};
//! use docsift_retriever::{DocsiftConfig, RetrievalPipeline};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = DocsiftConfig::default();
//! let embedder = Arc::new(FastEmbedProvider::create(config.embed_config()).await?);
//! let pipeline = RetrievalPipeline::open(&config, embedder).await?;
//!
//! let document = std::fs::read("policy.txt")?;
//! let outcome = pipeline.retrieve(&document, "What is the scope?", 3).await?;
//! for hit in outcome.results {
//!     println!("{:.4}  {}", hit.distance, hit.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Document → Fingerprint → ArtifactCache ─hit──────────────────────────────┐
//!                              └─miss→ Extract → Chunk → Embed → Index ─→ Store
//!                                                                          ↓
//! Query → Embed ───────────────────────────────────────────────→ VectorIndex::search
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod index;
pub mod pipeline;
pub mod storage;

pub use cache::{ArtifactCache, Artifacts, CacheOutcome, CacheStats};
pub use config::{ConfigError, DocsiftConfig};
pub use error::{ErrorKind, FailureReport, Result, RetrievalError};
pub use extract::{ExtractionError, TextExtractor, Utf8Extractor};
pub use fingerprint::{Fingerprint, FingerprintError, fingerprint_bytes, fingerprint_reader};
pub use index::{IndexError, Neighbor, VectorIndex};
pub use pipeline::{
    PipelineStage, PreparedDocument, ProgressEvent, RetrievalOutcome, RetrievalPipeline,
    RetrievedChunk,
};
pub use storage::{CacheEntry, CacheError, EntryStore, EntrySummary, SqliteEntryStore};
