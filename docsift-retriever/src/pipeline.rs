//! End-to-end retrieval: document in, ranked chunks out.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Fingerprinting → CacheLookup ─┬─ CacheHit ───────────────────────────────────────────┬→ Ready → Searching → Done
//!                               └─ Extracting → Chunking → Embedding → IndexBuilding → Persisting ┘
//! ```
//!
//! Any stage can end in `Failed`. Nothing is retried automatically.
//!
//! Progress is reported as [`ProgressEvent`]s on an optional flume channel. The stages
//! a user sees carry a fixed message ([`PipelineStage::message`]); the result of
//! [`RetrievalPipeline::prepare`] also lists the cache-stage messages of that call in
//! its `steps`.
//!
//! The extractor, chunker and embedding provider are constructed once by the caller
//! and shared; the pipeline itself only holds references to them and the cache.

use crate::cache::{ArtifactCache, Artifacts};
use crate::config::DocsiftConfig;
use crate::error::{FailureReport, Result};
use crate::extract::{TextExtractor, Utf8Extractor};
use crate::fingerprint::{Fingerprint, fingerprint_bytes};
use crate::index::{IndexError, VectorIndex};
use crate::storage::{CacheEntry, EntryStore, SqliteEntryStore};
use docsift_chunk::{Chunker, RuleBasedSentenceSplitter};
use docsift_embed::EmbeddingProvider;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fingerprinting,
    CacheLookup,
    CacheHit,
    Extracting,
    Chunking,
    Embedding,
    IndexBuilding,
    Persisting,
    Ready,
    Searching,
    Done,
    Failed,
}

impl PipelineStage {
    /// User-facing progress message, for the stages that have one.
    pub fn message(self) -> Option<&'static str> {
        match self {
            Self::Extracting => Some("Extracting text..."),
            Self::Chunking => Some("Chunking text..."),
            Self::Embedding => Some("Creating embeddings and index..."),
            Self::Persisting => Some("Saved to cache."),
            Self::CacheHit => Some("Loaded from cache."),
            Self::Searching => Some("Querying..."),
            Self::Done => Some("Done."),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: PipelineStage,
    /// Failure reason for [`PipelineStage::Failed`]
    pub detail: Option<String>,
}

impl ProgressEvent {
    pub fn message(&self) -> Option<&'static str> {
        self.stage.message()
    }
}

#[derive(Clone, Default)]
struct Progress {
    sender: Option<flume::Sender<ProgressEvent>>,
}

impl Progress {
    fn emit(&self, stage: PipelineStage) {
        debug!("Pipeline stage: {:?}", stage);
        self.send(ProgressEvent {
            stage,
            detail: None,
        });
    }

    fn fail(&self, report: &FailureReport) {
        self.send(ProgressEvent {
            stage: PipelineStage::Failed,
            detail: Some(report.to_string()),
        });
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            // A dropped receiver only means nobody is listening.
            let _ = sender.send(event);
        }
    }
}

/// A document resolved to its cache entry, ready to be searched.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub fingerprint: Fingerprint,
    pub entry: Arc<CacheEntry>,
    pub was_cache_hit: bool,
    /// Cache-stage progress messages of this call, in order
    pub steps: Vec<String>,
    pub persist_error: Option<FailureReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub position: usize,
    pub text: String,
    /// Squared L2 distance between the normalized query and chunk vectors
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalOutcome {
    pub fingerprint: Fingerprint,
    pub results: Vec<RetrievedChunk>,
    pub was_cache_hit: bool,
    pub steps: Vec<String>,
    pub persist_error: Option<FailureReport>,
}

/// Identifies how entries are built; changing either part invalidates stored entries.
pub fn cache_profile(embedder: &dyn EmbeddingProvider, chunker: &dyn Chunker) -> String {
    format!("{}|{}", embedder.model_id(), chunker.describe())
}

pub struct RetrievalPipeline {
    extractor: Arc<dyn TextExtractor>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    cache: ArtifactCache,
    progress: Progress,
}

impl RetrievalPipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn EntryStore>,
    ) -> Self {
        let profile = cache_profile(embedder.as_ref(), chunker.as_ref());
        Self {
            extractor,
            chunker,
            embedder,
            cache: ArtifactCache::new(store, profile),
            progress: Progress::default(),
        }
    }

    /// Pipeline over the SQLite cache in `config.cache_dir`, decoding plain UTF-8 text.
    pub async fn open(config: &DocsiftConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let chunker = config
            .chunking
            .build(Arc::new(RuleBasedSentenceSplitter::default()))?;
        let store = SqliteEntryStore::open(&config.cache_dir).await?;
        info!(
            "Opened docsift cache at {} ({})",
            config.cache_dir.display(),
            chunker.describe()
        );
        Ok(
            Self::new(Arc::new(Utf8Extractor::default()), chunker, embedder, Arc::new(store))
                .with_max_entries(config.max_entries),
        )
    }

    pub fn with_max_entries(self, max_entries: Option<usize>) -> Self {
        Self {
            cache: self.cache.with_max_entries(max_entries),
            ..self
        }
    }

    /// Send progress events to `sender` for every call on this pipeline.
    pub fn with_progress(self, sender: flume::Sender<ProgressEvent>) -> Self {
        Self {
            progress: Progress {
                sender: Some(sender),
            },
            ..self
        }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Resolve `document` to its chunks and index, building them on first sight.
    pub async fn prepare(&self, document: &[u8]) -> Result<PreparedDocument> {
        let result = self.prepare_inner(document).await;
        if let Err(e) = &result {
            self.progress.fail(&e.report());
        }
        result
    }

    /// Return the `top_k` chunks of `document` closest to `query`, closest first.
    pub async fn retrieve(
        &self,
        document: &[u8],
        query: &str,
        top_k: usize,
    ) -> Result<RetrievalOutcome> {
        let result = self.retrieve_inner(document, query, top_k).await;
        if let Err(e) = &result {
            self.progress.fail(&e.report());
        }
        result
    }

    /// [`retrieve`](Self::retrieve) with failures flattened to a [`FailureReport`].
    pub async fn retrieve_or_report(
        &self,
        document: &[u8],
        query: &str,
        top_k: usize,
    ) -> std::result::Result<RetrievalOutcome, FailureReport> {
        self.retrieve(document, query, top_k)
            .await
            .map_err(FailureReport::from)
    }

    /// Search an already prepared entry.
    pub async fn search(
        &self,
        entry: &CacheEntry,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Err(IndexError::InvalidK.into());
        }
        if entry.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_text(query).await?;
        let neighbors = entry.index.search(&query_vector, top_k)?;
        Ok(neighbors
            .into_iter()
            .map(|neighbor| RetrievedChunk {
                position: neighbor.position,
                text: entry.chunks[neighbor.position].clone(),
                distance: neighbor.distance,
            })
            .collect())
    }

    async fn prepare_inner(&self, document: &[u8]) -> Result<PreparedDocument> {
        self.progress.emit(PipelineStage::Fingerprinting);
        let fingerprint = fingerprint_bytes(document);

        self.progress.emit(PipelineStage::CacheLookup);
        let build = {
            let extractor = Arc::clone(&self.extractor);
            let chunker = Arc::clone(&self.chunker);
            let embedder = Arc::clone(&self.embedder);
            let progress = self.progress.clone();
            let document = document.to_vec();
            move || async move {
                build_artifacts(
                    extractor.as_ref(),
                    chunker.as_ref(),
                    embedder.as_ref(),
                    &progress,
                    &document,
                )
                .await
            }
        };

        let outcome = self
            .cache
            .get_or_build_for(fingerprint, document.len() as u64, build)
            .await?;

        let stages: &[PipelineStage] = if outcome.was_cache_hit {
            self.progress.emit(PipelineStage::CacheHit);
            &[PipelineStage::CacheHit]
        } else if outcome.persist_error.is_none() {
            self.progress.emit(PipelineStage::Persisting);
            &[
                PipelineStage::Extracting,
                PipelineStage::Chunking,
                PipelineStage::Embedding,
                PipelineStage::Persisting,
            ]
        } else {
            &[
                PipelineStage::Extracting,
                PipelineStage::Chunking,
                PipelineStage::Embedding,
            ]
        };
        self.progress.emit(PipelineStage::Ready);

        Ok(PreparedDocument {
            fingerprint,
            entry: outcome.entry,
            was_cache_hit: outcome.was_cache_hit,
            steps: stages
                .iter()
                .filter_map(|stage| stage.message())
                .map(String::from)
                .collect(),
            persist_error: outcome.persist_error,
        })
    }

    async fn retrieve_inner(
        &self,
        document: &[u8],
        query: &str,
        top_k: usize,
    ) -> Result<RetrievalOutcome> {
        if top_k == 0 {
            return Err(IndexError::InvalidK.into());
        }
        let prepared = self.prepare_inner(document).await?;

        self.progress.emit(PipelineStage::Searching);
        let results = self.search(&prepared.entry, query, top_k).await?;
        self.progress.emit(PipelineStage::Done);

        Ok(RetrievalOutcome {
            fingerprint: prepared.fingerprint,
            results,
            was_cache_hit: prepared.was_cache_hit,
            steps: prepared.steps,
            persist_error: prepared.persist_error,
        })
    }
}

async fn build_artifacts(
    extractor: &dyn TextExtractor,
    chunker: &dyn Chunker,
    embedder: &dyn EmbeddingProvider,
    progress: &Progress,
    document: &[u8],
) -> Result<Artifacts> {
    progress.emit(PipelineStage::Extracting);
    let text = extractor.extract(document)?;

    progress.emit(PipelineStage::Chunking);
    let chunks = chunker.chunk(&text);
    debug!("Split {} chars into {} chunks", text.len(), chunks.len());

    progress.emit(PipelineStage::Embedding);
    let embedded = embedder.embed_texts(&chunks).await?;
    if embedded.len() != chunks.len() {
        return Err(IndexError::LengthMismatch {
            chunks: chunks.len(),
            vectors: embedded.len(),
        }
        .into());
    }

    progress.emit(PipelineStage::IndexBuilding);
    let index = VectorIndex::build(embedded.embeddings)?;
    Ok(Artifacts { chunks, index })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_messages() {
        let messages: Vec<_> = [
            PipelineStage::Fingerprinting,
            PipelineStage::CacheLookup,
            PipelineStage::Extracting,
            PipelineStage::Chunking,
            PipelineStage::Embedding,
            PipelineStage::IndexBuilding,
            PipelineStage::Persisting,
            PipelineStage::Ready,
            PipelineStage::Searching,
            PipelineStage::Done,
        ]
        .into_iter()
        .filter_map(PipelineStage::message)
        .collect();

        assert_eq!(
            messages,
            vec![
                "Extracting text...",
                "Chunking text...",
                "Creating embeddings and index...",
                "Saved to cache.",
                "Querying...",
                "Done.",
            ]
        );
        assert_eq!(PipelineStage::CacheHit.message(), Some("Loaded from cache."));
        assert_eq!(PipelineStage::Failed.message(), None);
    }

    #[test]
    fn test_progress_without_listener() {
        let (tx, rx) = flume::unbounded();
        drop(rx);
        let progress = Progress { sender: Some(tx) };
        // Sending into a closed channel is not an error for the pipeline.
        progress.emit(PipelineStage::Done);
        Progress::default().emit(PipelineStage::Done);
    }
}
