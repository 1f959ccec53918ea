//! Error taxonomy for the retrieval pipeline.
//!
//! Every failure surfaced by the pipeline is a [`RetrievalError`]. Callers that need a
//! stable, serializable shape (CLI JSON output, an HTTP layer) convert it into a
//! [`FailureReport`] carrying an [`ErrorKind`] and a message.

use crate::extract::ExtractionError;
use crate::fingerprint::FingerprintError;
use crate::index::IndexError;
use crate::storage::CacheError;
use docsift_chunk::ChunkConfigError;
use docsift_embed::EmbedError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("fingerprinting failed: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("cache I/O failed: {0}")]
    CacheIo(#[from] CacheError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("invalid chunker configuration: {0}")]
    ChunkConfig(#[from] ChunkConfigError),
}

/// Category of a [`RetrievalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Fingerprint,
    Extraction,
    Embedding,
    CacheIo,
    Index,
    /// The caller supplied parameters outside their contract.
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fingerprint => "FingerprintError",
            Self::Extraction => "ExtractionError",
            Self::Embedding => "EmbeddingError",
            Self::CacheIo => "CacheIOError",
            Self::Index => "IndexError",
            Self::InvalidInput => "InvalidInput",
        };
        f.write_str(name)
    }
}

impl RetrievalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fingerprint(_) => ErrorKind::Fingerprint,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::CacheIo(_) => ErrorKind::CacheIo,
            Self::Index(_) => ErrorKind::Index,
            Self::ChunkConfig(_) => ErrorKind::InvalidInput,
        }
    }

    pub fn report(&self) -> FailureReport {
        FailureReport::from(self)
    }
}

/// Structured failure result: what went wrong and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RetrievalError> for FailureReport {
    fn from(error: &RetrievalError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<RetrievalError> for FailureReport {
    fn from(error: RetrievalError) -> Self {
        Self::from(&error)
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
