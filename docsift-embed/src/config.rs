//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model used when nothing else is configured (384-dimensional sentence embeddings).
pub const DEFAULT_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Model names accepted by [`EmbedConfig::fastembed_model`].
pub const SUPPORTED_MODELS: &[&str] = &[
    "all-MiniLM-L6-v2",
    "all-MiniLM-L12-v2",
    "bge-small-en-v1.5",
    "bge-base-en-v1.5",
];

/// Configuration for embedding models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    pub model_name: String,
    /// Directory where downloaded model files are cached
    pub model_cache_dir: PathBuf,
    /// Maximum number of texts sent to the model in one call
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
    /// Show a progress bar while downloading model files
    pub show_download_progress: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_cache_dir: PathBuf::from(".docsift").join("models"),
            batch_size: 16,
            normalize: true,
            show_download_progress: false,
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for the named model with default settings
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Set the batch size for embedding generation (builder style)
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    /// Set whether to normalize embeddings (builder style)
    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    /// Set the model cache directory (builder style)
    pub fn with_model_cache_dir<P: AsRef<Path>>(self, dir: P) -> Self {
        Self {
            model_cache_dir: dir.as_ref().to_path_buf(),
            ..self
        }
    }

    /// Toggle the download progress bar (builder style)
    pub fn with_download_progress(self, show_download_progress: bool) -> Self {
        Self {
            show_download_progress,
            ..self
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Identifier of the model and output settings, e.g. `fastembed:all-MiniLM-L6-v2:norm`.
    ///
    /// Vectors produced under different identifiers are not comparable.
    pub fn model_id(&self) -> String {
        let normalized = if self.normalize { "norm" } else { "raw" };
        format!("fastembed:{}:{}", self.model_name, normalized)
    }

    /// Map the configured model name to the fastembed model enum
    pub fn fastembed_model(&self) -> Result<EmbeddingModel> {
        match self.model_name.as_str() {
            "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
            "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
            "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
            other => Err(EmbedError::invalid_config(format!(
                "Unsupported embedding model '{other}' (supported: {})",
                SUPPORTED_MODELS.join(", ")
            ))),
        }
    }

    /// Check the configuration without loading anything
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be positive"));
        }
        self.fastembed_model()?;
        tracing::debug!("Embedding configuration valid for: {}", self.model_name);
        Ok(())
    }
}
