//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

/// Result of embedding generation
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a new embedding result.
    ///
    /// The dimension is inferred from the first vector and is 0 for an empty result.
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Scale `vector` to unit L2 length in place and return its original norm.
///
/// Zero and non-finite vectors are left untouched; the returned norm lets callers
/// detect them.
pub fn l2_normalize(vector: &mut [f32]) -> f32 {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
    norm
}

/// Check that a model returned `expected` finite vectors of `dimension` values.
pub fn validate_output(embeddings: &[Vec<f32>], expected: usize, dimension: usize) -> Result<()> {
    if embeddings.len() != expected {
        return Err(EmbedError::malformed(format!(
            "expected {expected} embeddings, got {}",
            embeddings.len()
        )));
    }
    for (i, embedding) in embeddings.iter().enumerate() {
        if embedding.len() != dimension {
            return Err(EmbedError::malformed(format!(
                "embedding {i} has dimension {}, expected {dimension}",
                embedding.len()
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(EmbedError::malformed(format!(
                "embedding {i} contains non-finite values"
            )));
        }
    }
    Ok(())
}

/// Trait for embedding providers that can generate embeddings from text
///
/// Implementations must be deterministic for identical input under a fixed model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Identifier of the model and settings; vectors are only comparable within one id
    fn model_id(&self) -> String;
}

/// FastEmbed-based embedding provider using local ONNX models.
///
/// Loading the model is the expensive step and happens once in [`create`](Self::create);
/// clones share the loaded model.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Downloads (if needed) and loads the configured model.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let model_kind = config.fastembed_model()?;

        tracing::info!("Initializing FastEmbed provider for model: {}", config.model_name());
        tokio::fs::create_dir_all(&config.model_cache_dir).await?;

        let load_config = config.clone();
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let init_options = InitOptions::new(model_kind)
                    .with_cache_dir(load_config.model_cache_dir.clone())
                    .with_show_download_progress(load_config.show_download_progress);

                let mut model = TextEmbedding::try_new(init_options)
                    .map_err(|e| EmbedError::ModelInitialization { source: e.into() })?;

                // Probe the output dimension with a throwaway embedding.
                let probe = model
                    .embed(vec!["dimension probe".to_string()], None)
                    .map_err(|e| EmbedError::External { source: e })?;
                let dimension = probe.first().map(|emb| emb.len()).unwrap_or(0);
                if dimension == 0 {
                    return Err(EmbedError::malformed("model produced an empty probe embedding"));
                }

                tracing::info!(
                    "Model {} loaded successfully. Dimension: {}",
                    load_config.model_name(),
                    dimension
                );
                Ok((model, dimension))
            })
            .await??;

        Ok(Self {
            config,
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::malformed("No embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let batch_len = batch.len();
            let model = Arc::clone(&self.model);

            let mut embeddings = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model_guard = model.lock().map_err(|_| EmbedError::LockPoisoned)?;
                model_guard
                    .embed(batch, None)
                    .map_err(|e| EmbedError::EmbeddingGeneration { source: e.into() })
            })
            .await??;

            validate_output(&embeddings, batch_len, self.dimension)?;
            if self.config.normalize {
                for embedding in &mut embeddings {
                    l2_normalize(embedding);
                }
            }
            all_embeddings.extend(embeddings);
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_id(&self) -> String {
        self.config.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_result() {
        let embeddings = vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]];
        let result = EmbeddingResult::new(embeddings);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());
        assert_eq!(EmbeddingResult::new(vec![]).dimension, 0);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        let norm = l2_normalize(&mut v);
        assert!((norm - 5.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let unit: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((unit - 1.0).abs() < 1e-5);

        let mut zero = vec![0.0, 0.0];
        assert_eq!(l2_normalize(&mut zero), 0.0);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_validate_output() {
        let good = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        assert!(validate_output(&good, 2, 2).is_ok());
        assert!(validate_output(&good, 3, 2).is_err());
        assert!(validate_output(&good, 2, 3).is_err());

        let nan = vec![vec![f32::NAN, 1.0]];
        assert!(matches!(
            validate_output(&nan, 1, 2),
            Err(EmbedError::MalformedOutput { .. })
        ));
    }

    #[tokio::test]
    #[ignore] // Downloads the all-MiniLM-L6-v2 model - run with: cargo test -p docsift-embed -- --ignored
    async fn test_minilm_download_and_embedding() -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();

        let temp_dir = tempfile::tempdir()?;
        let config = EmbedConfig::default().with_model_cache_dir(temp_dir.path());
        let provider = FastEmbedProvider::create(config).await?;

        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.embedding_dimension(), 384);

        let texts = vec![
            "The policy applies to all vendors.".to_string(),
            "Vendors are covered by this policy.".to_string(),
            "The cafeteria opens at noon.".to_string(),
        ];
        let result = provider.embed_texts(&texts).await?;
        assert_eq!(result.len(), 3);
        assert_eq!(result.dimension, 384);

        for embedding in &result.embeddings {
            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        let related = dot(&result.embeddings[0], &result.embeddings[1]);
        let unrelated = dot(&result.embeddings[0], &result.embeddings[2]);
        assert!(related > unrelated, "{related} <= {unrelated}");

        // Deterministic for identical input.
        let again = provider.embed_text(&texts[0]).await?;
        for (a, b) in again.iter().zip(&result.embeddings[0]) {
            assert!((a - b).abs() < 1e-5);
        }

        Ok(())
    }
}
