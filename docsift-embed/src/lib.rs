//! # docsift-embed
//!
//! Text embedding for the docsift retrieval core, with local ONNX models via
//! FastEmbed behind an async provider trait.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docsift_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Loading the model is the expensive, one-time step.
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//!
//! let texts = vec!["What is the scope?".to_string()];
//! let result = provider.embed_texts(&texts).await?;
//! println!("{} embeddings of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Design
//!
//! There is no process-wide model cache: construct a provider once and share it
//! (it is `Clone`, and most callers hold it as `Arc<dyn EmbeddingProvider>`).
//! Embeddings are `f32` and L2-normalized unless [`EmbedConfig::normalize`] is off.
//!
//! - [`config`]: model selection and batching
//! - [`provider`]: the [`EmbeddingProvider`] trait and [`FastEmbedProvider`]
//! - [`error`]: [`EmbedError`] and the crate [`Result`]

pub mod config;
pub mod error;
pub mod provider;

pub use config::{DEFAULT_MODEL_NAME, EmbedConfig, SUPPORTED_MODELS};
pub use error::{EmbedError, Result};
pub use provider::{
    EmbeddingProvider, EmbeddingResult, FastEmbedProvider, l2_normalize, validate_output,
};
