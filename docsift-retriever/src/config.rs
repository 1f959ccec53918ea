//! Configuration for the docsift pipeline and CLI.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file at all)
//! is a valid configuration:
//!
//! ```toml
//! cache_dir = ".docsift"
//! max_entries = 200
//! top_k = 5
//!
//! [chunking]
//! strategy = "sections"
//! max_section_chars = 1500
//! max_subchunk_chars = 1000
//!
//! [embedding]
//! model_name = "all-MiniLM-L6-v2"
//! batch_size = 16
//! ```

use docsift_chunk::{ChunkingConfig, RuleBasedSentenceSplitter};
use docsift_embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "docsift.toml";

pub const DEFAULT_CACHE_DIR: &str = ".docsift";

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsiftConfig {
    /// Directory holding the cache database
    pub cache_dir: PathBuf,
    /// Keep at most this many documents, evicting the least recently used
    pub max_entries: Option<usize>,
    /// Number of chunks returned by a query
    pub top_k: usize,
    /// Shorthand for `embedding.batch_size`; wins when both are set
    pub embed_batch_size: Option<usize>,
    pub chunking: ChunkingConfig,
    pub embedding: EmbedConfig,
}

impl Default for DocsiftConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_entries: None,
            top_k: DEFAULT_TOP_K,
            embed_batch_size: None,
            chunking: ChunkingConfig::default(),
            embedding: EmbedConfig::default(),
        }
    }
}

impl DocsiftConfig {
    /// Load `path` if given, else `docsift.toml` in the working directory if it
    /// exists, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)?
                } else {
                    tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn with_cache_dir(self, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..self
        }
    }

    pub fn with_max_entries(self, max_entries: Option<usize>) -> Self {
        Self {
            max_entries,
            ..self
        }
    }

    pub fn with_top_k(self, top_k: usize) -> Self {
        Self { top_k, ..self }
    }

    pub fn with_chunking(self, chunking: ChunkingConfig) -> Self {
        Self { chunking, ..self }
    }

    pub fn with_embedding(self, embedding: EmbedConfig) -> Self {
        Self { embedding, ..self }
    }

    /// The embedding settings with the top-level batch size applied.
    pub fn embed_config(&self) -> EmbedConfig {
        match self.embed_batch_size {
            Some(batch_size) => self.embedding.clone().with_batch_size(batch_size),
            None => self.embedding.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::Invalid { message };
        if self.top_k == 0 {
            return Err(invalid("top_k must be positive".into()));
        }
        if self.max_entries == Some(0) {
            return Err(invalid("max_entries must be positive when set".into()));
        }
        self.chunking
            .build(Arc::new(RuleBasedSentenceSplitter::default()))
            .map_err(|e| invalid(e.to_string()))?;
        self.embed_config()
            .validate()
            .map_err(|e| invalid(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DocsiftConfig::default();
        assert_eq!(config.cache_dir, PathBuf::from(".docsift"));
        assert_eq!(config.top_k, 5);
        assert_eq!(config.max_entries, None);
        assert_eq!(config.chunking, ChunkingConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docsift.toml");
        std::fs::write(
            &path,
            r#"
cache_dir = "/tmp/docsift-cache"
max_entries = 10
top_k = 3
embed_batch_size = 4

[chunking]
strategy = "sections"
max_subchunk_chars = 800

[embedding]
model_name = "bge-small-en-v1.5"
batch_size = 32
"#,
        )
        .unwrap();

        let config = DocsiftConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/docsift-cache"));
        assert_eq!(config.max_entries, Some(10));
        assert_eq!(config.top_k, 3);
        assert_eq!(
            config.chunking,
            ChunkingConfig::Sections {
                max_section_chars: 1500,
                max_subchunk_chars: 800
            }
        );
        assert_eq!(config.embedding.model_name, "bge-small-en-v1.5");
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.embed_config().batch_size, 4);
    }

    #[test]
    fn test_invalid_values() {
        assert!(DocsiftConfig::default().with_top_k(0).validate().is_err());
        assert!(
            DocsiftConfig::default()
                .with_max_entries(Some(0))
                .validate()
                .is_err()
        );
        let bad_window = DocsiftConfig::default().with_chunking(ChunkingConfig::SlidingWindow {
            window: 10,
            overlap: 10,
        });
        assert!(matches!(
            bad_window.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DocsiftConfig::load(Some(&dir.path().join("absent.toml"))),
            Err(ConfigError::Read { .. })
        ));

        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "top_k = \"five\"").unwrap();
        assert!(matches!(
            DocsiftConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }
}
