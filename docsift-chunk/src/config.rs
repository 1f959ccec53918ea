//! Serializable chunking configuration.

use crate::Chunker;
use crate::section::{DEFAULT_MAX_SECTION_CHARS, DEFAULT_MAX_SUBCHUNK_CHARS, SectionChunker};
use crate::sentence::SentenceSplitter;
use crate::window::{DEFAULT_OVERLAP, DEFAULT_WINDOW, SlidingWindowChunker};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Invalid chunker parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkConfigError {
    #[error("window must contain at least one word")]
    ZeroWindow,

    #[error("overlap ({overlap}) must be smaller than window ({window})")]
    OverlapTooLarge { window: usize, overlap: usize },

    #[error(
        "section limits must be positive (max_section_chars={max_section_chars}, max_subchunk_chars={max_subchunk_chars})"
    )]
    InvalidSectionLimits {
        max_section_chars: usize,
        max_subchunk_chars: usize,
    },
}

/// Which chunking strategy to use and its parameters.
///
/// In TOML this is a table tagged by `strategy`:
///
/// ```toml
/// [chunking]
/// strategy = "sliding_window"
/// window = 150
/// overlap = 30
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ChunkingConfig {
    SlidingWindow {
        #[serde(default = "default_window")]
        window: usize,
        #[serde(default = "default_overlap")]
        overlap: usize,
    },
    Sections {
        #[serde(default = "default_max_section_chars")]
        max_section_chars: usize,
        #[serde(default = "default_max_subchunk_chars")]
        max_subchunk_chars: usize,
    },
}

fn default_window() -> usize {
    DEFAULT_WINDOW
}

fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}

fn default_max_section_chars() -> usize {
    DEFAULT_MAX_SECTION_CHARS
}

fn default_max_subchunk_chars() -> usize {
    DEFAULT_MAX_SUBCHUNK_CHARS
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::SlidingWindow {
            window: DEFAULT_WINDOW,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// Section-aware strategy with default limits
    pub fn sections() -> Self {
        Self::Sections {
            max_section_chars: DEFAULT_MAX_SECTION_CHARS,
            max_subchunk_chars: DEFAULT_MAX_SUBCHUNK_CHARS,
        }
    }

    /// Construct the configured chunker.
    ///
    /// `splitter` is only used by the section-aware strategy.
    pub fn build(
        &self,
        splitter: Arc<dyn SentenceSplitter>,
    ) -> Result<Arc<dyn Chunker>, ChunkConfigError> {
        match *self {
            Self::SlidingWindow { window, overlap } => {
                Ok(Arc::new(SlidingWindowChunker::new(window, overlap)?))
            }
            Self::Sections {
                max_section_chars,
                max_subchunk_chars,
            } => Ok(Arc::new(
                SectionChunker::new(splitter).with_limits(max_section_chars, max_subchunk_chars)?,
            )),
        }
    }
}
