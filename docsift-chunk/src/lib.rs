//! Chunking strategies that turn extracted document text into retrieval units.
//!
//! Two interchangeable strategies are provided, both pure functions of the input
//! text and their configuration:
//!
//! - [`SlidingWindowChunker`]: fixed word windows with overlap, the general-purpose default.
//! - [`SectionChunker`]: splits numbered documents ("3.2 Scope") into sections and
//!   packs oversized sections sentence by sentence.
//!
//! Both implement [`Chunker`], so callers can hold an `Arc<dyn Chunker>` built from a
//! [`ChunkingConfig`].
//!
//! ```
//! use docsift_chunk::{Chunker, SlidingWindowChunker};
//!
//! let chunker = SlidingWindowChunker::new(4, 1).unwrap();
//! let chunks = chunker.chunk("one two three four five six seven");
//! assert_eq!(chunks, vec!["one two three four", "four five six seven", "seven"]);
//! ```

pub mod config;
pub mod section;
pub mod sentence;
pub mod window;

pub use config::{ChunkConfigError, ChunkingConfig};
pub use section::{SectionChunker, is_section_header, split_sections};
pub use sentence::{RuleBasedSentenceSplitter, SentenceSplitter};
pub use window::SlidingWindowChunker;

/// A chunking strategy.
///
/// Implementations must be deterministic: the same text and configuration always
/// produce the same ordered chunks. Empty input yields an empty vector.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered chunks
    fn chunk(&self, text: &str) -> Vec<String>;

    /// Stable description of the strategy and its parameters
    fn describe(&self) -> String;
}
