//! Section-aware chunking for numbered documents (policies, contracts, standards).
//!
//! A section starts at a line such as `3.2 Scope`: one or more digits, a period,
//! one or more digits, then whitespace. Lines are accumulated under the most recent
//! header. Text that appears before the first recognized header is not part of any
//! section and is dropped; callers that need it should use the sliding-window
//! strategy instead.
//!
//! Sections up to `max_section_chars` characters become one chunk verbatim. Longer
//! sections are split into sentences and packed greedily into chunks of at most
//! `max_subchunk_chars` characters (a single sentence longer than that limit still
//! forms its own chunk).

use crate::Chunker;
use crate::config::ChunkConfigError;
use crate::sentence::SentenceSplitter;
use regex::Regex;
use std::sync::{Arc, LazyLock};

static SECTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\s+").expect("section header pattern is valid"));

/// Sections at or below this many characters are kept whole.
pub const DEFAULT_MAX_SECTION_CHARS: usize = 1500;
/// Character budget for chunks packed from an oversized section.
pub const DEFAULT_MAX_SUBCHUNK_CHARS: usize = 1000;

/// Returns true if `line` opens a new numbered section.
pub fn is_section_header(line: &str) -> bool {
    SECTION_HEADER.is_match(line)
}

/// Split `text` into sections, each starting at its header line.
///
/// Lines inside a section are re-joined with `\n`. Lines preceding the first header
/// are dropped.
pub fn split_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Option<String> = None;

    for line in text.split('\n') {
        if is_section_header(line) {
            if let Some(finished) = current.take() {
                sections.push(finished);
            }
            current = Some(line.to_string());
        } else if let Some(section) = current.as_mut() {
            section.push('\n');
            section.push_str(line);
        }
    }

    sections.extend(current);
    sections
}

/// Chunker that keeps numbered sections together when they are small enough.
#[derive(Clone)]
pub struct SectionChunker {
    splitter: Arc<dyn SentenceSplitter>,
    max_section_chars: usize,
    max_subchunk_chars: usize,
}

impl std::fmt::Debug for SectionChunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionChunker")
            .field("max_section_chars", &self.max_section_chars)
            .field("max_subchunk_chars", &self.max_subchunk_chars)
            .finish()
    }
}

impl SectionChunker {
    /// Create a chunker with the default 1500/1000 character limits.
    pub fn new(splitter: Arc<dyn SentenceSplitter>) -> Self {
        Self {
            splitter,
            max_section_chars: DEFAULT_MAX_SECTION_CHARS,
            max_subchunk_chars: DEFAULT_MAX_SUBCHUNK_CHARS,
        }
    }

    /// Override the character limits. Both must be positive.
    pub fn with_limits(
        mut self,
        max_section_chars: usize,
        max_subchunk_chars: usize,
    ) -> Result<Self, ChunkConfigError> {
        if max_section_chars == 0 || max_subchunk_chars == 0 {
            return Err(ChunkConfigError::InvalidSectionLimits {
                max_section_chars,
                max_subchunk_chars,
            });
        }
        self.max_section_chars = max_section_chars;
        self.max_subchunk_chars = max_subchunk_chars;
        Ok(self)
    }

    fn pack_sentences(&self, section: &str, chunks: &mut Vec<String>) {
        let mut buffer = String::new();
        let mut buffer_chars = 0;

        for sentence in self.splitter.split_sentences(section) {
            let sentence_chars = sentence.chars().count();

            if !buffer.is_empty() && buffer_chars + sentence_chars > self.max_subchunk_chars {
                chunks.push(std::mem::take(&mut buffer));
                buffer_chars = 0;
            }

            if !buffer.is_empty() {
                buffer.push(' ');
                buffer_chars += 1;
            }
            buffer.push_str(&sentence);
            buffer_chars += sentence_chars;
        }

        if !buffer.is_empty() {
            chunks.push(buffer);
        }
    }
}

impl Chunker for SectionChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();

        for section in split_sections(text) {
            if section.chars().count() <= self.max_section_chars {
                chunks.push(section);
            } else {
                self.pack_sentences(&section, &mut chunks);
            }
        }

        chunks
    }

    fn describe(&self) -> String {
        format!(
            "sections(max_section_chars={},max_subchunk_chars={})",
            self.max_section_chars, self.max_subchunk_chars
        )
    }
}
