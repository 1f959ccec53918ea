//! Word-window chunking with overlap.

use crate::Chunker;
use crate::config::ChunkConfigError;

/// Default window size in words.
pub const DEFAULT_WINDOW: usize = 150;
/// Default overlap between consecutive windows in words.
pub const DEFAULT_OVERLAP: usize = 30;

/// Splits text into windows of `window` whitespace-delimited words, each starting
/// `window - overlap` words after the previous one.
///
/// Windows are re-joined with single spaces, so the original whitespace layout is
/// not preserved. Text of at most `window` words is a single chunk; longer text gets a
/// window at every multiple of the step, so trailing windows may be short and may
/// overlap their predecessor entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowChunker {
    window: usize,
    overlap: usize,
}

impl SlidingWindowChunker {
    /// Create a chunker, validating `window > 0` and `overlap < window`.
    pub fn new(window: usize, overlap: usize) -> Result<Self, ChunkConfigError> {
        if window == 0 {
            return Err(ChunkConfigError::ZeroWindow);
        }
        if overlap >= window {
            return Err(ChunkConfigError::OverlapTooLarge { window, overlap });
        }
        Ok(Self { window, overlap })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of words between the starts of consecutive windows
    pub fn step(&self) -> usize {
        self.window - self.overlap
    }
}

impl Default for SlidingWindowChunker {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }
        if tokens.len() <= self.window {
            return vec![tokens.join(" ")];
        }

        // Every start below the token count opens a window, even when an earlier
        // window already reached the last token.
        (0..tokens.len())
            .step_by(self.step())
            .map(|start| {
                let end = (start + self.window).min(tokens.len());
                tokens[start..end].join(" ")
            })
            .collect()
    }

    fn describe(&self) -> String {
        format!(
            "sliding_window(window={},overlap={})",
            self.window, self.overlap
        )
    }
}
