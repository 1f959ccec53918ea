//! Text extraction from raw document bytes.
//!
//! The retrieval pipeline only needs `bytes -> text`. Plain-text documents are handled
//! by [`Utf8Extractor`]; richer formats plug in through [`TextExtractor`].

/// Failure turning a document into text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("document is not valid UTF-8 (first invalid byte at offset {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    #[error("{extractor} could not extract text: {message}")]
    Failed { extractor: String, message: String },
}

/// Converts a document's bytes into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, document: &[u8]) -> Result<String, ExtractionError>;

    /// Short name used in logs and error messages.
    fn name(&self) -> &str;
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decodes UTF-8 documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Utf8Extractor {
    strip_bom: bool,
    normalize_newlines: bool,
}

impl Default for Utf8Extractor {
    fn default() -> Self {
        Self {
            strip_bom: true,
            normalize_newlines: true,
        }
    }
}

impl Utf8Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strip_bom(self, strip_bom: bool) -> Self {
        Self { strip_bom, ..self }
    }

    /// Convert `\r\n` line endings to `\n` (builder style)
    pub fn with_normalize_newlines(self, normalize_newlines: bool) -> Self {
        Self {
            normalize_newlines,
            ..self
        }
    }
}

impl TextExtractor for Utf8Extractor {
    fn extract(&self, document: &[u8]) -> Result<String, ExtractionError> {
        let bytes = match document.strip_prefix(UTF8_BOM) {
            Some(rest) if self.strip_bom => rest,
            _ => document,
        };
        let text = std::str::from_utf8(bytes).map_err(|e| ExtractionError::InvalidUtf8 {
            valid_up_to: e.valid_up_to(),
        })?;
        if self.normalize_newlines && text.contains('\r') {
            Ok(text.replace("\r\n", "\n"))
        } else {
            Ok(text.to_string())
        }
    }

    fn name(&self) -> &str {
        "utf8"
    }
}
