//! Sentence boundary detection used by the section-aware chunker.
//!
//! The chunker only depends on the [`SentenceSplitter`] trait, so an NLP-backed
//! splitter can be injected in place of the rule-based default.

use regex::Regex;
use std::sync::LazyLock;

/// Blank lines always end a sentence.
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n").expect("paragraph break pattern is valid"));

/// Common abbreviations that end with a period without ending the sentence.
pub const DEFAULT_ABBREVIATIONS: &[&str] = &[
    "e.g", "i.e", "etc", "vs", "cf", "mr", "mrs", "ms", "dr", "prof", "st", "no", "nos", "art",
    "sec", "para", "fig", "approx", "incl", "inc", "ltd", "co", "corp", "dept", "jan", "feb",
    "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
];

const TERMINATORS: &[char] = &['.', '!', '?'];
const CLOSERS: &[char] = &['"', '\'', ')', ']', '\u{201d}', '\u{2019}'];

/// Splits text into sentences in reading order.
pub trait SentenceSplitter: Send + Sync {
    /// Return the sentences of `text`, trimmed, with empty sentences omitted
    fn split_sentences(&self, text: &str) -> Vec<String>;
}

/// Punctuation-driven splitter.
///
/// A sentence ends at `.`, `!` or `?` (plus any trailing quotes or brackets) when
/// followed by whitespace or the end of the text, unless the period closes a known
/// abbreviation or a single-letter initial. Blank lines are hard boundaries.
#[derive(Debug, Clone)]
pub struct RuleBasedSentenceSplitter {
    abbreviations: Vec<String>,
}

impl Default for RuleBasedSentenceSplitter {
    fn default() -> Self {
        Self {
            abbreviations: DEFAULT_ABBREVIATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RuleBasedSentenceSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an abbreviation (without its final period, case-insensitive)
    pub fn with_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.abbreviations
            .push(abbreviation.into().trim_end_matches('.').to_lowercase());
        self
    }

    fn is_abbreviation(&self, before_period: &str) -> bool {
        let word = before_period
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or_default()
            .trim_start_matches(['(', '[', '"', '\'']);

        let mut chars = word.chars();
        if let (Some(only), None) = (chars.next(), chars.next()) {
            return only.is_alphabetic();
        }

        let lowered = word.to_lowercase();
        self.abbreviations.iter().any(|a| *a == lowered)
    }

    fn split_paragraph(&self, paragraph: &str, sentences: &mut Vec<String>) {
        let mut start = 0;
        let mut chars = paragraph.char_indices().peekable();

        while let Some((idx, ch)) = chars.next() {
            if !TERMINATORS.contains(&ch) {
                continue;
            }

            let mut end = idx + ch.len_utf8();
            while let Some(&(next_idx, next)) = chars.peek() {
                if TERMINATORS.contains(&next) || CLOSERS.contains(&next) {
                    end = next_idx + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }

            let at_boundary = match chars.peek() {
                None => true,
                Some(&(_, next)) => next.is_whitespace(),
            };
            if !at_boundary || (ch == '.' && self.is_abbreviation(&paragraph[start..idx])) {
                continue;
            }

            push_trimmed(&paragraph[start..end], sentences);
            start = end;
        }

        push_trimmed(&paragraph[start..], sentences);
    }
}

fn push_trimmed(candidate: &str, sentences: &mut Vec<String>) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

impl SentenceSplitter for RuleBasedSentenceSplitter {
    fn split_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        for paragraph in PARAGRAPH_BREAK.split(text) {
            self.split_paragraph(paragraph, &mut sentences);
        }
        sentences
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<String> {
        RuleBasedSentenceSplitter::default().split_sentences(text)
    }

    #[test]
    fn test_basic_sentences() {
        assert_eq!(
            split("The scope is broad. It covers vendors! Does it cover staff?"),
            vec![
                "The scope is broad.",
                "It covers vendors!",
                "Does it cover staff?"
            ]
        );
    }

    #[test]
    fn test_abbreviations_and_initials() {
        assert_eq!(
            split("Controls apply to e.g. payroll and vendors. Signed by J. Smith on Jan. 4. Done."),
            vec![
                "Controls apply to e.g. payroll and vendors.",
                "Signed by J. Smith on Jan. 4.",
                "Done."
            ]
        );
    }

    #[test]
    fn test_numbers_and_closers() {
        assert_eq!(
            split("Refer to clause 3.2 for details. He said \"stop.\" Then left."),
            vec![
                "Refer to clause 3.2 for details.",
                "He said \"stop.\"",
                "Then left."
            ]
        );
    }

    #[test]
    fn test_paragraph_breaks_and_trailing_text() {
        assert_eq!(
            split("First paragraph without a period\n\nSecond one. Tail"),
            vec!["First paragraph without a period", "Second one.", "Tail"]
        );
    }

    #[test]
    fn test_custom_abbreviation() {
        let splitter = RuleBasedSentenceSplitter::new().with_abbreviation("Reg.");
        assert_eq!(
            splitter.split_sentences("See Reg. 12 first. Then proceed."),
            vec!["See Reg. 12 first.", "Then proceed."]
        );
    }

    #[test]
    fn test_empty() {
        assert!(split("").is_empty());
        assert!(split("   \n\n  ").is_empty());
    }
}
