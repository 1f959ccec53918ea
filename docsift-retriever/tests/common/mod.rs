//! Shared helpers for the docsift-retriever integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use docsift_embed::{EmbedError, EmbeddingProvider, EmbeddingResult, l2_normalize};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DIMENSION: usize = 64;

/// Deterministic bag-of-words embedder: every word is hashed into one of
/// [`DIMENSION`] buckets, so texts sharing words land close together.
#[derive(Default)]
pub struct HashEmbedder {
    batch_calls: AtomicUsize,
    embedded_texts: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed_texts` calls so far (query embeddings are not counted).
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn embedded_texts(&self) -> usize {
        self.embedded_texts.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSION];
        // Keeps empty text embeddable.
        vector[0] = 1e-3;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = blake3::hash(word.to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let bucket = bytes[0] as usize % DIMENSION;
            let sign = if bytes[1] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_text(&self, text: &str) -> docsift_embed::Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> docsift_embed::Result<EmbeddingResult> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| Self::vector(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        DIMENSION
    }

    fn provider_name(&self) -> &str {
        "hash"
    }

    fn model_id(&self) -> String {
        format!("hash:{DIMENSION}")
    }
}

/// Embedder whose model is always unavailable.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed_text(&self, _text: &str) -> docsift_embed::Result<Vec<f32>> {
        Err(EmbedError::invalid_config("model unavailable"))
    }

    async fn embed_texts(&self, _texts: &[String]) -> docsift_embed::Result<EmbeddingResult> {
        Err(EmbedError::invalid_config("model unavailable"))
    }

    fn embedding_dimension(&self) -> usize {
        DIMENSION
    }

    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model_id(&self) -> String {
        "failing".to_string()
    }
}

/// A numbered-section document of roughly `words_per_section * sections` words.
pub fn policy_document(sections: usize, words_per_section: usize) -> String {
    let topics = [
        ("Scope", "scope applies covers vendors contractors employees"),
        ("Definitions", "definitions term means refers defined glossary"),
        ("Retention", "retention records kept years archive storage"),
        ("Enforcement", "enforcement violations penalties audit review"),
    ];
    let mut text = String::new();
    for s in 0..sections {
        let (title, vocabulary) = topics[s % topics.len()];
        text.push_str(&format!("{}.1 {}\n", s + 1, title));
        let words: Vec<&str> = vocabulary.split(' ').collect();
        let body: Vec<&str> = (0..words_per_section)
            .map(|i| words[i % words.len()])
            .collect();
        for line in body.chunks(15) {
            text.push_str(&line.join(" "));
            text.push_str(".\n");
        }
    }
    text
}
