//! Exact nearest-neighbor search over L2-normalized vectors.
//!
//! Vectors are kept as one row-major `f32` matrix; row *i* belongs to chunk *i* of the
//! same document. Search is an exhaustive scan ranked by squared Euclidean distance,
//! which for unit vectors is `2 - 2·cos`, so it orders results exactly like cosine
//! similarity.

use docsift_embed::l2_normalize;
use itertools::Itertools;
use serde::Serialize;

/// Invalid input to index construction or search.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndexError {
    #[error("k must be positive")]
    InvalidK,

    #[error("dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector {position} has zero or non-finite length and cannot be normalized")]
    Unnormalizable { position: usize },

    #[error("query vector has zero or non-finite length and cannot be normalized")]
    UnnormalizableQuery,

    #[error("flat matrix of {len} values is not a whole number of {dimension}-dimensional rows")]
    MalformedMatrix { len: usize, dimension: usize },

    #[error("{chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },
}

/// One search hit: the chunk position and its squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Normalize and index `vectors`. All vectors must share one dimension.
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(dimension * vectors.len());
        for (position, mut vector) in vectors.into_iter().enumerate() {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            let norm = l2_normalize(&mut vector);
            if norm == 0.0 || !norm.is_finite() {
                return Err(IndexError::Unnormalizable { position });
            }
            data.extend_from_slice(&vector);
        }
        Ok(Self { dimension, data })
    }

    /// Rebuild an index from a stored row-major matrix of already-normalized rows.
    pub fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        let malformed = IndexError::MalformedMatrix {
            len: data.len(),
            dimension,
        };
        if dimension == 0 {
            return if data.is_empty() {
                Ok(Self::default())
            } else {
                Err(malformed)
            };
        }
        if data.len() % dimension != 0 {
            return Err(malformed);
        }
        Ok(Self { dimension, data })
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The row-major matrix, `len() * dimension()` values.
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on 0; an empty index has no rows anyway.
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// The `min(k, len)` nearest vectors to `query`, closest first.
    ///
    /// Equal distances keep insertion order. Searching an empty index returns nothing
    /// regardless of the query's dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        let norm = l2_normalize(&mut query);
        if norm == 0.0 || !norm.is_finite() {
            return Err(IndexError::UnnormalizableQuery);
        }

        let neighbors = self
            .iter()
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(row, &query),
            })
            .sorted_by(|a, b| a.distance.total_cmp(&b.distance))
            .take(k)
            .collect();
        Ok(neighbors)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
