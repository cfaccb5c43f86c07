//! Vector Index.
//!
//! Similarity search over the embeddings of a memory store. The store only
//! talks to the [`VectorIndex`] trait, so an approximate index can replace the
//! exhaustive [`LinearIndex`] without touching any caller.
//!
//! # Example
//!
//! ```rust
//! use mnemo_memory::index::{LinearIndex, VectorIndex};
//! use mnemo_types::MemoryId;
//!
//! let mut index = LinearIndex::new();
//! index.insert(&MemoryId::from("a"), &[1.0, 0.0]).unwrap();
//! index.insert(&MemoryId::from("b"), &[0.0, 1.0]).unwrap();
//!
//! let scores = index.score_all(&[1.0, 0.0]).unwrap();
//! assert!((scores[&MemoryId::from("a")] - 1.0).abs() < 1e-6);
//! assert!(scores[&MemoryId::from("b")].abs() < 1e-6);
//! ```

use std::collections::HashMap;

use mnemo_types::MemoryId;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from vector index operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Embedding dimension mismatch: index holds {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },
}

// ─────────────────────────────────────────────────────────────────────────────
// Cosine similarity
// ─────────────────────────────────────────────────────────────────────────────

/// Compute the cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    cosine_with_norms(a, norm_a, b, norm_b)
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

// ─────────────────────────────────────────────────────────────────────────────
// VectorIndex
// ─────────────────────────────────────────────────────────────────────────────

/// Similarity search over a set of id-tagged embeddings.
///
/// The first non-empty embedding inserted fixes the index dimension; every
/// later insert and every query must match it.
pub trait VectorIndex: Send {
    /// Dimension of stored vectors, or `None` while nothing has been indexed.
    fn dimension(&self) -> Option<usize>;

    /// Index `embedding` under `id`, replacing any previous vector for that id.
    ///
    /// An empty embedding is accepted and ignored: the entry simply stays
    /// unsearchable.
    fn insert(&mut self, id: &MemoryId, embedding: &[f32]) -> Result<(), IndexError>;

    /// Drop `id` from the index. Returns `false` if it was not indexed.
    fn remove(&mut self, id: &MemoryId) -> bool;

    /// Cosine similarity of `query` against every indexed vector.
    ///
    /// Returns an empty map when nothing is indexed.
    fn score_all(&self, query: &[f32]) -> Result<HashMap<MemoryId, f32>, IndexError>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LinearIndex
// ─────────────────────────────────────────────────────────────────────────────

/// Exhaustive-scan index. Norms are cached at insert time so each query costs
/// one dot product per stored vector.
#[derive(Debug, Default)]
pub struct LinearIndex {
    dimension: Option<usize>,
    vectors: HashMap<MemoryId, (Vec<f32>, f32)>,
}

impl LinearIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_dimension(&self, actual: usize) -> Result<(), IndexError> {
        match self.dimension {
            Some(expected) if expected != actual => {
                Err(IndexError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

impl VectorIndex for LinearIndex {
    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn insert(&mut self, id: &MemoryId, embedding: &[f32]) -> Result<(), IndexError> {
        if embedding.is_empty() {
            return Ok(());
        }
        self.check_dimension(embedding.len())?;
        self.dimension.get_or_insert(embedding.len());
        let norm = l2_norm(embedding);
        self.vectors.insert(id.clone(), (embedding.to_vec(), norm));
        Ok(())
    }

    fn remove(&mut self, id: &MemoryId) -> bool {
        self.vectors.remove(id).is_some()
    }

    fn score_all(&self, query: &[f32]) -> Result<HashMap<MemoryId, f32>, IndexError> {
        if self.vectors.is_empty() {
            return Ok(HashMap::new());
        }
        self.check_dimension(query.len())?;
        let query_norm = l2_norm(query);
        Ok(self
            .vectors
            .iter()
            .map(|(id, (v, norm))| (id.clone(), cosine_with_norms(query, query_norm, v, *norm)))
            .collect())
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
