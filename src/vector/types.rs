//! Type-safe wrappers and core types for the embedding index.
//!
//! Newtypes here prevent the id/score/dimension mix-ups that plagued the
//! loosely-typed rows this engine replaced. All comparisons between vectors
//! require a matching [`VectorDimension`], which is fixed per deployment by
//! the embedding model in use.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use thiserror::Error;

/// Default embedding width for the hosted embedding model.
pub const EMBEDDING_DIMENSION_1536: usize = 1536;

/// Type-safe wrapper for topic identifiers.
///
/// Topics are the owners of embeddings. Uses `NonZeroU64` internally so an
/// uninitialized (zero) id can never masquerade as a real topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(NonZeroU64);

impl TopicId {
    /// Creates a new `TopicId` from a non-zero u64.
    ///
    /// Returns `None` if the provided id is zero.
    #[must_use]
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    /// Creates a new `TopicId`, panicking if zero.
    ///
    /// # Panics
    /// Panics if `id` is zero. Use `new()` for fallible construction.
    #[must_use]
    pub fn new_unchecked(id: u64) -> Self {
        Self(NonZeroU64::new(id).expect("TopicId cannot be zero"))
    }

    /// Returns the underlying u64 value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for cluster identifiers.
///
/// Cluster ids are 0-based positions into the active centroid set, so zero is
/// a valid value and a plain u32 is wrapped rather than a NonZero type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(u32);

impl ClusterId {
    /// Creates a new `ClusterId`.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying u32 value.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the id as a centroid-set index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for cosine similarity values.
///
/// Valid values lie in [-1.0, 1.0] and are never NaN, which makes a total
/// ordering safe to expose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Similarity(f32);

impl Similarity {
    /// Creates a new `Similarity` with validation.
    ///
    /// Returns an error if the value is NaN or outside [-1.0, 1.0].
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() {
            return Err(VectorError::InvalidSimilarity {
                value,
                reason: "similarity cannot be NaN",
            });
        }
        if !(-1.0..=1.0).contains(&value) {
            return Err(VectorError::InvalidSimilarity {
                value,
                reason: "similarity must be in range [-1.0, 1.0]",
            });
        }
        Ok(Self(value))
    }

    /// Clamps floating-point noise into range instead of rejecting it.
    ///
    /// Dot products of unit vectors can land a few ULP outside [-1, 1].
    #[must_use]
    pub fn saturating(value: f32) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(-1.0, 1.0))
        }
    }

    /// Returns the underlying f32 value.
    #[must_use]
    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Eq for Similarity {}

impl PartialOrd for Similarity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Similarity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .partial_cmp(&other.0)
            .expect("Similarity values should never be NaN")
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// The dimension is deployment-constant; every embedding, centroid, and query
/// in a deployment must agree on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates the standard 1536-wide dimension used by the default model.
    #[must_use]
    pub const fn dimension_1536() -> Self {
        Self(EMBEDDING_DIMENSION_1536)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid similarity value: {value}\nReason: {reason}")]
    InvalidSimilarity { value: f32, reason: &'static str },

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error(
        "Embedding not found for topic {0}\nSuggestion: Verify the topic has a generated embedding"
    )]
    EmbeddingNotFound(TopicId),

    #[error("Embedding source error: {0}")]
    Source(String),
}
