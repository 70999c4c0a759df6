//! Distance and similarity metrics over embedding vectors.
//!
//! Cosine similarity is the relevance metric throughout the engine because it
//! is scale-invariant; squared Euclidean distance exists only as a cheap
//! pre-filter for coarse bucket selection and is never a final score.
//!
//! The public functions enforce the dimension contract with typed errors. The
//! crate-internal `*_unchecked` variants skip the check for hot loops where
//! dimensions were validated at the boundary.

use crate::vector::types::VectorError;

/// Computes cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] barring floating-point noise. If either vector
/// has zero magnitude the result is 0.0 by convention, not an error.
///
/// # Errors
/// Returns `DimensionMismatch` if the vectors differ in length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(cosine_similarity_unchecked(a, b))
}

/// Computes squared Euclidean distance between two vectors.
///
/// Cheaper than cosine similarity (no square roots or normalization) and
/// monotone in true Euclidean distance, which is all a coarse nearest-bucket
/// decision needs.
///
/// # Errors
/// Returns `DimensionMismatch` if the vectors differ in length.
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(squared_euclidean_unchecked(a, b))
}

pub(crate) fn cosine_similarity_unchecked(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

pub(crate) fn squared_euclidean_unchecked(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        // Identical vectors
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < f32::EPSILON);

        // Orthogonal vectors
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 0.0).abs() < f32::EPSILON);

        // Opposite vectors
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, -2.0, -3.0];
        assert!((cosine_similarity(&a, &b).unwrap() - (-1.0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cosine_zero_magnitude_convention() {
        let a = vec![1.0, 2.0, 3.0];
        let zero = vec![0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &zero).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&zero, &a).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_is_symmetric() {
        let a = vec![0.3, -0.7, 0.2, 1.1];
        let b = vec![-0.4, 0.9, 0.5, 0.1];
        assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            cosine_similarity(&a, &b),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_squared_euclidean() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert_eq!(squared_euclidean(&a, &b).unwrap(), 25.0);

        assert_eq!(squared_euclidean(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn test_squared_euclidean_dimension_mismatch() {
        let a = vec![1.0];
        let b = vec![1.0, 2.0];
        assert!(matches!(
            squared_euclidean(&a, &b),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }
}
