//! Inverted-file candidate selection and exact re-ranking.
//!
//! Full exact search is O(corpus) per query. The index instead narrows each
//! query to the members of a handful of nearest clusters, then ranks only
//! those candidates by exact cosine similarity. The approximation can miss a
//! true nearest neighbor whose cluster is not among the candidates; that
//! recall loss is the accepted price of bounding the candidate set.

use serde::Serialize;
use thiserror::Error;

use crate::vector::distance::{cosine_similarity_unchecked, squared_euclidean_unchecked};
use crate::vector::types::{ClusterId, Similarity, TopicId, VectorError};

/// Default number of nearest clusters searched per query.
pub const DEFAULT_CANDIDATE_CLUSTERS: usize = 3;

/// Default similarity floor for returned results.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// One similarity search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityResult {
    /// The matching topic.
    pub id: TopicId,

    /// Exact cosine similarity to the query, always above the threshold.
    pub similarity: Similarity,
}

/// Tuning parameters for one similarity search.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    /// Maximum number of results to return.
    pub limit: usize,

    /// Number of nearest clusters to draw candidates from.
    pub candidate_clusters: usize,

    /// Results at or below this cosine similarity are discarded.
    pub similarity_threshold: f32,
}

impl SearchParams {
    /// Creates parameters returning up to `limit` results with defaults.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            candidate_clusters: DEFAULT_CANDIDATE_CLUSTERS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Errors that can occur during similarity search.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error(
        "No embedding found for topic {0}\nSuggestion: Generate an embedding for the topic before searching"
    )]
    NotFound(TopicId),

    #[error(
        "No similarity index exists yet\nSuggestion: Run a full clustering pass to build the index"
    )]
    NoIndex,

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Centroid storage error: {0}")]
    Storage(#[from] crate::vector::storage::CentroidStoreError),
}

/// Selects the `count` clusters whose centroids are nearest the query.
///
/// Squared Euclidean distance is sufficient for this coarse choice. Ties
/// break toward the lower cluster id so repeated queries are deterministic.
#[must_use]
pub fn nearest_clusters(query: &[f32], centroids: &[Vec<f32>], count: usize) -> Vec<ClusterId> {
    let mut ranked: Vec<(f32, ClusterId)> = centroids
        .iter()
        .enumerate()
        .map(|(i, centroid)| {
            (
                squared_euclidean_unchecked(query, centroid),
                ClusterId::new(i as u32),
            )
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
    });
    ranked.truncate(count);
    ranked.into_iter().map(|(_, id)| id).collect()
}

/// Ranks candidates by exact cosine similarity against the query.
///
/// Discards candidates at or below the threshold, sorts the survivors
/// descending by similarity (ties toward the lower topic id), and returns
/// the first `limit`.
#[must_use]
pub fn rank_candidates(
    query: &[f32],
    candidates: &[(TopicId, Vec<f32>)],
    params: &SearchParams,
) -> Vec<SimilarityResult> {
    let mut results: Vec<SimilarityResult> = candidates
        .iter()
        .filter(|(_, vector)| vector.len() == query.len())
        .filter_map(|(id, vector)| {
            let similarity = cosine_similarity_unchecked(query, vector);
            if similarity > params.similarity_threshold {
                Some(SimilarityResult {
                    id: *id,
                    similarity: Similarity::saturating(similarity),
                })
            } else {
                None
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .cmp(&a.similarity)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.truncate(params.limit);
    results
}
