//! K-means clustering over cosine distance for IVF-style indexing.
//!
//! Partitions the full embedding corpus into K clusters whose centroids form
//! the coarse index that similarity search pre-filters against. Uses
//! k-means++ seeding driven by a caller-supplied seed so identical input
//! yields identical assignments, and a wall-clock budget so an oversized
//! corpus yields a usable partial result instead of a timeout failure.
//!
//! # Algorithm Details
//! - Distance metric: cosine distance (1 - cosine similarity)
//! - Initialization: k-means++ weighted by squared cosine distance
//! - Empty clusters: reseeded from the member farthest from its own centroid
//! - Termination: stable assignments, centroid movement below tolerance,
//!   iteration cap, or time budget — whichever comes first

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

use crate::vector::distance::{cosine_similarity_unchecked, squared_euclidean_unchecked};
use crate::vector::types::ClusterId;

/// Default iteration cap for a full clustering run.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default wall-clock budget for a full clustering run.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(30);

/// Default seed for k-means++ initialization.
pub const DEFAULT_SEED: u64 = 42;

/// Smallest corpus that supports clustering at all.
const MIN_CORPUS_SIZE: usize = 4;

/// Floor for the derived cluster count.
const MIN_DERIVED_CLUSTERS: usize = 2;

/// Ceiling for the derived cluster count.
const MAX_DERIVED_CLUSTERS: usize = 100;

/// Convergence tolerance for mean centroid movement between iterations.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Tuning parameters for one clustering run.
#[derive(Debug, Clone)]
pub struct KMeansParams {
    /// Number of clusters to produce.
    pub k: usize,

    /// Iteration cap; the run returns its current state when reached.
    pub max_iterations: usize,

    /// Wall-clock budget; the run returns a partial result when exceeded.
    pub time_budget: Duration,

    /// Seed for k-means++ initialization. Same seed + same input = same output.
    pub seed: u64,
}

impl KMeansParams {
    /// Creates parameters for `k` clusters with default caps and seed.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            time_budget: DEFAULT_TIME_BUDGET,
            seed: DEFAULT_SEED,
        }
    }
}

/// Result of a full clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResult {
    /// Cluster centroids, unit-normalized, one per cluster id in order.
    pub centroids: Vec<Vec<f32>>,

    /// Cluster assignment for each input vector, by input index.
    pub assignments: Vec<ClusterId>,

    /// Number of assignment iterations performed.
    pub iterations: usize,

    /// False when the run stopped on the iteration cap or time budget.
    pub converged: bool,
}

/// Errors that can occur during clustering operations.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Insufficient vectors for clustering: have {have}, need at least {need}\nSuggestion: Generate more embeddings before running a full clustering pass"
    )]
    InsufficientData { have: usize, need: usize },

    #[error("Invalid cluster count: {0}\nSuggestion: Use k of at least 1")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in clustering input\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,

    #[error(
        "No active centroid set\nSuggestion: Run a full clustering pass before assigning new embeddings"
    )]
    NoActiveCentroids,
}

/// Derives the cluster count from corpus size.
///
/// One cluster per `vectors_per_cluster` corpus entries, clamped to [2, 100].
/// This is the caller-side policy; [`cluster`] takes whatever K it is given.
#[must_use]
pub fn derive_cluster_count(corpus_size: usize, vectors_per_cluster: usize) -> usize {
    let per_cluster = vectors_per_cluster.max(1);
    (corpus_size / per_cluster).clamp(MIN_DERIVED_CLUSTERS, MAX_DERIVED_CLUSTERS)
}

/// Partitions `vectors` into `params.k` clusters by cosine distance.
///
/// # Errors
/// - `InvalidClusterCount` if `k` is zero
/// - `InsufficientData` if the corpus cannot support K distinct clusters
///   (fewer than `max(2k, 4)` vectors)
/// - `DimensionMismatch` if the input vectors disagree on dimension
///
/// Hitting the iteration cap or the time budget is not an error: the current
/// partition is returned with `converged: false`.
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn cluster(vectors: &[Vec<f32>], params: &KMeansParams) -> Result<ClusterResult, ClusteringError> {
    let k = params.k;
    if k == 0 {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let need = (2 * k).max(MIN_CORPUS_SIZE);
    if vectors.len() < need {
        return Err(ClusteringError::InsufficientData {
            have: vectors.len(),
            need,
        });
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let start = Instant::now();
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, &mut rng);
    let mut assignments = vec![ClusterId::new(0); vectors.len()];
    let mut iterations = 0;
    let mut converged = false;

    loop {
        if iterations >= params.max_iterations {
            break;
        }
        // Time budget is checked after at least one assignment pass so a
        // zero or tiny budget still yields a coherent partial result.
        if iterations > 0 && start.elapsed() >= params.time_budget {
            tracing::warn!(
                iterations,
                budget_secs = params.time_budget.as_secs(),
                "clustering time budget exhausted, returning partial result"
            );
            break;
        }
        iterations += 1;

        // Assignment step: each vector to the centroid of minimum cosine
        // distance. Order-preserving parallel map keeps output deterministic.
        let new_assignments: Vec<ClusterId> = vectors
            .par_iter()
            .map(|vector| nearest_centroid_cosine(vector, &centroids))
            .collect();

        let changed = new_assignments != assignments;
        assignments = new_assignments;

        if !changed {
            converged = true;
            break;
        }

        // Update step: recompute centroids as normalized means, reseeding
        // any cluster that lost all members.
        let new_centroids = update_centroids(vectors, &assignments, &centroids, k);

        let movement = mean_centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if movement < CONVERGENCE_TOLERANCE {
            converged = true;
            break;
        }
    }

    Ok(ClusterResult {
        centroids,
        assignments,
        iterations,
        converged,
    })
}

/// Assigns a new embedding to its nearest existing centroid.
///
/// Uses squared Euclidean distance: only a coarse bucket choice is needed
/// here, not a relevance score, and the cheaper metric wins. Centroids are
/// never modified; this is the incremental path between full clustering runs.
///
/// # Errors
/// - `NoActiveCentroids` if `centroids` is empty (the system has never been
///   clustered) — callers should leave the embedding unclustered until the
///   first full run
/// - `DimensionMismatch` if the vector width disagrees with the centroids
pub fn assign_nearest(vector: &[f32], centroids: &[Vec<f32>]) -> Result<ClusterId, ClusteringError> {
    if centroids.is_empty() {
        return Err(ClusteringError::NoActiveCentroids);
    }
    if vector.len() != centroids[0].len() {
        return Err(ClusteringError::DimensionMismatch);
    }

    let mut best_distance = f32::INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_euclidean_unchecked(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best_cluster = i;
        }
    }

    Ok(ClusterId::new(best_cluster as u32))
}

/// Assigns a vector to the centroid of minimum cosine distance.
///
/// Ties break toward the lower cluster id (strict comparison keeps the first
/// maximum), which keeps runs reproducible.
pub(crate) fn nearest_centroid_cosine(vector: &[f32], centroids: &[Vec<f32>]) -> ClusterId {
    let mut best_similarity = f32::NEG_INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = cosine_similarity_unchecked(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_cluster = i;
        }
    }

    ClusterId::new(best_cluster as u32)
}

/// Recomputes centroids as the normalized mean of their assigned vectors.
///
/// A cluster left with zero members is reseeded from the vector currently
/// farthest (by cosine distance) from its own assigned centroid, so K never
/// silently shrinks. Each reseed consumes its vector so two empty clusters
/// cannot pick the same seed.
fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[ClusterId],
    previous: &[Vec<f32>],
    k: usize,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut new_centroids = vec![vec![0.0; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, cluster_id) in vectors.iter().zip(assignments.iter()) {
        let idx = cluster_id.index();
        for (i, &value) in vector.iter().enumerate() {
            new_centroids[idx][i] += value;
        }
        cluster_sizes[idx] += 1;
    }

    let mut reseeded: Vec<usize> = Vec::new();
    for cluster_idx in 0..k {
        if cluster_sizes[cluster_idx] == 0 {
            let seed_idx = farthest_from_own_centroid(vectors, assignments, previous, &reseeded);
            new_centroids[cluster_idx] = normalize_vector_copy(&vectors[seed_idx]);
            reseeded.push(seed_idx);
        } else {
            let centroid = &mut new_centroids[cluster_idx];
            let size = cluster_sizes[cluster_idx] as f32;
            for value in centroid.iter_mut() {
                *value /= size;
            }
            normalize_vector(centroid);
        }
    }

    new_centroids
}

/// Finds the vector with maximum cosine distance to its assigned centroid,
/// skipping indices already consumed by earlier reseeds this iteration.
fn farthest_from_own_centroid(
    vectors: &[Vec<f32>],
    assignments: &[ClusterId],
    centroids: &[Vec<f32>],
    excluded: &[usize],
) -> usize {
    let mut worst_distance = f32::NEG_INFINITY;
    let mut worst_idx = 0;

    for (i, vector) in vectors.iter().enumerate() {
        if excluded.contains(&i) {
            continue;
        }
        let own = &centroids[assignments[i].index()];
        let distance = 1.0 - cosine_similarity_unchecked(vector, own);
        if distance > worst_distance {
            worst_distance = distance;
            worst_idx = i;
        }
    }

    worst_idx
}

/// Initializes centroids using the k-means++ algorithm.
///
/// The first centroid is a seeded-random pick; each subsequent centroid is
/// chosen with probability proportional to its squared cosine distance from
/// the nearest centroid chosen so far, spreading the seeds across the corpus.
fn initialize_centroids_kmeans_plus_plus(
    vectors: &[Vec<f32>],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(normalize_vector_copy(&vectors[first_idx]));

    while centroids.len() < k {
        let mut distances = vec![0.0f32; vectors.len()];
        let mut total_distance = 0.0f32;

        for (i, vector) in vectors.iter().enumerate() {
            let mut min_distance = f32::MAX;
            for centroid in &centroids {
                let distance = 1.0 - cosine_similarity_unchecked(vector, centroid);
                min_distance = min_distance.min(distance);
            }
            // Squared distance gives the k-means++ probability distribution
            distances[i] = min_distance * min_distance;
            total_distance += distances[i];
        }

        if total_distance < EPSILON {
            // Degenerate corpus: every remaining vector coincides with an
            // existing centroid. Pad the seeds in corpus order so the run
            // still produces exactly k centroids.
            let idx = centroids.len() % vectors.len();
            centroids.push(normalize_vector_copy(&vectors[idx]));
            continue;
        }

        let target = rng.random::<f32>() * total_distance;
        let mut cumulative = 0.0;
        let mut added = false;

        for (i, &distance) in distances.iter().enumerate() {
            cumulative += distance;
            if cumulative >= target {
                centroids.push(normalize_vector_copy(&vectors[i]));
                added = true;
                break;
            }
        }

        // Rounding can leave the cumulative sum a hair short of the target
        if !added {
            centroids.push(normalize_vector_copy(&vectors[vectors.len() - 1]));
        }
    }

    centroids
}

/// Mean cosine distance between old and new centroids.
fn mean_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| 1.0 - cosine_similarity_unchecked(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}

/// Normalizes a vector in-place to unit length.
fn normalize_vector(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
    // A vector with vanishing norm stays as-is (effectively zero)
}

/// Creates a normalized copy of a vector.
fn normalize_vector_copy(vector: &[f32]) -> Vec<f32> {
    let mut normalized = vector.to_vec();
    normalize_vector(&mut normalized);
    normalized
}
