//! Pipeline facade coordinating clustering, assignment, and search.
//!
//! [`VectorPipeline`] is the entry point collaborators call: a full
//! clustering run from an admin action, incremental assignment from the
//! queue's idle window, and similarity search from the debug tooling. All
//! embedding reads and writes flow through the [`EmbeddingSource`] trait —
//! the durable store lives in the host system, not here. The active centroid
//! set is this crate's own artifact and lives in a [`CentroidStore`] blob.

use thiserror::Error;
use tracing::{debug, info};

use crate::vector::clustering::{
    ClusteringError, KMeansParams, assign_nearest, cluster, derive_cluster_count,
};
use crate::vector::index::{SearchError, SearchParams, SimilarityResult, nearest_clusters, rank_candidates};
use crate::vector::storage::{CentroidStore, CentroidStoreError};
use crate::vector::types::{ClusterId, TopicId, VectorDimension, VectorError};
use std::time::Duration;

/// Access to the embedding corpus owned by the host system.
///
/// Implementations are expected to apply their own eligibility filtering in
/// `fetch_candidates` (published topics only, and so on); the engine adds the
/// cluster pre-filter and the query-exclusion rule on top.
pub trait EmbeddingSource: Send + Sync {
    /// Returns every embedding, clustered or not. Input to a full run.
    fn fetch_all(&self) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError>;

    /// Returns embeddings with no cluster assignment yet.
    fn fetch_unclustered(&self) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError>;

    /// Returns one topic's embedding, if it has one.
    fn fetch_vector(&self, id: TopicId) -> Result<Option<Vec<f32>>, VectorError>;

    /// Returns eligible candidate embeddings within the given clusters.
    fn fetch_candidates(
        &self,
        clusters: &[ClusterId],
    ) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError>;

    /// Records a topic's cluster assignment.
    fn persist_assignment(&self, id: TopicId, cluster: ClusterId) -> Result<(), VectorError>;
}

impl<T: EmbeddingSource + ?Sized> EmbeddingSource for std::sync::Arc<T> {
    fn fetch_all(&self) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError> {
        (**self).fetch_all()
    }

    fn fetch_unclustered(&self) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError> {
        (**self).fetch_unclustered()
    }

    fn fetch_vector(&self, id: TopicId) -> Result<Option<Vec<f32>>, VectorError> {
        (**self).fetch_vector(id)
    }

    fn fetch_candidates(
        &self,
        clusters: &[ClusterId],
    ) -> Result<Vec<(TopicId, Vec<f32>)>, VectorError> {
        (**self).fetch_candidates(clusters)
    }

    fn persist_assignment(&self, id: TopicId, cluster: ClusterId) -> Result<(), VectorError> {
        (**self).persist_assignment(id, cluster)
    }
}

/// Tuning knobs for the pipeline, typically sourced from [`crate::config`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Corpus entries per derived cluster (K policy input).
    pub vectors_per_cluster: usize,

    /// Iteration cap for full clustering runs.
    pub max_iterations: usize,

    /// Wall-clock budget for full clustering runs.
    pub time_budget: Duration,

    /// Seed for k-means++ initialization.
    pub seed: u64,

    /// Nearest clusters drawn per search.
    pub candidate_clusters: usize,

    /// Similarity floor for search results.
    pub similarity_threshold: f32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            vectors_per_cluster: 100,
            max_iterations: crate::vector::clustering::DEFAULT_MAX_ITERATIONS,
            time_budget: crate::vector::clustering::DEFAULT_TIME_BUDGET,
            seed: crate::vector::clustering::DEFAULT_SEED,
            candidate_clusters: crate::vector::index::DEFAULT_CANDIDATE_CLUSTERS,
            similarity_threshold: crate::vector::index::DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Summary of one full clustering run, for operator reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ClusterSummary {
    /// Number of clusters produced.
    pub k: usize,

    /// Number of embeddings assigned.
    pub assigned: usize,

    /// Assignment iterations performed.
    pub iterations: usize,

    /// False when the run stopped on a cap or budget.
    pub converged: bool,
}

/// Errors surfaced by the pipeline facade.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Clustering(#[from] ClusteringError),

    #[error(transparent)]
    Storage(#[from] CentroidStoreError),

    #[error(transparent)]
    Vector(#[from] VectorError),
}

/// Coordinates the clustering engine, incremental assigner, and similarity
/// search over one embedding source and one centroid store.
pub struct VectorPipeline<S> {
    source: S,
    store: CentroidStore,
    dimension: VectorDimension,
    options: PipelineOptions,
}

impl<S: EmbeddingSource> VectorPipeline<S> {
    /// Creates a pipeline over the given source and centroid store.
    #[must_use]
    pub fn new(
        source: S,
        store: CentroidStore,
        dimension: VectorDimension,
        options: PipelineOptions,
    ) -> Self {
        Self {
            source,
            store,
            dimension,
            options,
        }
    }

    /// Returns the embedding source.
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs a full clustering pass over the whole corpus.
    ///
    /// Derives K from corpus size unless `k_override` is given, partitions,
    /// then commits: the centroid blob is replaced first and every cluster
    /// assignment written after it. Both writes belong to one logical commit;
    /// they only ever run inside the single-flight orchestrator cycle or an
    /// equivalent exclusive admin action.
    pub fn trigger_clustering(
        &self,
        k_override: Option<usize>,
    ) -> Result<ClusterSummary, EngineError> {
        let corpus = self.source.fetch_all()?;
        for (_, vector) in &corpus {
            self.dimension.validate_vector(vector)?;
        }

        let k = k_override
            .unwrap_or_else(|| derive_cluster_count(corpus.len(), self.options.vectors_per_cluster));
        let params = KMeansParams {
            k,
            max_iterations: self.options.max_iterations,
            time_budget: self.options.time_budget,
            seed: self.options.seed,
        };

        let vectors: Vec<Vec<f32>> = corpus.iter().map(|(_, v)| v.clone()).collect();
        let result = cluster(&vectors, &params)?;

        self.store.save(&result.centroids)?;
        for ((id, _), cluster_id) in corpus.iter().zip(result.assignments.iter()) {
            self.source.persist_assignment(*id, *cluster_id)?;
        }

        info!(
            k,
            assigned = corpus.len(),
            iterations = result.iterations,
            converged = result.converged,
            "full clustering run committed"
        );

        Ok(ClusterSummary {
            k,
            assigned: corpus.len(),
            iterations: result.iterations,
            converged: result.converged,
        })
    }

    /// Assigns embeddings created since the last full run to their nearest
    /// existing centroid.
    ///
    /// Centroids and existing assignments are untouched. Returns the number
    /// of embeddings assigned.
    ///
    /// # Errors
    /// `NoActiveCentroids` if no full run has ever happened; callers should
    /// skip assignment and leave the embeddings unclustered until one has.
    pub fn assign_unclustered(&self) -> Result<usize, EngineError> {
        let centroids = self
            .store
            .load()?
            .ok_or(ClusteringError::NoActiveCentroids)?;

        let pending = self.source.fetch_unclustered()?;
        let mut assigned = 0;
        for (id, vector) in pending {
            self.dimension.validate_vector(&vector)?;
            let cluster_id = assign_nearest(&vector, &centroids)?;
            self.source.persist_assignment(id, cluster_id)?;
            assigned += 1;
        }

        if assigned > 0 {
            debug!(assigned, "incremental assignment pass complete");
        }
        Ok(assigned)
    }

    /// Finds the topics most similar to `query_id`, with default tuning.
    pub fn find_similar(
        &self,
        query_id: TopicId,
        limit: usize,
    ) -> Result<Vec<SimilarityResult>, SearchError> {
        let params = SearchParams {
            limit,
            candidate_clusters: self.options.candidate_clusters,
            similarity_threshold: self.options.similarity_threshold,
        };
        self.search(query_id, &params)
    }

    /// Finds the topics most similar to `query_id`.
    ///
    /// Candidates come from the `candidate_clusters` nearest clusters only;
    /// a true neighbor outside those clusters will be missed. The query topic
    /// is never part of its own results.
    pub fn search(
        &self,
        query_id: TopicId,
        params: &SearchParams,
    ) -> Result<Vec<SimilarityResult>, SearchError> {
        let query = self
            .source
            .fetch_vector(query_id)?
            .ok_or(SearchError::NotFound(query_id))?;

        let centroids = self.store.load()?.ok_or(SearchError::NoIndex)?;

        let clusters = nearest_clusters(&query, &centroids, params.candidate_clusters);
        let mut candidates = self.source.fetch_candidates(&clusters)?;
        candidates.retain(|(id, _)| *id != query_id);

        let results = rank_candidates(&query, &candidates, params);
        debug!(
            query = %query_id,
            clusters = clusters.len(),
            candidates = candidates.len(),
            results = results.len(),
            "similarity search complete"
        );
        Ok(results)
    }
}
