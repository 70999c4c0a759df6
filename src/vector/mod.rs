//! Vector indexing, clustering, and approximate similarity search.
//!
//! Embeddings are partitioned into K clusters by a cosine-distance K-means
//! run; the resulting centroids form an inverted-file (IVF-style) index that
//! bounds each similarity query to a handful of candidate clusters instead of
//! the whole corpus. New embeddings are folded in incrementally between full
//! runs by nearest-centroid assignment.
//!
//! # Architecture
//! - [`codec`] — stable transport encoding for vectors crossing the
//!   collaborator boundary
//! - [`clustering`] — full K-means runs and incremental assignment
//! - [`storage`] — the active centroid set as a versioned blob
//! - [`index`] — candidate selection and exact re-ranking
//! - [`engine`] — the facade collaborators call

pub mod clustering;
pub mod codec;
pub mod distance;
pub mod engine;
pub mod index;
pub mod storage;
pub mod types;

// Re-export core types for public API
pub use clustering::{
    ClusterResult, ClusteringError, KMeansParams, assign_nearest, cluster, derive_cluster_count,
};
pub use codec::{DecodeError, VectorCodec};
pub use distance::{cosine_similarity, squared_euclidean};
pub use engine::{ClusterSummary, EmbeddingSource, EngineError, PipelineOptions, VectorPipeline};
pub use index::{SearchError, SearchParams, SimilarityResult};
pub use storage::{CentroidStore, CentroidStoreError};
pub use types::{
    ClusterId, EMBEDDING_DIMENSION_1536, Similarity, TopicId, VectorDimension, VectorError,
};
