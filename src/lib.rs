//! Core engine for an automated content pipeline: vector clustering,
//! IVF-style similarity search over topic embeddings, and the throttled,
//! lock-protected job queue that orchestrates generation work.
//!
//! The host system (post storage, admin surfaces, LLM/image providers) is an
//! external collaborator reached through the [`vector::EmbeddingSource`] and
//! [`queue::JobExecutor`] traits.

pub mod config;
pub mod queue;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use queue::{
    CycleOutcome, DispatchFailure, ExecutorRegistry, Job, JobExecutor, JobStatus, JobStore,
    JobType, LockService, MemoryJobStore, MemoryLockService, NewJob, Orchestrator, QueueCounts,
    QueueError, Task, TaskId, TaskStatus,
};
pub use vector::{
    CentroidStore, ClusterId, ClusterResult, ClusterSummary, ClusteringError, DecodeError,
    EmbeddingSource, EngineError, KMeansParams, PipelineOptions, SearchError, SearchParams,
    Similarity, SimilarityResult, TopicId, VectorCodec, VectorDimension, VectorError,
    VectorPipeline,
};
