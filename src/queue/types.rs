//! Job and task row types for the background queue.
//!
//! The queue moves heterogeneous units of work — topic generation, article
//! generation, vector generation — through a small state machine:
//! `pending -> processing -> {completed, failed}`. Failed jobs stay failed
//! until an operator requeues them in bulk. Every field that used to be a
//! free-form array key in the system this replaces is an explicit typed field
//! here, constructed through validating constructors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use thiserror::Error;

/// Default priority for newly enqueued jobs.
pub const DEFAULT_PRIORITY: i32 = 10;

/// Type-safe wrapper for job identifiers (store-assigned surrogate ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(NonZeroU64);

impl JobId {
    /// Creates a new `JobId` from a non-zero u64.
    #[must_use]
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    /// Creates a new `JobId`, panicking if zero.
    ///
    /// # Panics
    /// Panics if `id` is zero. Use `new()` for fallible construction.
    #[must_use]
    pub fn new_unchecked(id: u64) -> Self {
        Self(NonZeroU64::new(id).expect("JobId cannot be zero"))
    }

    /// Returns the underlying u64 value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for parent task identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(NonZeroU64);

impl TaskId {
    /// Creates a new `TaskId` from a non-zero u64.
    #[must_use]
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    /// Creates a new `TaskId`, panicking if zero.
    ///
    /// # Panics
    /// Panics if `id` is zero. Use `new()` for fallible construction.
    #[must_use]
    pub fn new_unchecked(id: u64) -> Self {
        Self(NonZeroU64::new(id).expect("TaskId cannot be zero"))
    }

    /// Returns the underlying u64 value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of work the queue knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Mine and rank new topics.
    TopicTask,

    /// Draft and publish an article for a topic.
    ArticleTask,

    /// Compute an embedding for a topic.
    VectorGeneration,
}

impl JobType {
    /// Stable string form, matching the wire/storage representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopicTask => "topic_task",
            Self::ArticleTask => "article_task",
            Self::VectorGeneration => "vector_generation",
        }
    }

    /// Whether jobs of this type roll up into a parent task's status.
    ///
    /// Vector generation is bookkeeping, not user-visible work; it carries
    /// no parent task.
    #[must_use]
    pub fn is_aggregate_tracked(&self) -> bool {
        matches!(self, Self::TopicTask | Self::ArticleTask)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states are never left except by an explicit requeue.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a parent task.
///
/// `Paused` is operator-set; the aggregator never derives it and never
/// overwrites it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Paused,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// One queued unit of work.
///
/// Mutated exclusively by the orchestrator once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Store-assigned surrogate id.
    pub id: JobId,

    /// What kind of work this is.
    pub job_type: JobType,

    /// Parent task, for aggregate-tracked job types.
    pub task: Option<TaskId>,

    /// Discriminator within a parent task (e.g. a pipeline stage name).
    pub subtask: Option<String>,

    /// The topic/embedding this job concerns, when there is one.
    pub ref_id: Option<u64>,

    /// Current lifecycle state.
    pub status: JobStatus,

    /// Higher values dequeue first.
    pub priority: i32,

    /// Error detail from the last failed dispatch, verbatim.
    pub error: Option<String>,

    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,

    /// When the job last changed state.
    pub updated_at: DateTime<Utc>,

    /// Earliest time the job may be dequeued; `None` means immediately.
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl Job {
    /// True if the job may be dequeued at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_for.is_none_or(|at| at <= now)
    }
}

/// A job as produced by an upstream producer, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: JobType,
    pub task: Option<TaskId>,
    pub subtask: Option<String>,
    pub ref_id: Option<u64>,
    pub priority: i32,
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl NewJob {
    /// Creates a job description with default priority and no schedule.
    #[must_use]
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            task: None,
            subtask: None,
            ref_id: None,
            priority: DEFAULT_PRIORITY,
            scheduled_for: None,
        }
    }

    /// Attaches the parent task.
    #[must_use]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    /// Names the subtask stage within the parent.
    #[must_use]
    pub fn with_subtask(mut self, subtask: impl Into<String>) -> Self {
        self.subtask = Some(subtask.into());
        self
    }

    /// Attaches the topic/embedding this job concerns.
    #[must_use]
    pub fn with_ref(mut self, ref_id: u64) -> Self {
        self.ref_id = Some(ref_id);
        self
    }

    /// Overrides the default priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Defers the job until the given time.
    #[must_use]
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }
}

/// A parent aggregate of many jobs sharing a task reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub completed_children: usize,
    pub failed_children: usize,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Task {
    /// Creates a fresh pending task.
    #[must_use]
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            completed_children: 0,
            failed_children: 0,
            last_processed_at: None,
            error: None,
        }
    }
}

/// Failure reported by a job body.
///
/// The message is preserved verbatim into the job's error field for operator
/// visibility; nothing downstream rewrites it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DispatchFailure {
    pub message: String,
}

impl DispatchFailure {
    /// Creates a failure with the given operator-facing message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors from queue store operations.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job {0} not found\nSuggestion: The job may have been pruned; refresh the queue view")]
    JobNotFound(JobId),

    #[error("Task {0} not found\nSuggestion: The task may have been pruned; refresh the task view")]
    TaskNotFound(TaskId),

    #[error("Queue storage error: {0}")]
    Storage(String),
}
