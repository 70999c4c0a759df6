//! Lock-protected job queue for the content pipeline.
//!
//! A polling scheduler dequeues heterogeneous generation jobs one at a time,
//! system-wide, because every job body ultimately drives a rate-limited
//! external API. Single-flight is cooperative: overlapping trigger
//! invocations contend on a TTL'd lock and the losers simply return. Child
//! job outcomes roll up into parent task status after every transition.

pub mod aggregate;
pub mod executor;
pub mod lock;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use aggregate::{TaskRollup, derive_task_status, refresh_task};
pub use executor::{ExecutorRegistry, JobExecutor};
pub use lock::{LockGuard, LockService, MemoryLockService};
pub use orchestrator::{CYCLE_LOCK_NAME, CycleOutcome, JOB_LOCK_NAME, Orchestrator, QueueOptions};
pub use store::{JobStore, MemoryJobStore, QueueCounts, StatusCounts};
pub use types::{
    DEFAULT_PRIORITY, DispatchFailure, Job, JobId, JobStatus, JobType, NewJob, QueueError, Task,
    TaskId, TaskStatus,
};
