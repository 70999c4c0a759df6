//! Queue storage seam and the in-memory reference store.
//!
//! Durable job rows live in the host system's database; the orchestrator
//! only ever talks to the [`JobStore`] trait. [`MemoryJobStore`] is the
//! single-process implementation used by the CLI, the tests, and any embedder
//! that does not need persistence.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::queue::types::{
    Job, JobId, JobStatus, JobType, NewJob, QueueError, Task, TaskId,
};

/// Per-status job counts, also broken down by job type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub by_type: BTreeMap<JobType, StatusCounts>,
}

/// Job counts for one job type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueCounts {
    /// Total number of jobs in the queue.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// Storage operations the orchestrator needs from a queue backend.
pub trait JobStore: Send + Sync {
    /// Inserts a new job with status `pending` and returns the stored row.
    fn enqueue(&self, job: NewJob) -> Result<Job, QueueError>;

    /// Returns the next dispatchable job: highest priority, then oldest,
    /// then lowest id, among pending jobs due at `now`.
    fn next_pending(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError>;

    /// Returns one job row.
    fn get_job(&self, id: JobId) -> Result<Option<Job>, QueueError>;

    /// Transitions a job's status, recording error detail verbatim.
    fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// Returns all child jobs of a task.
    fn jobs_for_task(&self, task: TaskId) -> Result<Vec<Job>, QueueError>;

    /// Counts pending + processing jobs of one type (workload check).
    fn active_count(&self, job_type: JobType) -> Result<usize, QueueError>;

    /// Returns queue-wide counts by status and type.
    fn counts(&self) -> Result<QueueCounts, QueueError>;

    /// Resets every failed job to pending, clearing its error. Returns the
    /// number of jobs requeued.
    fn requeue_failed(&self, now: DateTime<Utc>) -> Result<usize, QueueError>;

    /// Returns one task row.
    fn get_task(&self, id: TaskId) -> Result<Option<Task>, QueueError>;

    /// Inserts or replaces a task row.
    fn save_task(&self, task: Task) -> Result<(), QueueError>;
}

#[derive(Debug, Default)]
struct StoreInner {
    jobs: BTreeMap<u64, Job>,
    tasks: BTreeMap<u64, Task>,
    next_id: u64,
}

/// In-memory job store for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: Mutex<StoreInner>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with existing job rows.
    ///
    /// Used by the CLI to operate on a queue snapshot loaded from disk.
    #[must_use]
    pub fn from_jobs(jobs: Vec<Job>) -> Self {
        let next_id = jobs.iter().map(|j| j.id.get()).max().unwrap_or(0) + 1;
        let jobs = jobs.into_iter().map(|j| (j.id.get(), j)).collect();
        Self {
            inner: Mutex::new(StoreInner {
                jobs,
                tasks: BTreeMap::new(),
                next_id,
            }),
        }
    }

    /// Returns all job rows in id order.
    #[must_use]
    pub fn jobs_snapshot(&self) -> Vec<Job> {
        self.inner.lock().jobs.values().cloned().collect()
    }

    /// Returns all task rows in id order.
    #[must_use]
    pub fn tasks_snapshot(&self) -> Vec<Task> {
        self.inner.lock().tasks.values().cloned().collect()
    }
}

impl JobStore for MemoryJobStore {
    fn enqueue(&self, job: NewJob) -> Result<Job, QueueError> {
        let mut inner = self.inner.lock();
        inner.next_id = inner.next_id.max(1);
        let id = JobId::new_unchecked(inner.next_id);
        inner.next_id += 1;

        let now = Utc::now();
        let row = Job {
            id,
            job_type: job.job_type,
            task: job.task,
            subtask: job.subtask,
            ref_id: job.ref_id,
            status: JobStatus::Pending,
            priority: job.priority,
            error: None,
            created_at: now,
            updated_at: now,
            scheduled_for: job.scheduled_for,
        };
        inner.jobs.insert(id.get(), row.clone());
        Ok(row)
    }

    fn next_pending(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        let inner = self.inner.lock();
        Ok(inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.is_due(now))
            .min_by_key(|j| (Reverse(j.priority), j.created_at, j.id))
            .cloned())
    }

    fn get_job(&self, id: JobId) -> Result<Option<Job>, QueueError> {
        Ok(self.inner.lock().jobs.get(&id.get()).cloned())
    }

    fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let job = inner
            .jobs
            .get_mut(&id.get())
            .ok_or(QueueError::JobNotFound(id))?;
        job.status = status;
        job.error = error;
        job.updated_at = now;
        Ok(())
    }

    fn jobs_for_task(&self, task: TaskId) -> Result<Vec<Job>, QueueError> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| j.task == Some(task))
            .cloned()
            .collect())
    }

    fn active_count(&self, job_type: JobType) -> Result<usize, QueueError> {
        Ok(self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|j| {
                j.job_type == job_type
                    && matches!(j.status, JobStatus::Pending | JobStatus::Processing)
            })
            .count())
    }

    fn counts(&self) -> Result<QueueCounts, QueueError> {
        let inner = self.inner.lock();
        let mut counts = QueueCounts::default();
        for job in inner.jobs.values() {
            let per_type = counts.by_type.entry(job.job_type).or_default();
            match job.status {
                JobStatus::Pending => {
                    counts.pending += 1;
                    per_type.pending += 1;
                }
                JobStatus::Processing => {
                    counts.processing += 1;
                    per_type.processing += 1;
                }
                JobStatus::Completed => {
                    counts.completed += 1;
                    per_type.completed += 1;
                }
                JobStatus::Failed => {
                    counts.failed += 1;
                    per_type.failed += 1;
                }
            }
        }
        Ok(counts)
    }

    fn requeue_failed(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut inner = self.inner.lock();
        let mut requeued = 0;
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Failed {
                job.status = JobStatus::Pending;
                job.error = None;
                job.updated_at = now;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    fn get_task(&self, id: TaskId) -> Result<Option<Task>, QueueError> {
        Ok(self.inner.lock().tasks.get(&id.get()).cloned())
    }

    fn save_task(&self, task: Task) -> Result<(), QueueError> {
        self.inner.lock().tasks.insert(task.id.get(), task);
        Ok(())
    }
}
