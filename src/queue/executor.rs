//! Job body dispatch.
//!
//! Job types are a closed enum dispatched through a registry populated at
//! startup — one executor per type. The executors themselves wrap the
//! rate-limited external calls (LLM drafting, image generation, embedding
//! computation) that live outside this crate; all the orchestrator sees is
//! success or a [`DispatchFailure`] message.

use std::collections::HashMap;

use crate::queue::types::{DispatchFailure, Job, JobType};

/// A job body for one job type.
pub trait JobExecutor: Send + Sync {
    /// Executes the job. The failure message is preserved verbatim into the
    /// job's error field.
    fn execute(&self, job: &Job) -> Result<(), DispatchFailure>;
}

impl<F> JobExecutor for F
where
    F: Fn(&Job) -> Result<(), DispatchFailure> + Send + Sync,
{
    fn execute(&self, job: &Job) -> Result<(), DispatchFailure> {
        self(job)
    }
}

/// Dispatch table from job type to executor, populated at startup.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Box<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the executor for one job type, replacing any previous one.
    #[must_use]
    pub fn register(mut self, job_type: JobType, executor: impl JobExecutor + 'static) -> Self {
        self.executors.insert(job_type, Box::new(executor));
        self
    }

    /// Dispatches a job to its executor.
    ///
    /// A job type with no registered executor is a dispatch failure, not a
    /// panic: producers can enqueue types this deployment does not serve.
    pub fn dispatch(&self, job: &Job) -> Result<(), DispatchFailure> {
        match self.executors.get(&job.job_type) {
            Some(executor) => executor.execute(job),
            None => Err(DispatchFailure::new(format!(
                "no executor registered for job type {}",
                job.job_type
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::{JobStore, MemoryJobStore};
    use crate::queue::types::NewJob;

    fn sample_job(job_type: JobType) -> Job {
        let store = MemoryJobStore::new();
        store.enqueue(NewJob::new(job_type)).unwrap()
    }

    #[test]
    fn test_dispatch_routes_by_type() {
        let registry = ExecutorRegistry::new()
            .register(JobType::TopicTask, |_: &Job| Ok(()))
            .register(JobType::ArticleTask, |_: &Job| {
                Err(DispatchFailure::new("article generation unavailable"))
            });

        assert!(registry.dispatch(&sample_job(JobType::TopicTask)).is_ok());

        let err = registry
            .dispatch(&sample_job(JobType::ArticleTask))
            .unwrap_err();
        assert_eq!(err.message, "article generation unavailable");
    }

    #[test]
    fn test_dispatch_unregistered_type_fails() {
        let registry = ExecutorRegistry::new();
        let err = registry
            .dispatch(&sample_job(JobType::VectorGeneration))
            .unwrap_err();
        assert!(err.message.contains("vector_generation"));
    }
}
