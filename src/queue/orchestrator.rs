//! The polling scheduler that drains the job queue.
//!
//! An external trigger (cron-equivalent) calls [`Orchestrator::run_cycle`]
//! periodically. Because triggers can overlap, the cycle is protected by two
//! TTL'd locks: a cycle-wide lock that makes concurrent invocations bail out
//! immediately, and a per-job lock scoped to one job body so the two layers
//! can recover from crashes on different timetables. Job bodies wrap
//! rate-limited external calls, so jobs within a cycle are separated by a
//! throttle sleep and never run in parallel.

use chrono::Utc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::queue::aggregate::refresh_task;
use crate::queue::executor::ExecutorRegistry;
use crate::queue::lock::{LockGuard, LockService};
use crate::queue::store::{JobStore, QueueCounts};
use crate::queue::types::{Job, JobStatus, JobType, NewJob, QueueError};

/// Name of the cycle-wide single-flight lock.
pub const CYCLE_LOCK_NAME: &str = "pipeline_cycle";

/// Name of the per-job-body lock.
pub const JOB_LOCK_NAME: &str = "pipeline_job";

/// Scheduler tuning, typically sourced from [`crate::config`].
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Sleep between job bodies within one cycle.
    pub throttle: Duration,

    /// TTL of the cycle lock; bounds how long a crashed cycle blocks others.
    pub cycle_lock_ttl: Duration,

    /// TTL of the per-job lock.
    pub job_lock_ttl: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            throttle: Duration::from_secs(2),
            cycle_lock_ttl: Duration::from_secs(300),
            job_lock_ttl: Duration::from_secs(120),
        }
    }
}

/// Outcome of one scheduler cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran; `processed` jobs were dispatched.
    Completed { processed: usize },

    /// Another invocation holds the cycle lock. Not an error: the caller
    /// retries on its next trigger.
    Contended,
}

/// Polls the queue, dispatches job bodies, and rolls results up into tasks.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    locks: Arc<dyn LockService>,
    registry: ExecutorRegistry,
    options: QueueOptions,
    idle_hook: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Orchestrator {
    /// Creates a scheduler over the given store, lock service, and dispatch
    /// table.
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        locks: Arc<dyn LockService>,
        registry: ExecutorRegistry,
        options: QueueOptions,
    ) -> Self {
        Self {
            store,
            locks,
            registry,
            options,
            idle_hook: None,
        }
    }

    /// Installs work to run when a cycle ends with no topic workload active.
    ///
    /// The vector pipeline registers incremental embedding assignment here so
    /// it never contends with the rate-limited generation jobs.
    #[must_use]
    pub fn with_idle_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.idle_hook = Some(Box::new(hook));
        self
    }

    /// Inserts a producer's job with status pending.
    ///
    /// Idempotency is the producer's responsibility.
    pub fn enqueue(&self, job: NewJob) -> Result<Job, QueueError> {
        self.store.enqueue(job)
    }

    /// Runs one scheduler cycle, dispatching up to `max_jobs` job bodies.
    ///
    /// Returns [`CycleOutcome::Contended`] without touching any job when
    /// another invocation holds the cycle lock. Store errors propagate; both
    /// locks are released on every exit path by their guards.
    pub fn run_cycle(&self, max_jobs: usize) -> Result<CycleOutcome, QueueError> {
        let Some(_cycle_guard) =
            LockGuard::acquire(&*self.locks, CYCLE_LOCK_NAME, self.options.cycle_lock_ttl)
        else {
            debug!("cycle lock contended, deferring to the active invocation");
            return Ok(CycleOutcome::Contended);
        };

        let mut processed = 0;
        while processed < max_jobs {
            let now = Utc::now();
            let Some(job) = self.store.next_pending(now)? else {
                break;
            };

            let Some(job_guard) =
                LockGuard::acquire(&*self.locks, JOB_LOCK_NAME, self.options.job_lock_ttl)
            else {
                debug!("job lock contended, ending cycle early");
                break;
            };

            self.store
                .set_status(job.id, JobStatus::Processing, None, now)?;
            info!(job = %job.id, job_type = %job.job_type, "dispatching job");

            match self.registry.dispatch(&job) {
                Ok(()) => {
                    let now = Utc::now();
                    self.store
                        .set_status(job.id, JobStatus::Completed, None, now)?;
                    if job.job_type.is_aggregate_tracked() {
                        if let Some(task_id) = job.task {
                            refresh_task(&*self.store, task_id, None, now)?;
                        }
                    }
                }
                Err(failure) => {
                    let now = Utc::now();
                    warn!(job = %job.id, error = %failure, "job dispatch failed");
                    self.store.set_status(
                        job.id,
                        JobStatus::Failed,
                        Some(failure.message.clone()),
                        now,
                    )?;
                    if job.job_type.is_aggregate_tracked() {
                        if let Some(task_id) = job.task {
                            refresh_task(&*self.store, task_id, Some(failure.message), now)?;
                        }
                    }
                }
            }

            drop(job_guard);
            processed += 1;

            if processed < max_jobs {
                if self.store.counts()?.pending == 0 {
                    break;
                }
                thread::sleep(self.options.throttle);
            }
        }

        self.run_idle_hook();
        Ok(CycleOutcome::Completed { processed })
    }

    /// Resets every failed job to pending. Returns how many were requeued.
    pub fn requeue_failed_jobs(&self) -> Result<usize, QueueError> {
        let requeued = self.store.requeue_failed(Utc::now())?;
        if requeued > 0 {
            info!(requeued, "requeued failed jobs");
        }
        Ok(requeued)
    }

    /// Returns queue-wide counts by status and job type.
    pub fn queue_status(&self) -> Result<QueueCounts, QueueError> {
        self.store.counts()
    }

    /// Runs the idle hook when no topic-generation workload is pending or in
    /// flight.
    fn run_idle_hook(&self) {
        let Some(hook) = &self.idle_hook else {
            return;
        };
        match self.store.active_count(JobType::TopicTask) {
            Ok(0) => {
                debug!("no active topic workload, running idle hook");
                hook();
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not check idle workload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::lock::MemoryLockService;
    use crate::queue::store::MemoryJobStore;
    use crate::queue::types::{DispatchFailure, TaskId, TaskStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_options() -> QueueOptions {
        QueueOptions {
            throttle: Duration::from_millis(1),
            ..QueueOptions::default()
        }
    }

    fn orchestrator_with(registry: ExecutorRegistry) -> (Orchestrator, Arc<MemoryJobStore>) {
        let store = Arc::new(MemoryJobStore::new());
        let locks = Arc::new(MemoryLockService::new());
        let orchestrator = Orchestrator::new(store.clone(), locks, registry, fast_options());
        (orchestrator, store)
    }

    #[test]
    fn test_cycle_processes_jobs_in_priority_order() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let registry = {
            let seen = seen.clone();
            ExecutorRegistry::new().register(JobType::TopicTask, move |job: &Job| {
                seen.lock().push(job.priority);
                Ok(())
            })
        };
        let (orchestrator, store) = orchestrator_with(registry);

        orchestrator
            .enqueue(NewJob::new(JobType::TopicTask).with_priority(1))
            .unwrap();
        orchestrator
            .enqueue(NewJob::new(JobType::TopicTask).with_priority(50))
            .unwrap();

        let outcome = orchestrator.run_cycle(10).unwrap();
        assert_eq!(outcome, CycleOutcome::Completed { processed: 2 });
        assert_eq!(*seen.lock(), vec![50, 1]);
        assert_eq!(store.counts().unwrap().completed, 2);
    }

    #[test]
    fn test_cycle_respects_job_budget() {
        let registry = ExecutorRegistry::new().register(JobType::TopicTask, |_: &Job| Ok(()));
        let (orchestrator, store) = orchestrator_with(registry);

        for _ in 0..5 {
            orchestrator.enqueue(NewJob::new(JobType::TopicTask)).unwrap();
        }

        let outcome = orchestrator.run_cycle(2).unwrap();
        assert_eq!(outcome, CycleOutcome::Completed { processed: 2 });
        let counts = store.counts().unwrap();
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.pending, 3);
    }

    #[test]
    fn test_contended_cycle_performs_no_writes() {
        let registry = ExecutorRegistry::new().register(JobType::TopicTask, |_: &Job| Ok(()));
        let store = Arc::new(MemoryJobStore::new());
        let locks = Arc::new(MemoryLockService::new());
        let orchestrator =
            Orchestrator::new(store.clone(), locks.clone(), registry, fast_options());

        orchestrator.enqueue(NewJob::new(JobType::TopicTask)).unwrap();

        // Another invocation holds the cycle lock
        assert!(locks.try_acquire(CYCLE_LOCK_NAME, Duration::from_secs(60)));

        let outcome = orchestrator.run_cycle(10).unwrap();
        assert_eq!(outcome, CycleOutcome::Contended);
        assert_eq!(store.counts().unwrap().pending, 1);
    }

    #[test]
    fn test_failure_marks_job_and_task_with_verbatim_message() {
        let registry = ExecutorRegistry::new().register(JobType::ArticleTask, |_: &Job| {
            Err(DispatchFailure::new("provider returned 500"))
        });
        let (orchestrator, store) = orchestrator_with(registry);

        let task_id = TaskId::new_unchecked(7);
        let job = orchestrator
            .enqueue(NewJob::new(JobType::ArticleTask).with_task(task_id))
            .unwrap();

        orchestrator.run_cycle(1).unwrap();

        let failed = store.get_job(job.id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("provider returned 500"));

        let task = store.get_task(task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("provider returned 500"));
    }

    #[test]
    fn test_failure_does_not_stop_the_cycle() {
        let registry = ExecutorRegistry::new()
            .register(JobType::ArticleTask, |_: &Job| {
                Err(DispatchFailure::new("boom"))
            })
            .register(JobType::TopicTask, |_: &Job| Ok(()));
        let (orchestrator, store) = orchestrator_with(registry);

        orchestrator
            .enqueue(NewJob::new(JobType::ArticleTask).with_priority(50))
            .unwrap();
        orchestrator.enqueue(NewJob::new(JobType::TopicTask)).unwrap();

        let outcome = orchestrator.run_cycle(10).unwrap();
        assert_eq!(outcome, CycleOutcome::Completed { processed: 2 });
        let counts = store.counts().unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.completed, 1);
    }

    #[test]
    fn test_vector_generation_does_not_touch_tasks() {
        let registry =
            ExecutorRegistry::new().register(JobType::VectorGeneration, |_: &Job| Ok(()));
        let (orchestrator, store) = orchestrator_with(registry);

        orchestrator
            .enqueue(NewJob::new(JobType::VectorGeneration))
            .unwrap();
        orchestrator.run_cycle(1).unwrap();

        assert!(store.tasks_snapshot().is_empty());
    }

    #[test]
    fn test_idle_hook_runs_only_without_topic_workload() {
        let idle_runs = Arc::new(AtomicUsize::new(0));

        let registry = ExecutorRegistry::new().register(JobType::ArticleTask, |_: &Job| Ok(()));
        let store = Arc::new(MemoryJobStore::new());
        let locks = Arc::new(MemoryLockService::new());
        let orchestrator = {
            let idle_runs = idle_runs.clone();
            Orchestrator::new(store.clone(), locks, registry, fast_options())
                .with_idle_hook(move || {
                    idle_runs.fetch_add(1, Ordering::SeqCst);
                })
        };

        // Topic work pending: the hook must not run
        orchestrator.enqueue(NewJob::new(JobType::TopicTask)).unwrap();
        orchestrator.run_cycle(0).unwrap();
        assert_eq!(idle_runs.load(Ordering::SeqCst), 0);

        // Drain the topic job (no executor -> it fails, but becomes terminal)
        orchestrator.run_cycle(1).unwrap();
        assert_eq!(idle_runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_requeue_failed_jobs() {
        let registry = ExecutorRegistry::new().register(JobType::TopicTask, |_: &Job| {
            Err(DispatchFailure::new("transient"))
        });
        let (orchestrator, store) = orchestrator_with(registry);

        orchestrator.enqueue(NewJob::new(JobType::TopicTask)).unwrap();
        orchestrator.run_cycle(1).unwrap();
        assert_eq!(store.counts().unwrap().failed, 1);

        assert_eq!(orchestrator.requeue_failed_jobs().unwrap(), 1);
        assert_eq!(store.counts().unwrap().pending, 1);
    }
}
