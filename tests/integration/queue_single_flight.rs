//! Concurrency properties of the scheduler: overlapping cycle invocations
//! must collapse to a single execution, and every job body must run exactly
//! once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use draftmill::queue::{
    CycleOutcome, ExecutorRegistry, Job, JobStore, JobType, MemoryJobStore, MemoryLockService,
    NewJob, Orchestrator, QueueOptions,
};

#[test]
fn overlapping_cycles_collapse_to_one_execution() {
    let store = Arc::new(MemoryJobStore::new());
    let locks = Arc::new(MemoryLockService::new());
    let executions = Arc::new(AtomicUsize::new(0));

    let registry = {
        let executions = executions.clone();
        ExecutorRegistry::new().register(JobType::ArticleTask, move |_: &Job| {
            executions.fetch_add(1, Ordering::SeqCst);
            // Long enough that the second invocation definitely overlaps
            thread::sleep(Duration::from_millis(200));
            Ok(())
        })
    };

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        locks,
        registry,
        QueueOptions {
            throttle: Duration::from_millis(1),
            ..QueueOptions::default()
        },
    ));

    for _ in 0..3 {
        orchestrator
            .enqueue(NewJob::new(JobType::ArticleTask))
            .unwrap();
    }

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                orchestrator.run_cycle(5).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<CycleOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Exactly one invocation won the cycle lock and did all the work
    let contended = outcomes
        .iter()
        .filter(|o| matches!(o, CycleOutcome::Contended))
        .count();
    assert_eq!(contended, 1, "outcomes: {outcomes:?}");
    assert!(
        outcomes.contains(&CycleOutcome::Completed { processed: 3 }),
        "outcomes: {outcomes:?}"
    );

    // Every job body ran exactly once
    assert_eq!(executions.load(Ordering::SeqCst), 3);
    let counts = orchestrator.queue_status().unwrap();
    assert_eq!(counts.completed, 3);
    assert_eq!(counts.pending, 0);
}

#[test]
fn contended_invocation_writes_nothing() {
    let store = Arc::new(MemoryJobStore::new());
    let locks = Arc::new(MemoryLockService::new());

    let registry = ExecutorRegistry::new().register(JobType::TopicTask, |_: &Job| Ok(()));
    let orchestrator = Orchestrator::new(
        store.clone(),
        locks.clone(),
        registry,
        QueueOptions::default(),
    );

    let job = orchestrator.enqueue(NewJob::new(JobType::TopicTask)).unwrap();

    // Simulate another live invocation holding the cycle lock
    use draftmill::queue::{CYCLE_LOCK_NAME, LockService};
    assert!(locks.try_acquire(CYCLE_LOCK_NAME, Duration::from_secs(60)));

    let outcome = orchestrator.run_cycle(5).unwrap();
    assert_eq!(outcome, CycleOutcome::Contended);

    let untouched = store.get_job(job.id).unwrap().unwrap();
    assert_eq!(untouched, job);
}

#[test]
fn consecutive_cycles_share_no_state() {
    let store = Arc::new(MemoryJobStore::new());
    let locks = Arc::new(MemoryLockService::new());

    let registry = ExecutorRegistry::new().register(JobType::TopicTask, |_: &Job| Ok(()));
    let orchestrator = Orchestrator::new(
        store,
        locks,
        registry,
        QueueOptions {
            throttle: Duration::from_millis(1),
            ..QueueOptions::default()
        },
    );

    orchestrator.enqueue(NewJob::new(JobType::TopicTask)).unwrap();
    assert_eq!(
        orchestrator.run_cycle(5).unwrap(),
        CycleOutcome::Completed { processed: 1 }
    );

    // The cycle lock was released; the next trigger proceeds normally
    orchestrator.enqueue(NewJob::new(JobType::TopicTask)).unwrap();
    assert_eq!(
        orchestrator.run_cycle(5).unwrap(),
        CycleOutcome::Completed { processed: 1 }
    );
}
