//! Task status derivation from child job statuses.
//!
//! A task's status is a pure function of its children, evaluated in strict
//! precedence order: a single failed child poisons the parent once all
//! children are terminal, any in-flight child shows as processing, and only
//! an all-pending brood leaves the task pending.

use chrono::{DateTime, Utc};

use crate::queue::store::JobStore;
use crate::queue::types::{Job, JobStatus, QueueError, Task, TaskId, TaskStatus};

/// Derived rollup of one task's children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRollup {
    pub status: TaskStatus,
    pub completed: usize,
    pub failed: usize,
    pub error: Option<String>,
}

/// Derives a task's status from its child jobs.
///
/// Precedence, top to bottom:
/// 1. all failed         -> failed ("all N subtasks failed")
/// 2. all completed      -> completed
/// 3. all terminal mixed -> failed if any failed, else completed
/// 4. any processing     -> processing
/// 5. otherwise          -> pending
#[must_use]
pub fn derive_task_status(children: &[Job]) -> TaskRollup {
    let total = children.len();
    let completed = children
        .iter()
        .filter(|j| j.status == JobStatus::Completed)
        .count();
    let failed = children
        .iter()
        .filter(|j| j.status == JobStatus::Failed)
        .count();
    let processing = children
        .iter()
        .filter(|j| j.status == JobStatus::Processing)
        .count();

    let status = if total > 0 && failed == total {
        TaskStatus::Failed
    } else if total > 0 && completed == total {
        TaskStatus::Completed
    } else if total > 0 && completed + failed == total {
        if failed > 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        }
    } else if processing > 0 {
        TaskStatus::Processing
    } else {
        TaskStatus::Pending
    };

    let error = if status == TaskStatus::Failed && failed == total {
        Some(format!("all {total} subtasks failed"))
    } else {
        None
    };

    TaskRollup {
        status,
        completed,
        failed,
        error,
    }
}

/// Recomputes and persists a task's status after a child job transition.
///
/// Paused tasks are operator-frozen and left untouched. `error_override`
/// carries the failing job's message verbatim when a dispatch just failed;
/// it takes precedence over the derived all-failed summary.
pub fn refresh_task(
    store: &dyn JobStore,
    task_id: TaskId,
    error_override: Option<String>,
    now: DateTime<Utc>,
) -> Result<Task, QueueError> {
    let mut task = store
        .get_task(task_id)?
        .unwrap_or_else(|| Task::new(task_id));

    if task.status == TaskStatus::Paused {
        return Ok(task);
    }

    let children = store.jobs_for_task(task_id)?;
    let rollup = derive_task_status(&children);

    task.status = rollup.status;
    task.completed_children = rollup.completed;
    task.failed_children = rollup.failed;
    task.last_processed_at = Some(now);
    task.error = match rollup.status {
        TaskStatus::Failed => error_override.or(rollup.error),
        _ => None,
    };

    store.save_task(task.clone())?;
    Ok(task)
}
