use async_trait::async_trait;

use crate::errors::Result;
use tasklink_types::{ErrorDetail, Message, Task, TaskFilter, TaskPage, TaskState};

/// Storage abstraction for task persistence with TTL-based expiry.
///
/// Backends must be safe under concurrent access from multiple
/// in-process callers. The default is an in-memory concurrent map; an
/// external TTL-capable KV store plugs in behind the same trait.
///
/// Failure policy: writes fail closed — a backend failure surfaces as
/// `StoreUnavailable`, never as silent data loss. Whether reads may fail
/// open in degraded mode is the caller's decision (see
/// [`RuntimeConfig::degraded_reads`](crate::config::RuntimeConfig)).
///
/// `append_message` and `transition` are atomic store operations, not
/// client-side read/merge/write cycles: two concurrent appenders must
/// both land, and the mutations are idempotent (replaying the same
/// logical mutation yields the same task state).
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create or overwrite a task, refreshing its TTL deadline.
    async fn put(&self, task: &Task) -> Result<()>;

    /// Fetch a task by id. Expired records read as absent.
    async fn get(&self, task_id: &str) -> Result<Option<Task>>;

    /// Delete a task. Returns `false` for an unknown id (idempotent).
    async fn delete(&self, task_id: &str) -> Result<bool>;

    /// One page of tasks matching the filter, ordered by `created_at`
    /// descending, with the total match count.
    async fn list(&self, filter: &TaskFilter, limit: usize, offset: usize) -> Result<TaskPage>;

    /// Atomically append a message to the task's history.
    ///
    /// Fails with `TaskNotFound` for unknown ids and `TaskTerminal` for
    /// tasks in a terminal status. Replaying the same message against
    /// the same tail is a no-op.
    async fn append_message(&self, task_id: &str, message: Message) -> Result<Task>;

    /// Atomically transition the task's status, enforcing the lifecycle
    /// state machine.
    ///
    /// Illegal edges fail with `InvalidTransition` and leave the task
    /// unchanged. Entering a terminal status sets `completed_at` exactly
    /// once and stores the optional error detail. A transition into the
    /// current status is an idempotent no-op.
    async fn transition(
        &self,
        task_id: &str,
        new_status: TaskState,
        error: Option<ErrorDetail>,
    ) -> Result<Task>;
}
