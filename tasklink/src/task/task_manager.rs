use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::task_store::TaskStore;
use crate::config::RuntimeConfig;
use crate::errors::{Error, Result};
use tasklink_types::{ErrorDetail, Message, Task, TaskFilter, TaskPage, TaskState};

/// Lifecycle orchestration atop a [`TaskStore`].
///
/// The manager owns id allocation, the retry policy for store reads and
/// the listing limits; the state-machine and append invariants live in
/// the store's atomic operations so they hold under concurrency.
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    config: RuntimeConfig,
}

impl TaskManager {
    pub fn new(store: Arc<dyn TaskStore>, config: RuntimeConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Allocate an id and persist a new task in `created` status.
    /// Does not block on agent execution.
    pub async fn create_task(
        &self,
        agent_id: impl Into<String>,
        initial_message: Message,
        context: HashMap<String, serde_json::Value>,
    ) -> Result<Task> {
        let task = Task::new(
            Uuid::new_v4().to_string(),
            agent_id.into(),
            initial_message,
            context,
        );
        self.store.put(&task).await?;
        tracing::debug!(task_id = %task.id, agent_id = %task.agent_id, "Task created");
        Ok(task)
    }

    /// Fetch a task, retrying retryable store failures with backoff.
    ///
    /// Unknown ids surface as `TaskNotFound`. When the degraded-read
    /// flag is set, a persistently failing backend reads as absent
    /// instead of erroring — an explicit opt-in, never the default.
    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        match self.get_with_retries(task_id).await {
            Ok(Some(task)) => Ok(task),
            Ok(None) => Err(Error::TaskNotFound {
                task_id: task_id.to_string(),
            }),
            Err(err) if self.config.degraded_reads && err.is_retryable() => {
                tracing::warn!(task_id, %err, "Degraded read: treating store failure as absent");
                Err(Error::TaskNotFound {
                    task_id: task_id.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn get_with_retries(&self, task_id: &str) -> Result<Option<Task>> {
        let mut backoff = self.config.store_retry_backoff;
        let mut attempt = 0;
        loop {
            match self.store.get(task_id).await {
                Ok(task) => return Ok(task),
                Err(err) if err.is_retryable() && attempt < self.config.store_read_retries => {
                    attempt += 1;
                    tracing::warn!(task_id, attempt, %err, "Retrying store read");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Append a message to a non-terminal task. Writes are never
    /// silently retried: a duplicate append is worse than a surfaced
    /// error, and the store-level mutation is replay-safe for callers
    /// that retry the whole operation.
    pub async fn append_message(&self, task_id: &str, message: Message) -> Result<Task> {
        self.store.append_message(task_id, message).await
    }

    /// Drive one edge of the status state machine.
    pub async fn transition(
        &self,
        task_id: &str,
        new_status: TaskState,
        error: Option<ErrorDetail>,
    ) -> Result<Task> {
        self.store.transition(task_id, new_status, error).await
    }

    /// Cancel a task (transition to `cancelled`).
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task> {
        self.transition(task_id, TaskState::Cancelled, None).await
    }

    /// List tasks matching the filter, newest first, with the total
    /// match count. `limit` is clamped to the configured maximum.
    pub async fn list_tasks(
        &self,
        filter: &TaskFilter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<TaskPage> {
        let limit = limit
            .unwrap_or(self.config.max_list_limit)
            .min(self.config.max_list_limit);
        self.store.list(filter, limit, offset.unwrap_or(0)).await
    }

    /// Delete a task. Returns `false` for an unknown id (idempotent).
    pub async fn delete_task(&self, task_id: &str) -> Result<bool> {
        let deleted = self.store.delete(task_id).await?;
        if deleted {
            tracing::debug!(task_id, "Task deleted");
        }
        Ok(deleted)
    }
}
