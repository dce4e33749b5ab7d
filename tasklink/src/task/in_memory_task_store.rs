use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::task_store::TaskStore;
use crate::errors::{Error, Result};
use tasklink_types::{ErrorDetail, Message, Task, TaskFilter, TaskPage, TaskState};

struct Entry {
    task: Task,
    /// Sliding expiry deadline, refreshed on every write.
    deadline: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline <= now
    }
}

/// In-memory implementation of [`TaskStore`].
///
/// Thread-safe via a single `RwLock`; the atomic mutations hold the
/// write lock across their read-validate-update cycle, so concurrent
/// appenders never lose updates. Records carry a sliding TTL deadline:
/// expired entries read as absent and are reclaimed lazily on access or
/// eagerly by [`purge_expired`](Self::purge_expired), which the server
/// schedules on an interval.
///
/// Suitable as the default single-process backend; use an external
/// TTL-capable KV store behind the same trait for anything that must
/// survive a restart.
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl InMemoryTaskStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Drop every expired record. Returns the number reclaimed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, entry| !entry.is_expired(now));
        let purged = before - tasks.len();
        if purged > 0 {
            tracing::debug!(purged, "Reclaimed expired tasks");
        }
        purged
    }

    /// Number of live (non-expired) records.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let tasks = self.tasks.read().await;
        tasks.values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn live_entry_mut<'a>(
        tasks: &'a mut HashMap<String, Entry>,
        task_id: &str,
    ) -> Result<&'a mut Entry> {
        let now = Instant::now();
        if tasks.get(task_id).is_some_and(|entry| entry.is_expired(now)) {
            tasks.remove(task_id);
        }
        tasks.get_mut(task_id).ok_or_else(|| Error::TaskNotFound {
            task_id: task_id.to_string(),
        })
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn put(&self, task: &Task) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(
            task.id.clone(),
            Entry {
                task: task.clone(),
                deadline: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<Task>> {
        let now = Instant::now();
        let tasks = self.tasks.read().await;
        Ok(tasks
            .get(task_id)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.task.clone()))
    }

    async fn delete(&self, task_id: &str) -> Result<bool> {
        let now = Instant::now();
        let mut tasks = self.tasks.write().await;
        match tasks.remove(task_id) {
            Some(entry) => Ok(!entry.is_expired(now)),
            None => Ok(false),
        }
    }

    async fn list(&self, filter: &TaskFilter, limit: usize, offset: usize) -> Result<TaskPage> {
        let now = Instant::now();
        let tasks = self.tasks.read().await;

        let mut matching: Vec<&Task> = tasks
            .values()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| &entry.task)
            .filter(|task| filter.matches(task))
            .collect();

        // Newest first; id as tiebreaker for a stable order across pages.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(TaskPage { items, total })
    }

    async fn append_message(&self, task_id: &str, message: Message) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let entry = Self::live_entry_mut(&mut tasks, task_id)?;

        if entry.task.status.is_terminal() {
            return Err(Error::TaskTerminal {
                task_id: task_id.to_string(),
                status: entry.task.status,
            });
        }

        // Idempotent replay: the same message against the same tail is
        // a no-op rather than a duplicate.
        if entry.task.messages.last() != Some(&message) {
            entry.task.messages.push(message);
            entry.task.updated_at = Utc::now();
        }
        entry.deadline = Instant::now() + self.ttl;

        Ok(entry.task.clone())
    }

    async fn transition(
        &self,
        task_id: &str,
        new_status: TaskState,
        error: Option<ErrorDetail>,
    ) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        let entry = Self::live_entry_mut(&mut tasks, task_id)?;
        let current = entry.task.status;

        // Idempotent replay of an already-applied transition.
        if current == new_status {
            return Ok(entry.task.clone());
        }

        if !current.can_transition_to(new_status) {
            return Err(Error::InvalidTransition {
                from: current,
                to: new_status,
            });
        }

        let now = Utc::now();
        entry.task.status = new_status;
        entry.task.updated_at = now;
        if new_status.is_terminal() && entry.task.completed_at.is_none() {
            entry.task.completed_at = Some(now);
        }
        if let Some(detail) = error {
            entry.task.error = Some(detail);
        }
        entry.deadline = Instant::now() + self.ttl;

        tracing::debug!(task_id, from = %current, to = %new_status, "Task transitioned");
        Ok(entry.task.clone())
    }
}
