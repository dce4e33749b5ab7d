use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Message;

/// Lifecycle status of a task.
///
/// Transitions only ever move forward through the state machine:
/// `created -> working -> (input_required | completed | failed | cancelled)`
/// and `input_required -> working`. The three right-most states are
/// terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Created,
    Working,
    InputRequired,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Whether `self -> next` is a legal edge of the state machine.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Created, TaskState::Working)
                | (TaskState::Working, TaskState::InputRequired)
                | (TaskState::Working, TaskState::Completed)
                | (TaskState::Working, TaskState::Failed)
                | (TaskState::Working, TaskState::Cancelled)
                | (TaskState::InputRequired, TaskState::Working)
        )
    }

    /// Wire name of the state, as serialized into JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Created => "created",
            TaskState::Working => "working",
            TaskState::InputRequired => "input_required",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sanitized failure description stored on a failed task and carried by
/// error events. Never contains raw internal error text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// A persisted unit of work with an id, status and message history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub status: TaskState,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "completedAt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl Task {
    /// Fresh task in `created` status with one initial message.
    pub fn new(
        id: String,
        agent_id: String,
        initial_message: Message,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            agent_id,
            status: TaskState::Created,
            messages: vec![initial_message],
            context,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error: None,
        }
    }
}

/// Listing filter over the task store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub agent_id: Option<String>,
    pub status: Option<TaskState>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.agent_id
            .as_ref()
            .map_or(true, |agent_id| &task.agent_id == agent_id)
            && self.status.map_or(true, |status| task.status == status)
    }
}

/// One page of a task listing, with the total match count for
/// client-side pagination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPage {
    pub items: Vec<Task>,
    pub total: usize,
}
