use serde::{Deserialize, Serialize};

use crate::{ErrorDetail, Message, Role, Task, TaskState};

/// Events emitted on a task-protocol stream (`POST /tasks` with
/// `stream: true`).
///
/// A stream carries one `status` event per lifecycle transition,
/// `message` events with `partial: true` for intermediate fragments and
/// `partial: false` for the final assistant message, and ends with a
/// single terminal `complete` or `error` event. Ordering is whatever the
/// driving handler emitted; events carry no explicit sequence numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskStreamEvent {
    Status {
        #[serde(rename = "taskId")]
        task_id: String,
        status: TaskState,
        #[serde(rename = "final")]
        is_final: bool,
    },
    Message {
        #[serde(rename = "taskId")]
        task_id: String,
        message: Message,
        partial: bool,
    },
    Complete {
        #[serde(rename = "taskId")]
        task_id: String,
        task: Task,
    },
    Error {
        #[serde(rename = "taskId")]
        task_id: String,
        error: ErrorDetail,
    },
}

impl TaskStreamEvent {
    /// Terminal events close the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStreamEvent::Complete { .. } | TaskStreamEvent::Error { .. }
        )
    }

    pub fn task_id(&self) -> &str {
        match self {
            TaskStreamEvent::Status { task_id, .. }
            | TaskStreamEvent::Message { task_id, .. }
            | TaskStreamEvent::Complete { task_id, .. }
            | TaskStreamEvent::Error { task_id, .. } => task_id,
        }
    }
}

/// Events emitted on a run-protocol stream (`POST /runs/stream`).
///
/// The set is closed on purpose: handlers match exhaustively, so a new
/// event kind is a compile-time change, never a stringly-typed one.
/// Every variant carries the correlating `runId`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        #[serde(rename = "runId")]
        run_id: String,
    },
    RunFinished {
        #[serde(rename = "runId")]
        run_id: String,
    },
    RunFailed {
        #[serde(rename = "runId")]
        run_id: String,
        error: ErrorDetail,
    },
    TextMessageStart {
        #[serde(rename = "runId")]
        run_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
        role: Role,
    },
    TextMessageContent {
        #[serde(rename = "runId")]
        run_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
        delta: String,
    },
    TextMessageEnd {
        #[serde(rename = "runId")]
        run_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
    },
    ToolCallStart {
        #[serde(rename = "runId")]
        run_id: String,
        #[serde(rename = "callId")]
        call_id: String,
        name: String,
    },
    ToolCallProgress {
        #[serde(rename = "runId")]
        run_id: String,
        #[serde(rename = "callId")]
        call_id: String,
        payload: serde_json::Value,
    },
    ToolCallEnd {
        #[serde(rename = "runId")]
        run_id: String,
        #[serde(rename = "callId")]
        call_id: String,
        result: serde_json::Value,
    },
    ToolCallError {
        #[serde(rename = "runId")]
        run_id: String,
        #[serde(rename = "callId")]
        call_id: String,
        error: ErrorDetail,
    },
    /// Full snapshot of the run's state tree.
    StateSync {
        #[serde(rename = "runId")]
        run_id: String,
        state: serde_json::Value,
        version: u64,
    },
    /// Delta update: one path replaced, payload bounded by the subtree.
    StateUpdate {
        #[serde(rename = "runId")]
        run_id: String,
        path: String,
        value: serde_json::Value,
        version: u64,
    },
    Error {
        #[serde(rename = "runId")]
        run_id: String,
        error: ErrorDetail,
    },
}

impl RunEvent {
    /// Terminal events close the stream; nothing is emitted after them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::RunFinished { .. } | RunEvent::RunFailed { .. }
        )
    }

    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::RunStarted { run_id }
            | RunEvent::RunFinished { run_id }
            | RunEvent::RunFailed { run_id, .. }
            | RunEvent::TextMessageStart { run_id, .. }
            | RunEvent::TextMessageContent { run_id, .. }
            | RunEvent::TextMessageEnd { run_id, .. }
            | RunEvent::ToolCallStart { run_id, .. }
            | RunEvent::ToolCallProgress { run_id, .. }
            | RunEvent::ToolCallEnd { run_id, .. }
            | RunEvent::ToolCallError { run_id, .. }
            | RunEvent::StateSync { run_id, .. }
            | RunEvent::StateUpdate { run_id, .. }
            | RunEvent::Error { run_id, .. } => run_id,
        }
    }
}
