use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Message, TaskState};

/// Body of `POST /tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    pub message: Message,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
    /// `true` requests a `text/event-stream` response instead of a
    /// blocking Task JSON body.
    #[serde(default)]
    pub stream: bool,
}

/// Query parameters of `GET /tasks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTasksQuery {
    #[serde(rename = "agentId", skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// Body of the `GET /tasks` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResponse {
    pub items: Vec<crate::Task>,
    pub total: usize,
}

/// Body of the `DELETE /tasks/{id}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTaskResponse {
    pub deleted: bool,
}

/// Body of `POST /runs/stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
    /// Emit `state_sync` snapshots at run start and end.
    #[serde(rename = "includeState", default)]
    pub include_state: bool,
}

/// Body of the `GET /runs/state` response: terminal state of the most
/// recent run, process-local only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStateSnapshot {
    pub state: serde_json::Value,
    pub version: u64,
}

/// Static descriptor served at `GET /runs/capabilities`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCapabilities {
    #[serde(rename = "eventTypes")]
    pub event_types: Vec<String>,
    pub endpoints: Vec<String>,
}

impl Default for RunCapabilities {
    fn default() -> Self {
        Self {
            event_types: [
                "run_started",
                "run_finished",
                "run_failed",
                "text_message_start",
                "text_message_content",
                "text_message_end",
                "tool_call_start",
                "tool_call_progress",
                "tool_call_end",
                "tool_call_error",
                "state_sync",
                "state_update",
                "error",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            endpoints: ["/runs/stream", "/runs/state", "/runs/capabilities"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}
