use tasklink_types::{ErrorDetail, TaskState};

/// Main error type for the tasklink runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // === Task lifecycle errors ===
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Invalid task state transition: {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("Task is in terminal state {status}: {task_id}")]
    TaskTerminal { task_id: String, status: TaskState },

    #[error("Task already has an active execution: {task_id}")]
    TaskBusy { task_id: String },

    // === Agent capability errors ===
    #[error("Agent not registered: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("Agent execution failed ({agent_id}): {reason}")]
    AgentExecution { agent_id: String, reason: String },

    #[error("Agent invocation timed out: {agent_id} after {timeout_ms}ms")]
    AgentTimeout { agent_id: String, timeout_ms: u64 },

    // === Tool errors ===
    #[error("Tool not registered: {tool_name}")]
    ToolNotFound { tool_name: String },

    #[error("Tool call failed: {tool_name}: {reason}")]
    ToolCallFailed { tool_name: String, reason: String },

    // === Store errors ===
    #[error("Task store unavailable: {operation}: {reason}")]
    StoreUnavailable { operation: String, reason: String },

    // === General ===
    #[error("Validation error: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Internal error: {component}: {reason}")]
    Internal { component: String, reason: String },
}

impl Error {
    /// Check if this error is retryable.
    ///
    /// Only read-side store failures qualify: retrying a non-idempotent
    /// write could duplicate a mutation, so callers see those and retry
    /// the whole operation themselves.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::TaskNotFound { .. }
            | Self::InvalidTransition { .. }
            | Self::TaskTerminal { .. }
            | Self::TaskBusy { .. } => "task",

            Self::AgentNotFound { .. }
            | Self::AgentExecution { .. }
            | Self::AgentTimeout { .. } => "agent",

            Self::ToolNotFound { .. } | Self::ToolCallFailed { .. } => "tool",

            Self::StoreUnavailable { .. } => "store",

            Self::Validation { .. } | Self::Serialization { .. } | Self::Internal { .. } => {
                "system"
            }
        }
    }

    /// Sanitized detail safe to persist on a task or push over a stream.
    ///
    /// Carries the error kind and a fixed phrase, never raw internal
    /// error text.
    pub fn to_detail(&self) -> ErrorDetail {
        match self {
            Self::AgentTimeout { timeout_ms, .. } => ErrorDetail::new(
                "timeout",
                format!("agent invocation exceeded {timeout_ms}ms deadline"),
            ),
            Self::AgentExecution { .. } => {
                ErrorDetail::new("agent_execution", "agent execution failed")
            }
            Self::AgentNotFound { agent_id } => {
                ErrorDetail::new("agent_not_found", format!("unknown agent: {agent_id}"))
            }
            Self::ToolNotFound { tool_name } => {
                ErrorDetail::new("tool_not_found", format!("unknown tool: {tool_name}"))
            }
            Self::ToolCallFailed { tool_name, .. } => {
                ErrorDetail::new("tool_call", format!("tool call failed: {tool_name}"))
            }
            Self::StoreUnavailable { .. } => {
                ErrorDetail::new("store_unavailable", "task store unavailable")
            }
            _ => ErrorDetail::new(self.category(), "internal error"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization {
            reason: error.to_string(),
        }
    }
}

/// Convenience type alias.
pub type Result<T> = std::result::Result<T, Error>;
