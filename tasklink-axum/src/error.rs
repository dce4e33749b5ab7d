use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] tasklink::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No run has completed yet")]
    NoRunState,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        use tasklink::Error as Core;

        let (status, kind, message) = match &self {
            Error::Core(core) => match core {
                Core::TaskNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "task_not_found", core.to_string())
                }
                Core::AgentNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "agent_not_found", core.to_string())
                }
                Core::ToolNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "tool_not_found", core.to_string())
                }
                Core::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "invalid_transition", core.to_string())
                }
                Core::TaskTerminal { .. } => {
                    (StatusCode::CONFLICT, "task_terminal", core.to_string())
                }
                Core::TaskBusy { .. } => (StatusCode::CONFLICT, "task_busy", core.to_string()),
                Core::Validation { .. } => {
                    (StatusCode::BAD_REQUEST, "validation", core.to_string())
                }
                Core::StoreUnavailable { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "store_unavailable",
                    "task store unavailable".to_string(),
                ),
                // Internal details never reach the wire.
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    core.to_detail().message,
                ),
            },
            Error::Json(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_json",
                "request body is not valid JSON".to_string(),
            ),
            Error::NoRunState => (
                StatusCode::NOT_FOUND,
                "no_run_state",
                "no run has completed yet".to_string(),
            ),
        };

        let body = json!({
            "error": {
                "kind": kind,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}
