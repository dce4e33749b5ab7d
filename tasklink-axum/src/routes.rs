use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{sse, IntoResponse, Response, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use std::{convert::Infallible, sync::Arc, time::Duration};

use crate::error::Result;
use tasklink::handlers::{RunHandler, TaskHandler};
use tasklink::types::{
    AgentCard, CreateTaskRequest, DeleteTaskResponse, ListTasksQuery, ListTasksResponse, Message,
    RunCapabilities, RunRequest, RunStateSnapshot, Task, TaskFilter,
};

/// State shared across all routes.
#[derive(Clone)]
pub struct ServerState {
    pub tasks: Arc<TaskHandler>,
    pub runs: Arc<RunHandler>,
    pub agent_card: Arc<AgentCard>,
}

/// Build the full protocol router.
pub fn create_routes(state: ServerState) -> Router {
    Router::new()
        // Task protocol
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:id", get(get_task).delete(delete_task))
        .route("/tasks/:id/messages", post(append_message))
        .route("/tasks/:id/cancel", post(cancel_task))
        // Discovery
        .route("/.well-known/agent-card", get(agent_card))
        // Run protocol
        .route("/runs/stream", post(run_stream))
        .route("/runs/state", get(run_state))
        .route("/runs/capabilities", get(run_capabilities))
        .with_state(state)
}

/// `POST /tasks`: blocking Task JSON by default, SSE when the body sets
/// `stream: true`.
async fn create_task(
    State(state): State<ServerState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Response> {
    if request.stream {
        let events = state.tasks.create_task_streaming(request)?;
        Ok(event_stream(events).into_response())
    } else {
        let task = state.tasks.create_task(request).await?;
        Ok((StatusCode::CREATED, Json(task)).into_response())
    }
}

async fn get_task(
    State(state): State<ServerState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>> {
    Ok(Json(state.tasks.get_task(&task_id).await?))
}

async fn list_tasks(
    State(state): State<ServerState>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<ListTasksResponse>> {
    let filter = TaskFilter {
        agent_id: query.agent_id,
        status: query.status,
    };
    let page = state
        .tasks
        .list_tasks(&filter, query.limit, query.offset)
        .await?;
    Ok(Json(ListTasksResponse {
        items: page.items,
        total: page.total,
    }))
}

async fn append_message(
    State(state): State<ServerState>,
    Path(task_id): Path<String>,
    Json(message): Json<Message>,
) -> Result<Json<Task>> {
    Ok(Json(state.tasks.append_message(&task_id, message).await?))
}

async fn cancel_task(
    State(state): State<ServerState>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>> {
    Ok(Json(state.tasks.cancel_task(&task_id).await?))
}

async fn delete_task(
    State(state): State<ServerState>,
    Path(task_id): Path<String>,
) -> Result<Json<DeleteTaskResponse>> {
    let deleted = state.tasks.delete_task(&task_id).await?;
    Ok(Json(DeleteTaskResponse { deleted }))
}

/// Discovery document, derived once at startup from the registry.
async fn agent_card(State(state): State<ServerState>) -> Json<AgentCard> {
    Json(state.agent_card.as_ref().clone())
}

/// `POST /runs/stream` (SSE).
async fn run_stream(
    State(state): State<ServerState>,
    Json(request): Json<RunRequest>,
) -> Sse<impl Stream<Item = std::result::Result<sse::Event, Infallible>>> {
    event_stream(state.runs.stream(request))
}

async fn run_state(State(state): State<ServerState>) -> Result<Json<RunStateSnapshot>> {
    let snapshot = state
        .runs
        .state_snapshot()
        .await
        .ok_or(crate::error::Error::NoRunState)?;
    Ok(Json(snapshot))
}

async fn run_capabilities(State(state): State<ServerState>) -> Json<RunCapabilities> {
    Json(state.runs.capabilities())
}

/// One `data: <json>` frame per event, with a periodic keep-alive
/// comment; the stream closes after its terminal event.
fn event_stream<S, E>(events: S) -> Sse<impl Stream<Item = std::result::Result<sse::Event, Infallible>>>
where
    S: Stream<Item = E> + Send + 'static,
    E: serde::Serialize,
{
    let sse_stream = events.map(|event| {
        Ok::<_, Infallible>(
            sse::Event::default().data(serde_json::to_string(&event).unwrap_or_default()),
        )
    });
    Sse::new(sse_stream).keep_alive(
        sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    )
}
