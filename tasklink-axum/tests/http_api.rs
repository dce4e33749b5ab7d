//! HTTP-level flows through the full router, driven with tower's
//! `oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;

use tasklink::test_support::{EchoAgent, UppercaseTool};
use tasklink::types::{CreateTaskRequest, Message, Task};
use tasklink_axum::TaskServer;

fn demo_router() -> Router {
    TaskServer::builder()
        .register_agent(Arc::new(EchoAgent::default()))
        .register_tool(Arc::new(UppercaseTool))
        .with_card("demo", "Demo tasklink server", "0.1.0")
        .build()
        .expect("server builds")
        .into_router()
}

fn json_request(method: &str, uri: &str, body: &impl serde::Serialize) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_body(text: &str, stream: bool) -> CreateTaskRequest {
    CreateTaskRequest {
        agent_id: "echo".to_string(),
        message: Message::user_text(text),
        context: Default::default(),
        stream,
    }
}

#[tokio::test]
async fn test_create_task_blocking_completes() {
    let app = demo_router();

    let response = app
        .oneshot(json_request("POST", "/tasks", &create_body("hi", false)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["agentId"], "echo");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert!(body["completedAt"].is_string());

    let task: Task = serde_json::from_value(body).unwrap();
    assert_eq!(task.messages[1].text(), "echo: hi");
}

#[tokio::test]
async fn test_append_to_completed_task_conflicts() {
    let app = demo_router();

    let created = body_json(
        app.clone()
            .oneshot(json_request("POST", "/tasks", &create_body("hi", false)))
            .await
            .unwrap(),
    )
    .await;
    let task_id = created["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/tasks/{task_id}/messages"),
            &Message::user_text("one more"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error = body_json(response).await;
    assert_eq!(error["error"]["kind"], "task_terminal");

    // The stored record is unchanged.
    let fetched = body_json(
        app.oneshot(get_request(&format!("/tasks/{task_id}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(fetched["messages"].as_array().unwrap().len(), 2);
    assert_eq!(fetched["status"], "completed");
}

#[tokio::test]
async fn test_unknown_task_is_404() {
    let app = demo_router();

    let response = app.oneshot(get_request("/tasks/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error = body_json(response).await;
    assert_eq!(error["error"]["kind"], "task_not_found");
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let app = demo_router();
    for text in ["a", "b"] {
        app.clone()
            .oneshot(json_request("POST", "/tasks", &create_body(text, false)))
            .await
            .unwrap();
    }

    let body = body_json(
        app.clone()
            .oneshot(get_request("/tasks?status=completed"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let none = body_json(
        app.oneshot(get_request("/tasks?status=working"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(none["total"], 0);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let app = demo_router();
    let created = body_json(
        app.clone()
            .oneshot(json_request("POST", "/tasks", &create_body("hi", false)))
            .await
            .unwrap(),
    )
    .await;
    let task_id = created["id"].as_str().unwrap().to_string();

    let first = body_json(
        app.clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/tasks/{task_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first["deleted"], true);

    let second = body_json(
        app.oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/tasks/{task_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap(),
    )
    .await;
    assert_eq!(second["deleted"], false);
}

#[tokio::test]
async fn test_streaming_create_emits_sse_events() {
    let app = demo_router();

    let response = app
        .oneshot(json_request("POST", "/tasks", &create_body("hi", true)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let events: Vec<serde_json::Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|payload| serde_json::from_str(payload).unwrap())
        .collect();
    assert!(!events.is_empty());
    assert_eq!(events[0]["type"], "status");
    assert_eq!(events[0]["status"], "working");
    assert_eq!(events.last().unwrap()["type"], "complete");
    assert_eq!(events.last().unwrap()["task"]["status"], "completed");
}

#[tokio::test]
async fn test_agent_card_discovery() {
    let app = demo_router();

    let body = body_json(
        app.oneshot(get_request("/.well-known/agent-card"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["name"], "demo");
    assert_eq!(body["version"], "0.1.0");
    assert_eq!(body["capabilities"]["streaming"], true);
    assert_eq!(body["capabilities"]["taskManagement"], true);
    assert_eq!(body["skills"][0]["name"], "echo");
}

#[tokio::test]
async fn test_run_protocol_endpoints() {
    let app = demo_router();

    // No run has finished yet.
    let response = app.clone().oneshot(get_request("/runs/state")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let capabilities = body_json(
        app.clone()
            .oneshot(get_request("/runs/capabilities"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(capabilities["eventTypes"].as_array().unwrap().len(), 13);
    assert!(capabilities["endpoints"]
        .as_array()
        .unwrap()
        .contains(&serde_json::json!("/runs/stream")));

    let response = app
        .oneshot(json_request(
            "POST",
            "/runs/stream",
            &serde_json::json!({"message": "hi"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let events: Vec<serde_json::Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|payload| serde_json::from_str(payload).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["type"], "run_started");
    assert_eq!(events.last().unwrap()["type"], "run_finished");
    assert!(events
        .iter()
        .any(|e| e["type"] == "text_message_content" && e["delta"] == "echo: "));
}
