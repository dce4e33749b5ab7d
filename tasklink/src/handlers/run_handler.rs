use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agents::{AgentCapability, CapabilityInput, Fragment, ToolRegistry};
use crate::config::RuntimeConfig;
use crate::errors::Error;
use crate::state::StateManager;
use tasklink_types::{ErrorDetail, Message, Role, RunCapabilities, RunEvent, RunRequest, RunStateSnapshot};

/// Drives single-turn runs over the run protocol: one request in, one
/// ordered event stream out.
///
/// Every stream opens with `run_started` and closes with exactly one of
/// `run_finished` or `run_failed`; nothing follows the terminal event.
/// Tool-call failures are reported per call and do not end the run.
/// State lives in a per-run [`StateManager`]; only the terminal snapshot
/// of the most recent run is retained, process-local, for `/runs/state`.
pub struct RunHandler {
    agent: Arc<dyn AgentCapability>,
    tools: Arc<ToolRegistry>,
    config: RuntimeConfig,
    last_state: Arc<RwLock<Option<RunStateSnapshot>>>,
}

impl RunHandler {
    pub fn new(
        agent: Arc<dyn AgentCapability>,
        tools: Arc<ToolRegistry>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            agent,
            tools,
            config,
            last_state: Arc::new(RwLock::new(None)),
        }
    }

    /// Static protocol descriptor for `/runs/capabilities`.
    pub fn capabilities(&self) -> RunCapabilities {
        RunCapabilities::default()
    }

    /// Terminal state snapshot of the most recent run, if any.
    pub async fn state_snapshot(&self) -> Option<RunStateSnapshot> {
        self.last_state.read().await.clone()
    }

    /// Execute one run, yielding its ordered event stream.
    pub fn stream(&self, request: RunRequest) -> BoxStream<'static, RunEvent> {
        let agent = Arc::clone(&self.agent);
        let tools = Arc::clone(&self.tools);
        let config = self.config.clone();
        let last_state = Arc::clone(&self.last_state);

        let stream = async_stream::stream! {
            let run_id = Uuid::new_v4().to_string();
            tracing::info!(run_id = %run_id, agent = agent.name(), "Run started");

            let mut state = StateManager::with_initial(
                config.state_history_cap,
                json!(request.context),
            );

            yield RunEvent::RunStarted { run_id: run_id.clone() };
            if request.include_state {
                yield RunEvent::StateSync {
                    run_id: run_id.clone(),
                    state: state.snapshot(),
                    version: state.version(),
                };
            }

            let message_id = Uuid::new_v4().to_string();
            yield RunEvent::TextMessageStart {
                run_id: run_id.clone(),
                message_id: message_id.clone(),
                role: Role::Assistant,
            };

            let input = CapabilityInput::new(
                vec![Message::user_text(request.message)],
                request.context,
            );
            let mut fragments = agent.stream(input);

            // One deadline for the whole invocation, not per fragment.
            let deadline = tokio::time::Instant::now() + config.invoke_timeout;
            loop {
                let next = tokio::time::timeout_at(deadline, fragments.next()).await;
                let fragment = match next {
                    Err(_elapsed) => {
                        let err = Error::AgentTimeout {
                            agent_id: agent.name().to_string(),
                            timeout_ms: config.invoke_timeout.as_millis() as u64,
                        };
                        Self::finish_failed(&last_state, &state, &run_id, err.to_detail())
                            .await;
                        yield RunEvent::RunFailed {
                            run_id: run_id.clone(),
                            error: err.to_detail(),
                        };
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(err))) => {
                        tracing::warn!(run_id = %run_id, %err, "Run failed");
                        Self::finish_failed(&last_state, &state, &run_id, err.to_detail())
                            .await;
                        yield RunEvent::RunFailed {
                            run_id: run_id.clone(),
                            error: err.to_detail(),
                        };
                        return;
                    }
                    Ok(Some(Ok(fragment))) => fragment,
                };

                match fragment {
                    Fragment::Text { text } => {
                        yield RunEvent::TextMessageContent {
                            run_id: run_id.clone(),
                            message_id: message_id.clone(),
                            delta: text,
                        };
                    }
                    Fragment::ToolCall { name, arguments } => {
                        let call_id = Uuid::new_v4().to_string();
                        yield RunEvent::ToolCallStart {
                            run_id: run_id.clone(),
                            call_id: call_id.clone(),
                            name: name.clone(),
                        };
                        // Dispatch acknowledgment carries the resolved
                        // arguments.
                        yield RunEvent::ToolCallProgress {
                            run_id: run_id.clone(),
                            call_id: call_id.clone(),
                            payload: arguments.clone(),
                        };

                        let outcome = match tools.get(&name) {
                            Ok(tool) => tool.call(arguments).await,
                            Err(err) => Err(err),
                        };
                        match outcome {
                            Ok(result) => {
                                // Dots in a tool name would split into
                                // nested path segments.
                                let path = format!("tools.{}", name.replace('.', "_"));
                                state.set(&path, result.clone());
                                yield RunEvent::ToolCallEnd {
                                    run_id: run_id.clone(),
                                    call_id,
                                    result: result.clone(),
                                };
                                yield RunEvent::StateUpdate {
                                    run_id: run_id.clone(),
                                    path,
                                    value: result,
                                    version: state.version(),
                                };
                            }
                            Err(err) => {
                                // Per-call failure only; the run goes on.
                                tracing::warn!(run_id = %run_id, tool = %name, %err, "Tool call failed");
                                yield RunEvent::ToolCallError {
                                    run_id: run_id.clone(),
                                    call_id,
                                    error: err.to_detail(),
                                };
                            }
                        }
                    }
                    Fragment::InputRequired => {
                        // Runs are single-turn; there is nothing to
                        // suspend into.
                        let error = ErrorDetail::new(
                            "input_required",
                            "agent requested additional input mid-run",
                        );
                        Self::finish_failed(&last_state, &state, &run_id, error.clone())
                            .await;
                        yield RunEvent::RunFailed {
                            run_id: run_id.clone(),
                            error,
                        };
                        return;
                    }
                }
            }

            yield RunEvent::TextMessageEnd {
                run_id: run_id.clone(),
                message_id,
            };
            if request.include_state {
                yield RunEvent::StateSync {
                    run_id: run_id.clone(),
                    state: state.snapshot(),
                    version: state.version(),
                };
            }

            *last_state.write().await = Some(RunStateSnapshot {
                state: state.snapshot(),
                version: state.version(),
            });
            tracing::info!(run_id = %run_id, version = state.version(), "Run finished");
            yield RunEvent::RunFinished { run_id };
        };

        stream.boxed()
    }

    async fn finish_failed(
        last_state: &RwLock<Option<RunStateSnapshot>>,
        state: &StateManager,
        run_id: &str,
        error: ErrorDetail,
    ) {
        tracing::warn!(run_id, kind = %error.kind, "Run terminated with failure");
        *last_state.write().await = Some(RunStateSnapshot {
            state: state.snapshot(),
            version: state.version(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ToolHandler;
    use crate::test_support::{DrippingAgent, EchoAgent, FailingAgent, ScriptedAgent, UppercaseTool};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    fn request(text: &str, include_state: bool) -> RunRequest {
        RunRequest {
            message: text.to_string(),
            context: HashMap::new(),
            include_state,
        }
    }

    async fn collect(handler: &RunHandler, request: RunRequest) -> Vec<RunEvent> {
        handler.stream(request).collect().await
    }

    fn handler_for(agent: Arc<dyn AgentCapability>) -> RunHandler {
        RunHandler::new(
            agent,
            Arc::new(ToolRegistry::new().register(Arc::new(UppercaseTool))),
            RuntimeConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_happy_path_ordering() {
        let handler = handler_for(Arc::new(EchoAgent::default()));
        let events = collect(&handler, request("hi", false)).await;

        let types: Vec<&str> = events
            .iter()
            .map(|e| match e {
                RunEvent::RunStarted { .. } => "run_started",
                RunEvent::TextMessageStart { .. } => "text_message_start",
                RunEvent::TextMessageContent { .. } => "text_message_content",
                RunEvent::TextMessageEnd { .. } => "text_message_end",
                RunEvent::RunFinished { .. } => "run_finished",
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(
            types,
            vec![
                "run_started",
                "text_message_start",
                "text_message_content",
                "text_message_content",
                "text_message_end",
                "run_finished",
            ]
        );

        // Every event carries the same run id.
        let run_id = events[0].run_id().to_string();
        assert!(events.iter().all(|e| e.run_id() == run_id));
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_state_sync_bookends_when_requested() {
        let handler = handler_for(Arc::new(EchoAgent::default()));
        let mut context = HashMap::new();
        context.insert("user".to_string(), json!("ada"));
        let events = collect(
            &handler,
            RunRequest {
                message: "hi".to_string(),
                context,
                include_state: true,
            },
        )
        .await;

        let syncs: Vec<&RunEvent> = events
            .iter()
            .filter(|e| matches!(e, RunEvent::StateSync { .. }))
            .collect();
        assert_eq!(syncs.len(), 2);
        if let RunEvent::StateSync { state, version, .. } = syncs[0] {
            assert_eq!(state, &json!({"user": "ada"}));
            assert_eq!(*version, 0);
        }

        let snapshot = handler.state_snapshot().await.unwrap();
        assert_eq!(snapshot.state, json!({"user": "ada"}));
    }

    #[tokio::test]
    async fn test_tool_call_updates_state() {
        let script = vec![
            Ok(Fragment::Text {
                text: "calling".to_string(),
            }),
            Ok(Fragment::ToolCall {
                name: "uppercase".to_string(),
                arguments: json!({"text": "hi"}),
            }),
        ];
        let handler = handler_for(Arc::new(ScriptedAgent::new("scripted", script)));
        let events = collect(&handler, request("go", false)).await;

        let end = events
            .iter()
            .find_map(|e| match e {
                RunEvent::ToolCallEnd { result, .. } => Some(result.clone()),
                _ => None,
            })
            .expect("tool_call_end missing");
        assert_eq!(end, json!({"text": "HI"}));

        let update = events
            .iter()
            .find_map(|e| match e {
                RunEvent::StateUpdate { path, value, version, .. } => {
                    Some((path.clone(), value.clone(), *version))
                }
                _ => None,
            })
            .expect("state_update missing");
        assert_eq!(update.0, "tools.uppercase");
        assert_eq!(update.1, json!({"text": "HI"}));
        assert_eq!(update.2, 1);

        assert!(matches!(events.last(), Some(RunEvent::RunFinished { .. })));
        let snapshot = handler.state_snapshot().await.unwrap();
        assert_eq!(snapshot.state, json!({"tools": {"uppercase": {"text": "HI"}}}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recoverable() {
        let script = vec![
            Ok(Fragment::ToolCall {
                name: "missing".to_string(),
                arguments: json!({}),
            }),
            Ok(Fragment::Text {
                text: "moving on".to_string(),
            }),
        ];
        let handler = handler_for(Arc::new(ScriptedAgent::new("scripted", script)));
        let events = collect(&handler, request("go", false)).await;

        let error = events
            .iter()
            .find_map(|e| match e {
                RunEvent::ToolCallError { error, .. } => Some(error.clone()),
                _ => None,
            })
            .expect("tool_call_error missing");
        assert_eq!(error.kind, "tool_not_found");

        // The run continued past the failed call and finished cleanly.
        assert!(events.iter().any(
            |e| matches!(e, RunEvent::TextMessageContent { delta, .. } if delta == "moving on")
        ));
        assert!(matches!(events.last(), Some(RunEvent::RunFinished { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_whole_invocation() {
        let handler = RunHandler::new(
            Arc::new(DrippingAgent {
                interval: Duration::from_millis(100),
                chunks: 10,
            }),
            Arc::new(ToolRegistry::new()),
            RuntimeConfig {
                invoke_timeout: Duration::from_millis(120),
                ..RuntimeConfig::default()
            },
        );

        let events = collect(&handler, request("hi", false)).await;

        // Only the delta produced before the deadline gets through.
        let deltas = events
            .iter()
            .filter(|e| matches!(e, RunEvent::TextMessageContent { .. }))
            .count();
        assert_eq!(deltas, 1);
        assert!(matches!(events.last(), Some(RunEvent::RunFailed { error, .. })
            if error.kind == "timeout"));
    }

    /// Tool whose name carries a path separator.
    struct DottedTool;

    #[async_trait]
    impl ToolHandler for DottedTool {
        fn name(&self) -> &str {
            "geo.lookup"
        }

        async fn call(&self, _arguments: serde_json::Value) -> crate::Result<serde_json::Value> {
            Ok(json!({"city": "Berlin"}))
        }
    }

    #[tokio::test]
    async fn test_dotted_tool_name_stays_single_state_key() {
        let script = vec![Ok(Fragment::ToolCall {
            name: "geo.lookup".to_string(),
            arguments: json!({}),
        })];
        let handler = RunHandler::new(
            Arc::new(ScriptedAgent::new("scripted", script)),
            Arc::new(ToolRegistry::new().register(Arc::new(DottedTool))),
            RuntimeConfig::default(),
        );

        let events = collect(&handler, request("go", false)).await;
        let update = events
            .iter()
            .find_map(|e| match e {
                RunEvent::StateUpdate { path, .. } => Some(path.clone()),
                _ => None,
            })
            .expect("state_update missing");
        assert_eq!(update, "tools.geo_lookup");

        // The dot did not split into a nested subtree.
        let snapshot = handler.state_snapshot().await.unwrap();
        assert_eq!(
            snapshot.state,
            json!({"tools": {"geo_lookup": {"city": "Berlin"}}})
        );
    }

    #[tokio::test]
    async fn test_agent_failure_ends_with_single_run_failed() {
        let handler = handler_for(Arc::new(FailingAgent::default()));
        let events = collect(&handler, request("hi", false)).await;

        // The partial delta before the failure is still delivered.
        assert!(events
            .iter()
            .any(|e| matches!(e, RunEvent::TextMessageContent { .. })));

        let failed: Vec<&RunEvent> = events
            .iter()
            .filter(|e| matches!(e, RunEvent::RunFailed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(events.last(), Some(RunEvent::RunFailed { error, .. })
            if error.kind == "agent_execution" && !error.message.contains("stack trace")));
        assert!(!events
            .iter()
            .any(|e| matches!(e, RunEvent::RunFinished { .. })));
    }
}
