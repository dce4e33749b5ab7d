use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentRegistry, CapabilityInput, Fragment};
use crate::config::RuntimeConfig;
use crate::errors::{Error, Result};
use crate::task::TaskManager;
use tasklink_types::{
    CreateTaskRequest, Message, Task, TaskFilter, TaskPage, TaskState, TaskStreamEvent,
};

/// Drives tasks through their lifecycle against the external agent
/// capability, translating progress into task-protocol stream events.
///
/// At most one execution is active per task id: a second create/resume
/// against a `working` task is rejected with `TaskBusy` rather than
/// silently queued. A consumer abandoning the stream does not cancel
/// the task — execution continues to a terminal status so a later get
/// reflects the true outcome; only the explicit cancel operation stops
/// the work.
pub struct TaskHandler {
    manager: Arc<TaskManager>,
    registry: Arc<AgentRegistry>,
    active: Arc<DashMap<String, CancellationToken>>,
    config: RuntimeConfig,
}

/// Removes the busy-guard entry when an execution finishes, however it
/// finishes.
struct ExecutionGuard {
    active: Arc<DashMap<String, CancellationToken>>,
    task_id: String,
    token: CancellationToken,
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.active.remove(&self.task_id);
    }
}

impl TaskHandler {
    pub fn new(
        manager: Arc<TaskManager>,
        registry: Arc<AgentRegistry>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            manager,
            registry,
            active: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Create a task and drive it to a terminal (or suspended) status,
    /// returning the final snapshot. Blocking counterpart of
    /// [`create_task_streaming`](Self::create_task_streaming).
    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<Task> {
        // Validate the agent before allocating a task id.
        self.registry.get(&request.agent_id)?;
        let task = self
            .manager
            .create_task(request.agent_id, request.message, request.context)
            .await?;
        self.execute(&task.id, None).await
    }

    /// Create a task and return a live event stream; execution runs in
    /// the background and reaches a terminal status even if the stream
    /// is abandoned.
    pub fn create_task_streaming(
        self: &Arc<Self>,
        request: CreateTaskRequest,
    ) -> Result<ReceiverStream<TaskStreamEvent>> {
        self.registry.get(&request.agent_id)?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let handler = Arc::clone(self);
        tokio::spawn(async move {
            let task = match handler
                .manager
                .create_task(request.agent_id, request.message, request.context)
                .await
            {
                Ok(task) => task,
                Err(err) => {
                    tracing::error!(%err, "Failed to create task for streaming request");
                    return;
                }
            };
            if let Err(err) = handler.execute(&task.id, Some(events_tx)).await {
                tracing::warn!(task_id = %task.id, %err, "Streaming execution ended with error");
            }
        });

        Ok(ReceiverStream::new(events_rx))
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.manager.get_task(task_id).await
    }

    pub async fn list_tasks(
        &self,
        filter: &TaskFilter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<TaskPage> {
        self.manager.list_tasks(filter, limit, offset).await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<bool> {
        self.manager.delete_task(task_id).await
    }

    /// Append a message. On an `input_required` task this also resumes
    /// execution and returns the post-execution snapshot; otherwise the
    /// updated task is returned as-is.
    pub async fn append_message(&self, task_id: &str, message: Message) -> Result<Task> {
        let before = self.manager.get_task(task_id).await?;
        if before.status != TaskState::InputRequired {
            return self.manager.append_message(task_id, message).await;
        }
        // Take the execution slot before touching the task: a `TaskBusy`
        // must mean nothing was appended, so a retry cannot duplicate
        // the message.
        let guard = self.begin_execution(task_id)?;
        self.manager.append_message(task_id, message).await?;
        self.run_execution(guard, task_id, None).await
    }

    /// Explicitly cancel a task: signals the in-flight invocation (if
    /// any, best-effort) and transitions to `cancelled`.
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task> {
        if let Some(entry) = self.active.get(task_id) {
            entry.value().cancel();
        }
        // The executor may race us to the same transition; the store
        // treats the replay as a no-op.
        self.manager.cancel_task(task_id).await
    }

    fn begin_execution(&self, task_id: &str) -> Result<ExecutionGuard> {
        use dashmap::mapref::entry::Entry;
        match self.active.entry(task_id.to_string()) {
            Entry::Occupied(_) => Err(Error::TaskBusy {
                task_id: task_id.to_string(),
            }),
            Entry::Vacant(vacant) => {
                let token = CancellationToken::new();
                vacant.insert(token.clone());
                Ok(ExecutionGuard {
                    active: Arc::clone(&self.active),
                    task_id: task_id.to_string(),
                    token,
                })
            }
        }
    }

    /// Run the agent for one task until a terminal status (or an
    /// `input_required` suspension), emitting stream events when a
    /// channel is given. Send failures are ignored: an abandoned
    /// consumer must not stop the task short of a terminal status.
    async fn execute(
        &self,
        task_id: &str,
        events: Option<mpsc::Sender<TaskStreamEvent>>,
    ) -> Result<Task> {
        let guard = self.begin_execution(task_id)?;
        self.run_execution(guard, task_id, events).await
    }

    async fn run_execution(
        &self,
        guard: ExecutionGuard,
        task_id: &str,
        events: Option<mpsc::Sender<TaskStreamEvent>>,
    ) -> Result<Task> {
        let emitter = Emitter {
            task_id: task_id.to_string(),
            events,
        };

        let task = self.manager.transition(task_id, TaskState::Working, None).await?;
        emitter.status(TaskState::Working).await;

        let agent = self.registry.get(&task.agent_id)?;
        let input = CapabilityInput::new(task.messages.clone(), task.context.clone());

        let mut stream = agent.stream(input);
        let mut assembled = String::new();
        // One deadline for the whole invocation, not per fragment.
        let deadline = tokio::time::Instant::now() + self.config.invoke_timeout;
        loop {
            let next = tokio::select! {
                _ = guard.token.cancelled() => {
                    tracing::info!(task_id, "Task cancelled mid-execution");
                    let task = self
                        .manager
                        .transition(task_id, TaskState::Cancelled, None)
                        .await?;
                    emitter.status(TaskState::Cancelled).await;
                    return Ok(task);
                }
                next = tokio::time::timeout_at(deadline, stream.next()) => next,
            };

            match next {
                Err(_elapsed) => {
                    let err = Error::AgentTimeout {
                        agent_id: task.agent_id.clone(),
                        timeout_ms: self.config.invoke_timeout.as_millis() as u64,
                    };
                    return self.fail(task_id, err, &emitter).await;
                }
                Ok(None) => break,
                Ok(Some(Err(err))) => {
                    return self.fail(task_id, err, &emitter).await;
                }
                Ok(Some(Ok(Fragment::Text { text }))) => {
                    assembled.push_str(&text);
                    emitter
                        .message(Message::assistant_text(text), true)
                        .await;
                }
                Ok(Some(Ok(Fragment::ToolCall { name, .. }))) => {
                    // Tool orchestration belongs to the run protocol;
                    // the task protocol records nothing for it.
                    tracing::debug!(task_id, tool = %name, "Ignoring tool-call fragment");
                }
                Ok(Some(Ok(Fragment::InputRequired))) => {
                    let task = self
                        .manager
                        .transition(task_id, TaskState::InputRequired, None)
                        .await?;
                    emitter.status(TaskState::InputRequired).await;
                    return Ok(task);
                }
            }
        }

        let final_message = Message::assistant_text(assembled);
        self.manager
            .append_message(task_id, final_message.clone())
            .await?;
        emitter.message(final_message, false).await;

        let task = self
            .manager
            .transition(task_id, TaskState::Completed, None)
            .await?;
        emitter.status(TaskState::Completed).await;
        emitter.complete(task.clone()).await;
        Ok(task)
    }

    /// Record a sanitized failure on the task and emit the terminal
    /// error event. The raw error never leaves the handler boundary.
    async fn fail(&self, task_id: &str, err: Error, emitter: &Emitter) -> Result<Task> {
        tracing::warn!(task_id, category = err.category(), %err, "Task execution failed");
        let detail = err.to_detail();
        let task = self
            .manager
            .transition(task_id, TaskState::Failed, Some(detail.clone()))
            .await?;
        emitter.status(TaskState::Failed).await;
        emitter.error(detail).await;
        Ok(task)
    }
}

/// Pushes stream events, swallowing send failures from disconnected
/// consumers.
struct Emitter {
    task_id: String,
    events: Option<mpsc::Sender<TaskStreamEvent>>,
}

impl Emitter {
    async fn emit(&self, event: TaskStreamEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event).await;
        }
    }

    async fn status(&self, status: TaskState) {
        self.emit(TaskStreamEvent::Status {
            task_id: self.task_id.clone(),
            status,
            is_final: status.is_terminal(),
        })
        .await;
    }

    async fn message(&self, message: Message, partial: bool) {
        self.emit(TaskStreamEvent::Message {
            task_id: self.task_id.clone(),
            message,
            partial,
        })
        .await;
    }

    async fn complete(&self, task: Task) {
        self.emit(TaskStreamEvent::Complete {
            task_id: self.task_id.clone(),
            task,
        })
        .await;
    }

    async fn error(&self, error: tasklink_types::ErrorDetail) {
        self.emit(TaskStreamEvent::Error {
            task_id: self.task_id.clone(),
            error,
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentCapability, CapabilityOutput};
    use crate::test_support::{DrippingAgent, EchoAgent, StallingAgent};
    use crate::task::InMemoryTaskStore;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::collections::HashMap;
    use std::time::Duration;

    fn handler_with(registry: AgentRegistry, config: RuntimeConfig) -> Arc<TaskHandler> {
        let store = Arc::new(InMemoryTaskStore::new(config.task_ttl));
        let manager = Arc::new(TaskManager::new(store, config.clone()));
        Arc::new(TaskHandler::new(manager, Arc::new(registry), config))
    }

    fn echo_request(text: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            agent_id: "echo".to_string(),
            message: Message::user_text(text),
            context: HashMap::new(),
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_unknown_agent_rejected_before_create() {
        let handler = handler_with(AgentRegistry::new(), RuntimeConfig::default());
        let err = handler.create_task(echo_request("hi")).await.unwrap_err();
        assert!(matches!(err, Error::AgentNotFound { .. }));

        let page = handler
            .list_tasks(&TaskFilter::default(), None, None)
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_busy_guard_rejects_second_execution() {
        let registry = AgentRegistry::new().register(Arc::new(StallingAgent));
        let config = RuntimeConfig::default();
        let handler = handler_with(registry, config);

        let task = handler
            .manager()
            .create_task("stalling", Message::user_text("hi"), HashMap::new())
            .await
            .unwrap();

        let background = {
            let handler = Arc::clone(&handler);
            let task_id = task.id.clone();
            tokio::spawn(async move { handler.execute(&task_id, None).await })
        };

        // Wait for the background execution to take the guard.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let err = handler.execute(&task.id, None).await.unwrap_err();
        assert!(matches!(err, Error::TaskBusy { .. }));

        handler.cancel_task(&task.id).await.unwrap();
        let finished = background.await.unwrap().unwrap();
        assert_eq!(finished.status, TaskState::Cancelled);

        // The guard is released after cancellation.
        assert!(handler.active.get(&task.id).is_none());
    }

    #[tokio::test]
    async fn test_timeout_marks_task_failed() {
        let registry = AgentRegistry::new().register(Arc::new(StallingAgent));
        let config = RuntimeConfig {
            invoke_timeout: std::time::Duration::from_millis(20),
            ..RuntimeConfig::default()
        };
        let handler = handler_with(registry, config);

        let task = handler
            .create_task(CreateTaskRequest {
                agent_id: "stalling".to_string(),
                message: Message::user_text("hi"),
                context: HashMap::new(),
                stream: false,
            })
            .await
            .unwrap();

        assert_eq!(task.status, TaskState::Failed);
        assert_eq!(task.error.as_ref().unwrap().kind, "timeout");
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_echo_completes_with_two_messages() {
        let registry = AgentRegistry::new().register(Arc::new(EchoAgent::default()));
        let handler = handler_with(registry, RuntimeConfig::default());

        let task = handler.create_task(echo_request("hi")).await.unwrap();
        assert_eq!(task.status, TaskState::Completed);
        assert_eq!(task.messages.len(), 2);
        assert_eq!(task.messages[1].text(), "echo: hi");
        assert!(task.completed_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_whole_invocation() {
        // Fragments arriving just under the per-read gap must not
        // extend the invocation past the configured deadline.
        let registry = AgentRegistry::new().register(Arc::new(DrippingAgent {
            interval: Duration::from_millis(100),
            chunks: 10,
        }));
        let config = RuntimeConfig {
            invoke_timeout: Duration::from_millis(120),
            ..RuntimeConfig::default()
        };
        let handler = handler_with(registry, config);

        let started = tokio::time::Instant::now();
        let task = handler
            .create_task(CreateTaskRequest {
                agent_id: "dripping".to_string(),
                message: Message::user_text("hi"),
                context: HashMap::new(),
                stream: false,
            })
            .await
            .unwrap();

        assert_eq!(task.status, TaskState::Failed);
        assert_eq!(task.error.as_ref().unwrap().kind, "timeout");
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    /// Suspends at `input_required` on every invocation.
    struct SuspendingAgent;

    #[async_trait]
    impl AgentCapability for SuspendingAgent {
        fn name(&self) -> &str {
            "suspending"
        }

        async fn invoke(&self, _input: CapabilityInput) -> Result<CapabilityOutput> {
            futures::future::pending().await
        }

        fn stream(&self, _input: CapabilityInput) -> BoxStream<'static, Result<Fragment>> {
            futures::stream::iter(vec![Ok(Fragment::InputRequired)]).boxed()
        }
    }

    #[tokio::test]
    async fn test_busy_resume_rejects_before_appending() {
        let registry = AgentRegistry::new().register(Arc::new(SuspendingAgent));
        let handler = handler_with(registry, RuntimeConfig::default());

        let task = handler
            .create_task(CreateTaskRequest {
                agent_id: "suspending".to_string(),
                message: Message::user_text("start"),
                context: HashMap::new(),
                stream: false,
            })
            .await
            .unwrap();
        assert_eq!(task.status, TaskState::InputRequired);

        // Another resume holds the execution slot for this task.
        handler
            .active
            .insert(task.id.clone(), CancellationToken::new());

        let err = handler
            .append_message(&task.id, Message::user_text("resume"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TaskBusy { .. }));

        // The rejected message was never appended, so a retry cannot
        // duplicate it.
        let snapshot = handler.get_task(&task.id).await.unwrap();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].text(), "start");

        // Once the slot frees, the same append goes through.
        handler.active.remove(&task.id);
        let resumed = handler
            .append_message(&task.id, Message::user_text("resume"))
            .await
            .unwrap();
        assert_eq!(resumed.status, TaskState::InputRequired);
        assert_eq!(resumed.messages.len(), 2);
        assert_eq!(resumed.messages[1].text(), "resume");
    }
}
