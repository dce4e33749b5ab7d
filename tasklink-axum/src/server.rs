use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::error::{Error, Result};
use crate::routes::{create_routes, ServerState};
use tasklink::agents::{AgentCapability, AgentRegistry, ToolHandler, ToolRegistry};
use tasklink::config::RuntimeConfig;
use tasklink::handlers::{RunHandler, TaskHandler};
use tasklink::task::{InMemoryTaskStore, TaskManager, TaskStore};

/// Protocol server hosting the task and run endpoints for a set of
/// registered agent capabilities.
pub struct TaskServer {
    state: ServerState,
    config: RuntimeConfig,
    /// Set when the server owns the in-memory store and should sweep
    /// expired records itself.
    sweep_store: Option<Arc<InMemoryTaskStore>>,
}

impl TaskServer {
    pub fn builder() -> TaskServerBuilder {
        TaskServerBuilder::new()
    }

    fn display_server_info(&self, local_addr: &std::net::SocketAddr) {
        let card = &self.state.agent_card;
        tracing::info!("🚀 Tasklink Server Starting");
        tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        tracing::info!("📡 Server listening at: http://{}", local_addr);
        tracing::info!("🤖 Service: {} ({})", card.name, card.description);
        tracing::info!(
            "📋 Agent card available at: http://{}/.well-known/agent-card",
            local_addr
        );
        tracing::info!(
            "⏱️ Task TTL: {}s, invoke deadline: {}s",
            self.config.task_ttl.as_secs(),
            self.config.invoke_timeout.as_secs()
        );
        if card.skills.is_empty() {
            tracing::info!("  Skills: none configured");
        } else {
            tracing::info!("  Skills: {} configured", card.skills.len());
            for skill in &card.skills {
                tracing::info!("    • {} ({})", skill.name, skill.description);
            }
        }
    }

    /// Warn about card configuration holes before the first request
    /// hits discovery.
    fn validate_agent_card(&self) {
        let card = &self.state.agent_card;
        let mut warnings = Vec::new();

        if card.name.is_empty() {
            warnings.push("⚠️ Card name is empty");
        }
        if card.description.is_empty() {
            warnings.push("⚠️ Card description is empty - consumers cannot tell what this service does");
        }
        if card.version.is_empty() {
            warnings.push("⚠️ Card version is empty - consumers cannot check compatibility");
        }
        if card.skills.is_empty() {
            warnings.push("ℹ️ No skills configured - the discovery document advertises nothing");
        }

        if !warnings.is_empty() {
            tracing::warn!("⚠️ Agent card warnings:");
            for warning in &warnings {
                tracing::warn!("  {}", warning);
            }
        }
    }

    /// Convert the server into an axum router.
    pub fn into_router(self) -> Router {
        create_routes(self.state).layer(CorsLayer::permissive())
    }

    /// Bind and serve. Also schedules the TTL sweep for the in-memory
    /// store, when the server owns one.
    pub async fn serve(self, addr: impl tokio::net::ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        self.display_server_info(&local_addr);
        self.validate_agent_card();

        if let Some(store) = self.sweep_store.clone() {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                loop {
                    interval.tick().await;
                    let purged = store.purge_expired().await;
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired task records");
                    }
                }
            });
        }

        axum::serve(listener, self.into_router()).await
    }
}

/// Builder for configuring a [`TaskServer`].
pub struct TaskServerBuilder {
    agents: Vec<Arc<dyn AgentCapability>>,
    tools: ToolRegistry,
    store: Option<Arc<dyn TaskStore>>,
    config: RuntimeConfig,
    name: String,
    description: String,
    version: String,
    run_agent: Option<String>,
}

impl TaskServerBuilder {
    fn new() -> Self {
        Self {
            agents: Vec::new(),
            tools: ToolRegistry::new(),
            store: None,
            config: RuntimeConfig::default(),
            name: "tasklink".to_string(),
            description: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            run_agent: None,
        }
    }

    pub fn register_agent(mut self, agent: Arc<dyn AgentCapability>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn register_tool(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        self.tools = self.tools.register(tool);
        self
    }

    /// Swap in an external TTL-capable store; the server then skips its
    /// own expiry sweep.
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_card(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.name = name.into();
        self.description = description.into();
        self.version = version.into();
        self
    }

    /// Name the agent that backs the run protocol. Defaults to the
    /// first registered agent.
    pub fn with_run_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.run_agent = Some(agent_id.into());
        self
    }

    /// Build the server. Fails when no agent is registered or the named
    /// run agent is unknown.
    pub fn build(self) -> Result<TaskServer> {
        let run_agent = match &self.run_agent {
            Some(agent_id) => self
                .agents
                .iter()
                .find(|agent| agent.name() == agent_id.as_str())
                .cloned()
                .ok_or_else(|| {
                    Error::Core(tasklink::Error::AgentNotFound {
                        agent_id: agent_id.clone(),
                    })
                })?,
            None => self
                .agents
                .first()
                .cloned()
                .ok_or_else(|| {
                    Error::Core(tasklink::Error::Validation {
                        field: "agents".to_string(),
                        reason: "at least one agent capability must be registered".to_string(),
                    })
                })?,
        };

        let mut registry = AgentRegistry::new();
        for agent in self.agents {
            registry = registry.register(agent);
        }
        let registry = Arc::new(registry);
        let agent_card = Arc::new(registry.agent_card(&self.name, &self.description, &self.version));

        let (store, sweep_store): (Arc<dyn TaskStore>, Option<Arc<InMemoryTaskStore>>) =
            match self.store {
                Some(store) => (store, None),
                None => {
                    let in_memory = Arc::new(InMemoryTaskStore::new(self.config.task_ttl));
                    (in_memory.clone(), Some(in_memory))
                }
            };

        let manager = Arc::new(TaskManager::new(store, self.config.clone()));
        let tasks = Arc::new(TaskHandler::new(manager, registry, self.config.clone()));
        let runs = Arc::new(RunHandler::new(
            run_agent,
            Arc::new(self.tools),
            self.config.clone(),
        ));

        Ok(TaskServer {
            state: ServerState {
                tasks,
                runs,
                agent_card,
            },
            config: self.config,
            sweep_store,
        })
    }
}
