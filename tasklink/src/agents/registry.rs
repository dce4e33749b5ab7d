use std::collections::HashMap;
use std::sync::Arc;

use super::capability::{AgentCapability, ToolHandler};
use crate::errors::{Error, Result};
use tasklink_types::{AgentCard, SkillDescriptor};

/// Explicit agent lookup built at startup and passed by reference into
/// the protocol handlers — no ambient global registry.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn AgentCapability>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, agent: Arc<dyn AgentCapability>) -> Self {
        self.agents.insert(agent.name().to_string(), agent);
        self
    }

    pub fn get(&self, agent_id: &str) -> Result<Arc<dyn AgentCapability>> {
        self.agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::AgentNotFound {
                agent_id: agent_id.to_string(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Skills of every registered capability, sorted by name for a
    /// stable card.
    pub fn skills(&self) -> Vec<SkillDescriptor> {
        let mut skills: Vec<SkillDescriptor> = self
            .agents
            .values()
            .flat_map(|agent| agent.skills())
            .collect();
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }

    /// Derive the discovery document from whatever is registered.
    pub fn agent_card(&self, name: &str, description: &str, version: &str) -> AgentCard {
        AgentCard::new(name, description)
            .with_version(version)
            .with_skills(self.skills())
    }
}

/// Explicit tool lookup, same construction discipline as
/// [`AgentRegistry`].
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn get(&self, tool_name: &str) -> Result<Arc<dyn ToolHandler>> {
        self.tools
            .get(tool_name)
            .cloned()
            .ok_or_else(|| Error::ToolNotFound {
                tool_name: tool_name.to_string(),
            })
    }
}
