use serde::{Deserialize, Serialize};

/// Optional capabilities advertised by the server.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AgentCapabilities {
    /// Server-Sent Events streaming is available.
    pub streaming: bool,
    /// Persistent task lifecycle management is available.
    #[serde(rename = "taskManagement")]
    pub task_management: bool,
}

/// One callable skill exposed by a registered agent capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema of the skill's parameters.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub parameters: serde_json::Value,
}

impl SkillDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Self-describing discovery document served at
/// `/.well-known/agent-card`, derived from whatever capabilities are
/// registered at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub version: String,
    pub capabilities: AgentCapabilities,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<SkillDescriptor>,
}

impl AgentCard {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: String::new(),
            capabilities: AgentCapabilities {
                streaming: true,
                task_management: true,
            },
            skills: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_skills(mut self, skills: Vec<SkillDescriptor>) -> Self {
        self.skills = skills;
        self
    }
}
