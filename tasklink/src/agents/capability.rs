use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

use crate::errors::Result;
use tasklink_types::{Message, SkillDescriptor};

/// Input handed to an agent capability: the accumulated message history
/// and the task/run context bag.
#[derive(Debug, Clone)]
pub struct CapabilityInput {
    pub messages: Vec<Message>,
    pub context: HashMap<String, serde_json::Value>,
}

impl CapabilityInput {
    pub fn new(
        messages: Vec<Message>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self { messages, context }
    }

    /// Text of the most recent user message, if any.
    pub fn latest_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == tasklink_types::Role::User)
            .map(Message::text)
    }
}

/// Final output of a non-streaming invocation.
#[derive(Debug, Clone)]
pub struct CapabilityOutput {
    pub message: Message,
}

/// One fragment of a streaming invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// A delta of assistant text.
    Text { text: String },
    /// The agent wants an external tool invoked.
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },
    /// The agent cannot proceed without more input from the caller;
    /// the task suspends at `input_required`.
    InputRequired,
}

/// The external agent capability, kept deliberately narrow: invoke to a
/// final output, or stream a finite, non-restartable sequence of
/// fragments. Concrete agents are selected by name at the registry
/// boundary — the protocol layer never inspects what is behind the
/// trait.
#[async_trait]
pub trait AgentCapability: Send + Sync {
    fn name(&self) -> &str;

    /// Skills advertised in the discovery document.
    fn skills(&self) -> Vec<SkillDescriptor> {
        Vec::new()
    }

    /// Run to completion and produce the final output.
    async fn invoke(&self, input: CapabilityInput) -> Result<CapabilityOutput>;

    /// Lazy sequence of output fragments. Finite; a consumed stream
    /// cannot be restarted.
    fn stream(&self, input: CapabilityInput) -> BoxStream<'static, Result<Fragment>>;
}

/// External tool capability: given a name and arguments, return a
/// result or fail.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, arguments: serde_json::Value) -> Result<serde_json::Value>;
}
