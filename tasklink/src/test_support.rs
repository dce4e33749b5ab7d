//! Test fixtures: canned agent capabilities and tool handlers.
//!
//! These stand in for real agent reasoning in unit, integration and
//! HTTP-level tests; none of them are registered by default.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::agents::{AgentCapability, CapabilityInput, CapabilityOutput, Fragment, ToolHandler};
use crate::errors::{Error, Result};
use tasklink_types::{Message, SkillDescriptor};

/// Echoes the latest user message back, streamed as two text deltas.
#[derive(Default)]
pub struct EchoAgent;

impl EchoAgent {
    fn reply(input: &CapabilityInput) -> String {
        format!("echo: {}", input.latest_user_text().unwrap_or_default())
    }
}

#[async_trait]
impl AgentCapability for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    fn skills(&self) -> Vec<SkillDescriptor> {
        vec![SkillDescriptor::new("echo", "Repeat the latest user message")]
    }

    async fn invoke(&self, input: CapabilityInput) -> Result<CapabilityOutput> {
        Ok(CapabilityOutput {
            message: Message::assistant_text(Self::reply(&input)),
        })
    }

    fn stream(&self, input: CapabilityInput) -> BoxStream<'static, Result<Fragment>> {
        let text = input.latest_user_text().unwrap_or_default();
        futures::stream::iter(vec![
            Ok(Fragment::Text {
                text: "echo: ".to_string(),
            }),
            Ok(Fragment::Text { text }),
        ])
        .boxed()
    }
}

/// Replays a fixed fragment script; `invoke` concatenates the text
/// fragments into one final message.
pub struct ScriptedAgent {
    name: String,
    script: Vec<Result<Fragment>>,
}

impl ScriptedAgent {
    pub fn new(name: impl Into<String>, script: Vec<Result<Fragment>>) -> Self {
        Self {
            name: name.into(),
            script,
        }
    }

    fn clone_script(&self) -> Vec<Result<Fragment>> {
        self.script
            .iter()
            .map(|item| match item {
                Ok(fragment) => Ok(fragment.clone()),
                Err(_) => Err(Error::AgentExecution {
                    agent_id: self.name.clone(),
                    reason: "scripted failure".to_string(),
                }),
            })
            .collect()
    }
}

#[async_trait]
impl AgentCapability for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _input: CapabilityInput) -> Result<CapabilityOutput> {
        let mut text = String::new();
        for item in self.clone_script() {
            if let Fragment::Text { text: delta } = item? {
                text.push_str(&delta);
            }
        }
        Ok(CapabilityOutput {
            message: Message::assistant_text(text),
        })
    }

    fn stream(&self, _input: CapabilityInput) -> BoxStream<'static, Result<Fragment>> {
        futures::stream::iter(self.clone_script()).boxed()
    }
}

/// Fails every invocation with an `AgentExecution` error carrying a
/// deliberately sensitive-looking reason, so sanitization is testable.
#[derive(Default)]
pub struct FailingAgent;

#[async_trait]
impl AgentCapability for FailingAgent {
    fn name(&self) -> &str {
        "failing"
    }

    async fn invoke(&self, _input: CapabilityInput) -> Result<CapabilityOutput> {
        Err(self.error())
    }

    fn stream(&self, _input: CapabilityInput) -> BoxStream<'static, Result<Fragment>> {
        let error = self.error();
        futures::stream::iter(vec![
            Ok(Fragment::Text {
                text: "partial ".to_string(),
            }),
            Err(error),
        ])
        .boxed()
    }
}

impl FailingAgent {
    fn error(&self) -> Error {
        Error::AgentExecution {
            agent_id: "failing".to_string(),
            reason: "raw stack trace at /internal/path.rs:1".to_string(),
        }
    }
}

/// Emits text fragments on a fixed interval, for deadline tests that
/// need a stream slower in total than any single read.
pub struct DrippingAgent {
    pub interval: std::time::Duration,
    pub chunks: usize,
}

#[async_trait]
impl AgentCapability for DrippingAgent {
    fn name(&self) -> &str {
        "dripping"
    }

    async fn invoke(&self, _input: CapabilityInput) -> Result<CapabilityOutput> {
        tokio::time::sleep(self.interval * self.chunks as u32).await;
        Ok(CapabilityOutput {
            message: Message::assistant_text("done"),
        })
    }

    fn stream(&self, _input: CapabilityInput) -> BoxStream<'static, Result<Fragment>> {
        let interval = self.interval;
        let chunks = self.chunks;
        Box::pin(async_stream::stream! {
            for i in 0..chunks {
                tokio::time::sleep(interval).await;
                yield Ok(Fragment::Text {
                    text: format!("chunk-{i} "),
                });
            }
        })
    }
}

/// Agent that never produces anything, for deadline tests.
#[derive(Default)]
pub struct StallingAgent;

#[async_trait]
impl AgentCapability for StallingAgent {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn invoke(&self, _input: CapabilityInput) -> Result<CapabilityOutput> {
        futures::future::pending().await
    }

    fn stream(&self, _input: CapabilityInput) -> BoxStream<'static, Result<Fragment>> {
        futures::stream::pending().boxed()
    }
}

/// Tool that upper-cases the `text` argument.
#[derive(Default)]
pub struct UppercaseTool;

#[async_trait]
impl ToolHandler for UppercaseTool {
    fn name(&self) -> &str {
        "uppercase"
    }

    async fn call(&self, arguments: serde_json::Value) -> Result<serde_json::Value> {
        let text = arguments
            .get("text")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::ToolCallFailed {
                tool_name: "uppercase".to_string(),
                reason: "missing `text` argument".to_string(),
            })?;
        Ok(serde_json::json!({ "text": text.to_uppercase() }))
    }
}
