//! Minimal tasklink server with the echo fixture agent.
//!
//! Run with: `cargo run --example basic_server`, then:
//! `curl -X POST localhost:3000/tasks -H 'content-type: application/json' \
//!   -d '{"agentId":"echo","message":{"role":"user","parts":[{"type":"text","text":"hi"}],"timestamp":"2026-01-01T00:00:00Z"}}'`

use std::sync::Arc;

use tasklink::config::RuntimeConfig;
use tasklink::test_support::{EchoAgent, UppercaseTool};
use tasklink_axum::TaskServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tasklink=debug".into()),
        )
        .init();

    let server = TaskServer::builder()
        .register_agent(Arc::new(EchoAgent::default()))
        .register_tool(Arc::new(UppercaseTool))
        .with_card("echo-server", "Echoes whatever you send it", "0.1.0")
        .with_config(RuntimeConfig::from_env())
        .build()?;

    server.serve("0.0.0.0:3000").await?;
    Ok(())
}
