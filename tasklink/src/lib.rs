//! Core runtime for the tasklink protocol layer.
//!
//! Sits between transports and agent capabilities: the task store and
//! manager own the persisted lifecycle, the handlers drive executions
//! and translate them into the two wire protocols, and the agent/tool
//! registries form the seam behind which real reasoning lives.

pub mod agents;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod state;
pub mod task;
pub mod test_support;

// Re-export the wire types under the crate root for convenience.
pub use tasklink_types as types;

pub use errors::{Error, Result};
