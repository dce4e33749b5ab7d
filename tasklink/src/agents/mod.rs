mod capability;
mod registry;

pub use capability::{AgentCapability, CapabilityInput, CapabilityOutput, Fragment, ToolHandler};
pub use registry::{AgentRegistry, ToolRegistry};
