//! Wire types for the tasklink protocols.
//!
//! Everything in this crate is a plain serde data type shared between the
//! core runtime and the HTTP layer: the Part/Message/Task content model,
//! the closed stream-event enums for both wire protocols, the agent card
//! discovery document and the request/response payloads.

mod agent_card;
mod events;
mod message;
mod part;
mod requests;
mod task;

pub use agent_card::{AgentCapabilities, AgentCard, SkillDescriptor};
pub use events::{RunEvent, TaskStreamEvent};
pub use message::{Message, Role};
pub use part::Part;
pub use requests::{
    CreateTaskRequest, DeleteTaskResponse, ListTasksQuery, ListTasksResponse, RunCapabilities,
    RunRequest, RunStateSnapshot,
};
pub use task::{ErrorDetail, Task, TaskFilter, TaskPage, TaskState};
