//! HTTP surface for the tasklink protocol layer: REST + SSE routes,
//! error mapping and a server builder.

pub mod error;
pub mod routes;
pub mod server;

pub use error::{Error, Result};
pub use routes::{create_routes, ServerState};
pub use server::{TaskServer, TaskServerBuilder};
