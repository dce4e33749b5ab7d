mod run_handler;
mod task_handler;

pub use run_handler::RunHandler;
pub use task_handler::TaskHandler;
