//! Server lifecycle and command execution on top of the sandbox

pub mod orchestrator;
pub mod state;

pub use orchestrator::ProcessOrchestrator;
pub use state::{ProcessError, ServerState};
