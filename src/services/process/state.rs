use crate::services::sandbox::SandboxError;
use thiserror::Error;

/// Published lifecycle of the development server
///
/// `Idle -> Installing -> Starting -> Running -> Idle`. Only the orchestrator
/// moves between these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServerState {
    #[default]
    Idle,
    Installing,
    Starting,
    Running { url: String },
}

impl ServerState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ServerState::Idle)
    }

    /// Reachable at a URL
    pub fn is_running(&self) -> bool {
        matches!(self, ServerState::Running { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ServerState::Running { url } => Some(url),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerState::Idle => "idle",
            ServerState::Installing => "installing",
            ServerState::Starting => "starting",
            ServerState::Running { .. } => "running",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    #[error("server is already running")]
    AlreadyRunning,
    #[error("no server is running")]
    NothingToStop,
    /// A stop arrived while the start sequence was still in progress
    #[error("server start was cancelled")]
    Cancelled,
    #[error("dependency install exited with code {0}")]
    InstallFailed(i32),
    #[error(transparent)]
    Spawn(SandboxError),
    #[error(transparent)]
    Kill(SandboxError),
}
