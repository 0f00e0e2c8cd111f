use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Exit code reported when a process goes away without reporting one
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Failures reported by the sandbox collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("failed to spawn {command}: {message}")]
    Spawn { command: String, message: String },
    #[error("failed to kill process: {0}")]
    Kill(String),
}

/// A previewable server became reachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// Callback invoked whenever the sandbox reports a reachable server
pub type ReadyCallback = Arc<dyn Fn(ServerReady) + Send + Sync>;

/// Kill switch for a spawned process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Terminate the process. Killing an already exited process succeeds.
    async fn kill(&self) -> Result<(), SandboxError>;
}

/// A process running inside the sandbox
///
/// `output` yields chunks in emission order and closes once the process has
/// no more output; `exit` resolves with the exit code.
pub struct SandboxProcess {
    pub output: mpsc::UnboundedReceiver<String>,
    pub exit: oneshot::Receiver<i32>,
    pub handle: Arc<dyn ProcessHandle>,
}

impl std::fmt::Debug for SandboxProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxProcess")
            .field("output", &"<receiver>")
            .field("exit", &"<receiver>")
            .field("handle", &"<dyn ProcessHandle>")
            .finish()
    }
}

/// Wait for an exit code, mapping a dropped sender to [`UNKNOWN_EXIT_CODE`]
pub async fn wait_for_exit(exit: oneshot::Receiver<i32>) -> i32 {
    exit.await.unwrap_or(UNKNOWN_EXIT_CODE)
}

/// The in-browser execution environment, seen from the session core
///
/// This trait abstracts the process spawner and filesystem so the core can
/// run against the real sandbox, a host directory, or an in-memory double.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Write a file, replacing any previous content
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;

    /// Read a file as UTF-8
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::NotFound`] if the file does not exist.
    async fn read_file(&self, path: &str) -> Result<String, SandboxError>;

    /// Create a directory, and its ancestors when `recursive` is set
    async fn make_directory(&self, path: &str, recursive: bool) -> Result<(), SandboxError>;

    /// Spawn a process. Output and exit are delivered asynchronously.
    async fn spawn(&self, command: &str, args: &[String]) -> Result<SandboxProcess, SandboxError>;

    /// Register a callback fired every time a server becomes reachable
    fn on_server_ready(&self, callback: ReadyCallback);
}

/// Join a command and its arguments the way they were typed
pub fn command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a typed command line into a command and its arguments
pub fn split_command_line(line: &str) -> Option<(String, Vec<String>)> {
    let mut parts = line.split_whitespace().map(str::to_string);
    let command = parts.next()?;
    Some((command, parts.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_round_trip() {
        let (command, args) = split_command_line("  npm   run build ").unwrap();
        assert_eq!(command, "npm");
        assert_eq!(args, vec!["run", "build"]);
        assert_eq!(command_line(&command, &args), "npm run build");
    }

    #[test]
    fn test_split_empty_line() {
        assert!(split_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn test_dropped_exit_sender_is_unknown() {
        let (tx, rx) = oneshot::channel::<i32>();
        drop(tx);
        assert_eq!(wait_for_exit(rx).await, UNKNOWN_EXIT_CODE);
    }
}
