//! Development server lifecycle and terminal command execution
//!
//! The orchestrator owns at most one server process at a time and is the only
//! writer of the published [`ServerState`]. All output (install steps, the
//! server, ad-hoc commands, and the orchestrator's own notices) goes into one
//! shared [`TerminalBuffer`].
//!
//! A start sequence suspends several times (spawning and awaiting the install
//! step, spawning the server). Every start and every stop bumps a generation
//! counter; a start that wakes up to a newer generation has been cancelled and
//! backs out without touching state.

use super::state::{ProcessError, ServerState};
use crate::config::ServerConfig;
use crate::services::sandbox::{
    split_command_line, wait_for_exit, ProcessHandle, Sandbox, SandboxError, SandboxProcess,
    ServerReady,
};
use crate::terminal::TerminalBuffer;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch};

const HELP_TEXT: &str = "
Available commands:
  npm install     - Install dependencies
  start/npm start - Start the server
  npm run <cmd>   - Run npm scripts
  clear           - Clear terminal
  help            - Show this help
  ls              - List files
  pwd             - Print working directory
  exit/stop       - Stop the server

";

const BANNER: &str = "Sandbox terminal ready\nType your commands below:\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnedKind {
    Install,
    Server,
}

struct Owned {
    generation: u64,
    kind: OwnedKind,
    handle: Arc<dyn ProcessHandle>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    owned: Option<Owned>,
    /// Generation whose owned process still has a task waiting on its exit
    watched: Option<u64>,
    /// Readiness reported while the server spawn was still in flight
    early_ready: Option<ServerReady>,
}

struct Shared {
    inner: Mutex<Inner>,
    state: watch::Sender<ServerState>,
    output: TerminalBuffer,
    prompt: String,
}

impl Shared {
    fn publish(&self, state: ServerState) {
        tracing::info!(state = state.name(), url = ?state.url(), "server state changed");
        self.state.send_replace(state);
    }

    fn write_prompt(&self) {
        self.output.write(&self.prompt);
    }

    fn on_server_ready(&self, ready: ServerReady) {
        let mut inner = self.inner.lock();
        let owns_server = inner
            .owned
            .as_ref()
            .is_some_and(|owned| owned.kind == OwnedKind::Server);

        if owns_server {
            self.publish(ServerState::Running {
                url: ready.url.clone(),
            });
            drop(inner);
            self.output
                .write_success(&format!("Development server is running at {}\n", ready.url));
            self.write_prompt();
        } else if *self.state.borrow() == ServerState::Starting {
            tracing::debug!(port = ready.port, "server ready before ownership was recorded");
            inner.early_ready = Some(ready);
        } else {
            tracing::debug!(
                port = ready.port,
                url = %ready.url,
                "ignoring server-ready event with no owned server"
            );
        }
    }
}

pub struct ProcessOrchestrator {
    sandbox: Arc<dyn Sandbox>,
    shared: Arc<Shared>,
    config: ServerConfig,
}

impl std::fmt::Debug for ProcessOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessOrchestrator")
            .field("state", &*self.shared.state.borrow())
            .field("owns_process", &self.owns_process())
            .finish()
    }
}

impl ProcessOrchestrator {
    /// Create an orchestrator and register its readiness callback with the
    /// sandbox. The callback holds a weak reference, so it goes inert once
    /// the orchestrator is dropped.
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        output: TerminalBuffer,
        config: ServerConfig,
        prompt: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(ServerState::Idle);
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner::default()),
            state,
            output,
            prompt: prompt.into(),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        sandbox.on_server_ready(Arc::new(move |ready| {
            if let Some(shared) = weak.upgrade() {
                shared.on_server_ready(ready);
            }
        }));

        Self {
            sandbox,
            shared,
            config,
        }
    }

    pub fn output(&self) -> &TerminalBuffer {
        &self.shared.output
    }

    pub fn state(&self) -> ServerState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.shared.state.subscribe()
    }

    /// Whether an install step or server process is currently owned
    pub fn owns_process(&self) -> bool {
        self.shared.inner.lock().owned.is_some()
    }

    pub fn write_prompt(&self) {
        self.shared.write_prompt();
    }

    pub fn write_banner(&self) {
        self.shared.output.write(BANNER);
        self.shared.write_prompt();
    }

    /// Install dependencies, then spawn the server
    ///
    /// # Errors
    ///
    /// [`ProcessError::AlreadyRunning`] if a start is in progress or a server
    /// is owned, [`ProcessError::Spawn`] if either step cannot be spawned,
    /// [`ProcessError::Cancelled`] if a stop arrived mid-sequence.
    pub async fn start(&self) -> Result<(), ProcessError> {
        let generation = {
            let mut inner = self.shared.inner.lock();
            if inner.owned.is_some() || !self.shared.state.borrow().is_idle() {
                drop(inner);
                tracing::info!("start rejected, server already running");
                self.shared.output.write_error("Server is already running!\n");
                self.shared.write_prompt();
                return Err(ProcessError::AlreadyRunning);
            }
            inner.generation += 1;
            inner.early_ready = None;
            self.shared.publish(ServerState::Installing);
            inner.generation
        };

        self.shared.output.write("Installing dependencies...\n");
        let install = match self.spawn_line(&self.config.install_command).await {
            Ok(process) => process,
            Err(e) => return Err(self.fail_start(generation, e)),
        };
        if !self.take_ownership(generation, OwnedKind::Install, &install.handle) {
            kill_quietly(&install.handle).await;
            return Err(ProcessError::Cancelled);
        }
        let code = self.pipe_output(install).await;

        let abort = {
            let mut inner = self.shared.inner.lock();
            if inner.watched == Some(generation) {
                inner.watched = None;
            }
            if inner.generation != generation {
                tracing::debug!("server start cancelled during install");
                return Err(ProcessError::Cancelled);
            }
            inner.owned = None;
            let abort = code != 0 && self.config.abort_on_install_failure;
            self.shared.publish(if abort {
                ServerState::Idle
            } else {
                ServerState::Starting
            });
            abort
        };
        if code != 0 {
            tracing::warn!(code, "dependency install failed");
            self.shared
                .output
                .write_error(&format!("Dependency install exited with code {code}\n"));
        }
        if abort {
            self.shared.write_prompt();
            return Err(ProcessError::InstallFailed(code));
        }

        self.shared
            .output
            .write("\nStarting development server...\n");
        let SandboxProcess {
            output,
            exit,
            handle,
        } = match self.spawn_line(&self.config.start_command).await {
            Ok(process) => process,
            Err(e) => return Err(self.fail_start(generation, e)),
        };

        let early_ready = {
            let mut inner = self.shared.inner.lock();
            if inner.generation == generation {
                inner.owned = Some(Owned {
                    generation,
                    kind: OwnedKind::Server,
                    handle: Arc::clone(&handle),
                });
                inner.watched = Some(generation);
                Some(inner.early_ready.take())
            } else {
                None
            }
        };
        let Some(early_ready) = early_ready else {
            tracing::debug!("server start cancelled before the server was owned");
            kill_quietly(&handle).await;
            return Err(ProcessError::Cancelled);
        };

        tracing::info!(command = %self.config.start_command, "server process spawned");
        tokio::spawn(watch_server(
            Arc::clone(&self.shared),
            generation,
            output,
            exit,
        ));
        if let Some(ready) = early_ready {
            self.shared.on_server_ready(ready);
        }
        Ok(())
    }

    /// Kill the owned process, or cancel a start still in progress
    ///
    /// # Errors
    ///
    /// [`ProcessError::NothingToStop`] when idle, [`ProcessError::Kill`] if
    /// the sandbox refuses to kill the process. Ownership is kept unless the
    /// process exited in the meantime, in which case the state is idle.
    pub async fn stop(&self) -> Result<(), ProcessError> {
        let (owned, previous, cancelled) = {
            let mut inner = self.shared.inner.lock();
            if inner.owned.is_none() && self.shared.state.borrow().is_idle() {
                drop(inner);
                tracing::debug!("stop requested with nothing running");
                self.shared.output.write("No server is running\n");
                return Err(ProcessError::NothingToStop);
            }
            let previous = inner.generation;
            inner.generation += 1;
            (inner.owned.take(), previous, inner.generation)
        };

        self.shared.output.write("Stopping server...\n");
        if let Some(owned) = owned {
            let result = owned.handle.kill().await;
            if let Err(e) = result {
                {
                    let mut inner = self.shared.inner.lock();
                    if inner.generation == cancelled && inner.owned.is_none() {
                        if inner.watched == Some(owned.generation) {
                            inner.generation = previous;
                            inner.owned = Some(owned);
                        } else {
                            // Exited during the kill and its task already gave up on it
                            tracing::debug!("process exited while its kill was failing");
                            inner.early_ready = None;
                            self.shared.publish(ServerState::Idle);
                        }
                    }
                }
                tracing::error!("failed to stop server: {}", e);
                self.shared
                    .output
                    .write_error(&format!("Failed to stop server: {e}\n"));
                return Err(ProcessError::Kill(e));
            }
        }

        {
            let mut inner = self.shared.inner.lock();
            if inner.generation == cancelled {
                inner.early_ready = None;
                self.shared.publish(ServerState::Idle);
            }
        }
        self.shared.output.write_success("Server stopped\n");
        Ok(())
    }

    /// Run one committed terminal line
    ///
    /// Reserved lines: empty (prompt only), `clear`, `help`, the configured
    /// start and stop aliases. Anything else is spawned as a one-shot process.
    pub async fn execute(&self, line: &str) -> Result<(), ProcessError> {
        let line = line.trim();
        if line.is_empty() {
            self.shared.write_prompt();
            return Ok(());
        }

        match line {
            "clear" => {
                self.shared.output.clear();
                self.shared.write_prompt();
                Ok(())
            }
            "help" => {
                self.shared.output.write(HELP_TEXT);
                self.shared.write_prompt();
                Ok(())
            }
            _ if self.config.start_aliases.iter().any(|alias| alias == line) => {
                self.start().await
            }
            _ if self.config.stop_aliases.iter().any(|alias| alias == line) => {
                let result = self.stop().await;
                self.shared.write_prompt();
                result
            }
            _ => self.run_command(line).await,
        }
    }

    /// Ctrl-C: stop whatever server work is in progress, then prompt
    pub async fn interrupt(&self) -> Result<(), ProcessError> {
        let busy = self.owns_process() || !self.state().is_idle();
        let result = if busy { self.stop().await } else { Ok(()) };
        self.shared.write_prompt();
        result
    }

    async fn run_command(&self, line: &str) -> Result<(), ProcessError> {
        let process = match self.spawn_line(line).await {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!("command failed to spawn: {}", e);
                self.shared
                    .output
                    .write_error(&format!("Command failed: {e}\n"));
                self.shared.write_prompt();
                return Err(ProcessError::Spawn(e));
            }
        };

        tracing::debug!(command = line, "running command");
        let code = self.pipe_output(process).await;
        tracing::debug!(command = line, code, "command exited");

        self.shared.output.ensure_line_start();
        let notice = format!("Process exited with code {code}\n");
        if code == 0 {
            self.shared.output.write(&notice);
        } else {
            self.shared.output.write_error(&notice);
        }
        self.shared.write_prompt();
        Ok(())
    }

    async fn spawn_line(&self, line: &str) -> Result<SandboxProcess, SandboxError> {
        let (command, args) = split_command_line(line).ok_or_else(|| SandboxError::Spawn {
            command: line.to_string(),
            message: "empty command line".to_string(),
        })?;
        self.sandbox.spawn(&command, &args).await
    }

    /// Forward a process's output, then wait for its exit code
    async fn pipe_output(&self, process: SandboxProcess) -> i32 {
        let SandboxProcess {
            mut output, exit, ..
        } = process;
        while let Some(chunk) = output.recv().await {
            self.shared.output.write(&chunk);
        }
        wait_for_exit(exit).await
    }

    fn take_ownership(
        &self,
        generation: u64,
        kind: OwnedKind,
        handle: &Arc<dyn ProcessHandle>,
    ) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.owned = Some(Owned {
            generation,
            kind,
            handle: Arc::clone(handle),
        });
        inner.watched = Some(generation);
        true
    }

    fn fail_start(&self, generation: u64, error: SandboxError) -> ProcessError {
        {
            let mut inner = self.shared.inner.lock();
            if inner.generation == generation {
                inner.owned = None;
                self.shared.publish(ServerState::Idle);
            }
        }
        tracing::error!("failed to start server: {}", error);
        self.shared
            .output
            .write_error(&format!("Failed to start server: {error}\n"));
        self.shared.write_prompt();
        ProcessError::Spawn(error)
    }
}

async fn kill_quietly(handle: &Arc<dyn ProcessHandle>) {
    if let Err(e) = handle.kill().await {
        tracing::warn!("failed to kill abandoned process: {}", e);
    }
}

/// Stream server output until it ends, then drop back to idle if this
/// server is still the owned one
async fn watch_server(
    shared: Arc<Shared>,
    generation: u64,
    mut output: mpsc::UnboundedReceiver<String>,
    exit: oneshot::Receiver<i32>,
) {
    while let Some(chunk) = output.recv().await {
        shared.output.write(&chunk);
    }
    let code = wait_for_exit(exit).await;

    let still_owned = {
        let mut inner = shared.inner.lock();
        if inner.watched == Some(generation) {
            inner.watched = None;
        }
        let owned = inner.owned.as_ref().is_some_and(|owned| {
            owned.kind == OwnedKind::Server && owned.generation == generation
        });
        if owned {
            inner.owned = None;
            inner.early_ready = None;
            shared.publish(ServerState::Idle);
        }
        owned
    };
    if !still_owned {
        tracing::debug!(code, "released server process exited");
        return;
    }

    tracing::warn!(code, "server exited on its own");
    shared.output.ensure_line_start();
    let notice = format!("Server exited with code {code}\n");
    if code == 0 {
        shared.output.write(&notice);
    } else {
        shared.output.write_error(&notice);
    }
    shared.write_prompt();
}
