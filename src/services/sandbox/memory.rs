//! In-memory sandbox for tests and demos
//!
//! Keeps files in a map, runs scripted processes, and records every call so
//! tests can assert how often the core touched the collaborator. Reads can be
//! delayed or failed per path to exercise load races and load errors.

use super::backend::{
    command_line, ProcessHandle, ReadyCallback, Sandbox, SandboxError, SandboxProcess,
    ServerReady,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Exit code reported for a process terminated through its handle
pub const KILLED_EXIT_CODE: i32 = 143;

/// How a scripted process ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedExit {
    /// Exit with this code right after emitting the scripted output
    Code(i32),
    /// Keep running until killed or finished through [`MemorySandbox::finish`]
    Running,
}

/// Canned behavior for a command line
#[derive(Debug, Clone)]
pub struct ProcessScript {
    pub output: Vec<String>,
    pub exit: ScriptedExit,
}

impl ProcessScript {
    pub fn exits(code: i32, output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|s| s.to_string()).collect(),
            exit: ScriptedExit::Code(code),
        }
    }

    pub fn running(output: &[&str]) -> Self {
        Self {
            output: output.iter().map(|s| s.to_string()).collect(),
            exit: ScriptedExit::Running,
        }
    }
}

impl Default for ProcessScript {
    fn default() -> Self {
        Self::exits(0, &[])
    }
}

/// Call counts and history
#[derive(Debug, Clone, Default)]
pub struct SandboxMetrics {
    /// Number of `read_file` calls per path
    pub reads: HashMap<String, usize>,
    /// Every successful `write_file`, in order
    pub writes: Vec<(String, String)>,
    /// Every spawned command line, in order
    pub spawns: Vec<String>,
    /// Number of successful kills
    pub kills: usize,
}

impl SandboxMetrics {
    pub fn read_calls(&self, path: &str) -> usize {
        self.reads.get(path).copied().unwrap_or(0)
    }

    pub fn writes_to(&self, path: &str) -> Vec<&str> {
        self.writes
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, c)| c.as_str())
            .collect()
    }
}

struct LiveProcess {
    command_line: String,
    output: mpsc::UnboundedSender<String>,
    exit: oneshot::Sender<i32>,
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<String, String>,
    directories: BTreeSet<String>,
    read_delays: HashMap<String, Duration>,
    read_failures: HashMap<String, String>,
    write_failures: HashMap<String, String>,
    spawn_failures: HashMap<String, String>,
    kill_failure: Option<String>,
    kill_delay: Option<Duration>,
    scripts: HashMap<String, ProcessScript>,
    live: BTreeMap<u64, LiveProcess>,
    next_pid: u64,
    ready_callbacks: Vec<ReadyCallback>,
    metrics: SandboxMetrics,
}

impl MemoryState {
    fn latest_pid(&self, line: &str) -> Option<u64> {
        self.live
            .iter()
            .rev()
            .find(|(_, p)| p.command_line == line)
            .map(|(&pid, _)| pid)
    }
}

/// Sandbox double backed by process-local state
#[derive(Clone, Default)]
pub struct MemorySandbox {
    state: Arc<Mutex<MemoryState>>,
}

impl std::fmt::Debug for MemorySandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySandbox")
            .field("state", &"<mutex>")
            .finish()
    }
}

impl MemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without recording a write
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.state
            .lock()
            .files
            .insert(path.to_string(), content.to_string());
        self
    }

    /// Script the behavior of a command line such as `npm install`
    pub fn script(&self, line: &str, script: ProcessScript) {
        self.state.lock().scripts.insert(line.to_string(), script);
    }

    /// Delay every read of `path` by `delay`
    pub fn set_read_delay(&self, path: &str, delay: Duration) {
        self.state
            .lock()
            .read_delays
            .insert(path.to_string(), delay);
    }

    pub fn fail_reads(&self, path: &str, message: &str) {
        self.state
            .lock()
            .read_failures
            .insert(path.to_string(), message.to_string());
    }

    pub fn clear_read_failure(&self, path: &str) {
        self.state.lock().read_failures.remove(path);
    }

    pub fn fail_writes(&self, path: &str, message: &str) {
        self.state
            .lock()
            .write_failures
            .insert(path.to_string(), message.to_string());
    }

    pub fn fail_spawn(&self, line: &str, message: &str) {
        self.state
            .lock()
            .spawn_failures
            .insert(line.to_string(), message.to_string());
    }

    pub fn fail_kills(&self, message: &str) {
        self.state.lock().kill_failure = Some(message.to_string());
    }

    /// Make every kill take `delay` before it succeeds or fails
    pub fn set_kill_delay(&self, delay: Duration) {
        self.state.lock().kill_delay = Some(delay);
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn has_directory(&self, path: &str) -> bool {
        self.state.lock().directories.contains(path)
    }

    /// Get a snapshot of current metrics
    pub fn metrics(&self) -> SandboxMetrics {
        self.state.lock().metrics.clone()
    }

    /// Number of processes that have neither exited nor been killed
    pub fn live_processes(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_running(&self, line: &str) -> bool {
        self.state.lock().latest_pid(line).is_some()
    }

    /// Emit output from the most recent live process spawned as `line`
    pub fn emit(&self, line: &str, chunk: &str) -> bool {
        let state = self.state.lock();
        match state.latest_pid(line).and_then(|pid| state.live.get(&pid)) {
            Some(process) => process.output.send(chunk.to_string()).is_ok(),
            None => false,
        }
    }

    /// Make the most recent live process spawned as `line` exit on its own
    pub fn finish(&self, line: &str, code: i32) -> bool {
        let mut state = self.state.lock();
        let Some(pid) = state.latest_pid(line) else {
            return false;
        };
        match state.live.remove(&pid) {
            Some(process) => {
                drop(process.output);
                let _ = process.exit.send(code);
                true
            }
            None => false,
        }
    }

    /// Report a reachable server to every registered callback
    pub fn announce_server(&self, port: u16, url: &str) {
        let callbacks = self.state.lock().ready_callbacks.clone();
        let ready = ServerReady {
            port,
            url: url.to_string(),
        };
        for callback in callbacks {
            callback(ready.clone());
        }
    }
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

#[async_trait]
impl Sandbox for MemorySandbox {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let mut state = self.state.lock();
        if let Some(message) = state.write_failures.get(path) {
            return Err(SandboxError::Io {
                path: path.to_string(),
                message: message.clone(),
            });
        }
        state.files.insert(path.to_string(), content.to_string());
        state
            .metrics
            .writes
            .push((path.to_string(), content.to_string()));
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let delay = {
            let mut state = self.state.lock();
            *state.metrics.reads.entry(path.to_string()).or_default() += 1;
            state.read_delays.get(path).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if let Some(message) = state.read_failures.get(path) {
            return Err(SandboxError::Io {
                path: path.to_string(),
                message: message.clone(),
            });
        }
        state
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(path.to_string()))
    }

    async fn make_directory(&self, path: &str, recursive: bool) -> Result<(), SandboxError> {
        let mut state = self.state.lock();
        if !recursive {
            if let Some(parent) = parent_of(path) {
                if !state.directories.contains(parent) {
                    return Err(SandboxError::NotFound(parent.to_string()));
                }
            }
            state.directories.insert(path.to_string());
            return Ok(());
        }

        let mut current = Some(path);
        while let Some(dir) = current {
            state.directories.insert(dir.to_string());
            current = parent_of(dir);
        }
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<SandboxProcess, SandboxError> {
        let line = command_line(command, args);
        let mut state = self.state.lock();
        state.metrics.spawns.push(line.clone());

        if let Some(message) = state.spawn_failures.get(&line) {
            return Err(SandboxError::Spawn {
                command: line,
                message: message.clone(),
            });
        }

        let script = state.scripts.get(&line).cloned().unwrap_or_default();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        for chunk in script.output {
            let _ = output_tx.send(chunk);
        }

        state.next_pid += 1;
        let pid = state.next_pid;

        match script.exit {
            ScriptedExit::Code(code) => {
                drop(output_tx);
                let _ = exit_tx.send(code);
            }
            ScriptedExit::Running => {
                state.live.insert(
                    pid,
                    LiveProcess {
                        command_line: line,
                        output: output_tx,
                        exit: exit_tx,
                    },
                );
            }
        }

        Ok(SandboxProcess {
            output: output_rx,
            exit: exit_rx,
            handle: Arc::new(MemoryProcessHandle {
                state: Arc::clone(&self.state),
                pid,
            }),
        })
    }

    fn on_server_ready(&self, callback: ReadyCallback) {
        self.state.lock().ready_callbacks.push(callback);
    }
}

struct MemoryProcessHandle {
    state: Arc<Mutex<MemoryState>>,
    pid: u64,
}

#[async_trait]
impl ProcessHandle for MemoryProcessHandle {
    async fn kill(&self) -> Result<(), SandboxError> {
        let delay = self.state.lock().kill_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if let Some(message) = &state.kill_failure {
            return Err(SandboxError::Kill(message.clone()));
        }
        if let Some(process) = state.live.remove(&self.pid) {
            drop(process.output);
            let _ = process.exit.send(KILLED_EXIT_CODE);
        }
        state.metrics.kills += 1;
        Ok(())
    }
}
