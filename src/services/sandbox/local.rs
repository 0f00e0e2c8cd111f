//! Sandbox backed by a host directory and host processes
//!
//! Files live under a root directory; processes run with that directory as
//! their working directory. A server counts as reachable as soon as one of
//! its output chunks mentions a local URL with a port.

use super::backend::{
    command_line, ProcessHandle, ReadyCallback, Sandbox, SandboxError, SandboxProcess,
    ServerReady, UNKNOWN_EXIT_CODE,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

const READ_CHUNK: usize = 4096;

/// Matches URLs such as `http://localhost:4200/`
fn local_url_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"https?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1\]):(\d{1,5})[^\s]*")
}

/// Find the first local server URL in a chunk of output
pub fn detect_server_url(pattern: &Regex, chunk: &str) -> Option<ServerReady> {
    let captures = pattern.captures(chunk)?;
    let port = captures.get(1)?.as_str().parse().ok()?;
    let url = captures
        .get(0)?
        .as_str()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ')' | '\''));
    Some(ServerReady {
        port,
        url: url.to_string(),
    })
}

pub struct LocalSandbox {
    root: PathBuf,
    url_pattern: Regex,
    ready_callbacks: Arc<Mutex<Vec<ReadyCallback>>>,
}

impl std::fmt::Debug for LocalSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSandbox")
            .field("root", &self.root)
            .finish()
    }
}

impl LocalSandbox {
    /// Create a sandbox rooted at `root`
    ///
    /// # Errors
    ///
    /// Returns an error if the root does not exist or is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SandboxError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SandboxError::NotFound(root.display().to_string()));
        }
        let url_pattern = local_url_pattern().map_err(|e| SandboxError::Io {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            root,
            url_pattern,
            ready_callbacks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a sandbox path under the root, refusing paths that escape it
    fn resolve(&self, path: &str) -> Result<PathBuf, SandboxError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SandboxError::Io {
                path: path.to_string(),
                message: "path escapes the sandbox root".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &str, e: std::io::Error) -> SandboxError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SandboxError::NotFound(path.to_string())
    } else {
        SandboxError::Io {
            path: path.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let target = self.resolve(path)?;
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let target = self.resolve(path)?;
        tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| io_error(path, e))
    }

    async fn make_directory(&self, path: &str, recursive: bool) -> Result<(), SandboxError> {
        let target = self.resolve(path)?;
        let result = if recursive {
            tokio::fs::create_dir_all(&target).await
        } else {
            tokio::fs::create_dir(&target).await
        };
        result.map_err(|e| io_error(path, e))
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<SandboxProcess, SandboxError> {
        let line = command_line(command, args);
        let spawn_error = |message: String| SandboxError::Spawn {
            command: line.clone(),
            message,
        };

        let mut child = Command::new(command)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error("stderr was not captured".to_string()))?;

        tracing::debug!(command = %line, pid = ?child.id(), "spawned local process");

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let announced = Arc::new(Mutex::new(false));

        for stream in [
            Box::new(stdout) as Box<dyn AsyncRead + Send + Unpin>,
            Box::new(stderr) as Box<dyn AsyncRead + Send + Unpin>,
        ] {
            tokio::spawn(pump_output(
                stream,
                output_tx.clone(),
                self.url_pattern.clone(),
                Arc::clone(&self.ready_callbacks),
                Arc::clone(&announced),
            ));
        }
        drop(output_tx);

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!("failed to kill local process: {}", e);
                    }
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => status.code().unwrap_or(UNKNOWN_EXIT_CODE),
                Err(e) => {
                    tracing::warn!("failed to wait for local process: {}", e);
                    UNKNOWN_EXIT_CODE
                }
            };
            let _ = exit_tx.send(code);
        });

        Ok(SandboxProcess {
            output: output_rx,
            exit: exit_rx,
            handle: Arc::new(LocalProcessHandle {
                kill_tx: Mutex::new(Some(kill_tx)),
            }),
        })
    }

    fn on_server_ready(&self, callback: ReadyCallback) {
        self.ready_callbacks.lock().push(callback);
    }
}

/// Forward one output stream, keeping multi-byte characters intact across
/// read boundaries
async fn pump_output(
    mut stream: Box<dyn AsyncRead + Send + Unpin>,
    output: mpsc::UnboundedSender<String>,
    url_pattern: Regex,
    ready_callbacks: Arc<Mutex<Vec<ReadyCallback>>>,
    announced: Arc<Mutex<bool>>,
) {
    let mut buf = [0u8; READ_CHUNK];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!("process output stream closed: {}", e);
                break;
            }
        };
        pending.extend_from_slice(&buf[..n]);

        let valid = match std::str::from_utf8(&pending) {
            Ok(_) => pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => pending.len(),
        };
        let rest = pending.split_off(valid);
        let chunk = String::from_utf8_lossy(&pending).into_owned();
        pending = rest;

        if chunk.is_empty() {
            continue;
        }
        announce_if_ready(&url_pattern, &chunk, &ready_callbacks, &announced);
        if output.send(chunk).is_err() {
            break;
        }
    }

    if !pending.is_empty() {
        let _ = output.send(String::from_utf8_lossy(&pending).into_owned());
    }
}

fn announce_if_ready(
    pattern: &Regex,
    chunk: &str,
    ready_callbacks: &Mutex<Vec<ReadyCallback>>,
    announced: &Mutex<bool>,
) {
    let Some(ready) = detect_server_url(pattern, chunk) else {
        return;
    };
    {
        let mut announced = announced.lock();
        if *announced {
            return;
        }
        *announced = true;
    }
    tracing::info!(port = ready.port, url = %ready.url, "server became reachable");
    let callbacks = ready_callbacks.lock().clone();
    for callback in callbacks {
        callback(ready.clone());
    }
}

struct LocalProcessHandle {
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

#[async_trait]
impl ProcessHandle for LocalProcessHandle {
    async fn kill(&self) -> Result<(), SandboxError> {
        if let Some(tx) = self.kill_tx.lock().take() {
            // The waiter task may already have exited with the process
            let _ = tx.send(());
        }
        Ok(())
    }
}
