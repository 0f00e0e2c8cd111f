//! Top-level session controller
//!
//! Composes the file tree, the editor session cache, the terminal line
//! editor and the process orchestrator behind the intents the UI issues.
//! Every sandbox call happens outside the state lock; the lock is only held
//! for the synchronous bookkeeping around it.

use crate::appearance::{Appearance, Background};
use crate::config::Config;
use crate::file_tree::{self, validate_path, TreeNode};
use crate::language::Language;
use crate::services::process::{ProcessError, ProcessOrchestrator, ServerState};
use crate::services::sandbox::{Sandbox, SandboxError};
use crate::services::time_source::{RealTimeSource, SharedTimeSource};
use crate::session::{
    Activation, EditOutcome, EditorSession, LoadOutcome, LoadTicket, PendingWrite, ScrollOffset,
    SessionCache, SessionError,
};
use crate::terminal::{CommandHistory, Emission, InputEffect, LineEditor, OutputEvent, TerminalBuffer};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};

/// What the editor surface currently shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub path: String,
    pub content: String,
    pub cursor: usize,
    pub scroll: ScrollOffset,
    pub language: Language,
    /// The content is the loading placeholder
    pub loading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Shown from the cache
    Restored,
    /// Read from the sandbox and shown
    Loaded,
    /// The read failed; an inline error is shown
    LoadFailed,
    /// Another file was selected before the read returned
    Superseded,
    /// A read for this path was already in flight
    Pending,
    /// The path was already active
    Unchanged,
    /// Folders cannot be opened in the editor
    Ignored,
}

/// A load started by `select_file`. If the select future is dropped before
/// the read returns, the ticket goes back to the cache.
struct LoadGuard<'a> {
    state: &'a Mutex<ControllerState>,
    ticket: Option<LoadTicket>,
}

impl LoadGuard<'_> {
    fn complete(mut self, result: Result<String, SandboxError>) -> LoadOutcome {
        match self.ticket.take() {
            Some(ticket) => self.state.lock().cache.complete_load(ticket, result),
            None => LoadOutcome::Stale,
        }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.state.lock().cache.abandon_load(ticket);
        }
    }
}

struct ControllerState {
    cache: SessionCache,
    written: BTreeSet<String>,
    tree: Vec<TreeNode>,
    tabs: Vec<String>,
    line_editor: LineEditor,
    history: CommandHistory,
}

pub struct SessionController {
    sandbox: Arc<dyn Sandbox>,
    state: Mutex<ControllerState>,
    orchestrator: ProcessOrchestrator,
    appearance: Appearance,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionController")
            .field("active", &state.cache.active_path())
            .field("tabs", &state.tabs)
            .field("written", &state.written.len())
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

impl SessionController {
    pub fn new(sandbox: Arc<dyn Sandbox>, config: Config) -> Self {
        Self::with_clock(sandbox, config, RealTimeSource::shared())
    }

    /// Create a controller whose debounce deadlines follow `clock`
    pub fn with_clock(sandbox: Arc<dyn Sandbox>, config: Config, clock: SharedTimeSource) -> Self {
        let cache = SessionCache::new(
            config.editor.loading_placeholder.clone(),
            config.editor.debounce(),
            clock,
        );
        let orchestrator = ProcessOrchestrator::new(
            Arc::clone(&sandbox),
            TerminalBuffer::new(),
            config.server.clone(),
            config.terminal.prompt.clone(),
        );
        if config.terminal.banner {
            orchestrator.write_banner();
        }

        Self {
            sandbox,
            state: Mutex::new(ControllerState {
                cache,
                written: BTreeSet::new(),
                tree: Vec::new(),
                tabs: Vec::new(),
                line_editor: LineEditor::new(),
                history: CommandHistory::new(),
            }),
            orchestrator,
            appearance: Appearance::new(config.background),
        }
    }

    // ---- files ----

    /// Write a set of files into the sandbox, creating parent directories.
    ///
    /// Every path is validated against the already written ones before the
    /// first write, so an invalid path leaves the sandbox and the tree as
    /// they were.
    pub async fn mount_project<I, P, C>(&self, files: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let files: Vec<(String, String)> = files
            .into_iter()
            .map(|(path, content)| (path.into(), content.into()))
            .collect();
        self.check_paths(files.iter().map(|(path, _)| path.as_str()))?;

        let mut result = Ok(());
        for (path, content) in &files {
            if let Err(e) = self.write_one(path, content).await {
                result = Err(e);
                break;
            }
            self.state.lock().written.insert(path.clone());
        }
        self.rebuild_tree();

        tracing::info!(files = files.len(), "mounted project");
        result
    }

    /// Write one file through to the sandbox and record its path
    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), SessionError> {
        self.check_paths(std::iter::once(path))?;
        self.write_one(path, content).await?;
        self.state.lock().written.insert(path.to_string());
        self.rebuild_tree();
        Ok(())
    }

    pub fn file_tree(&self) -> Vec<TreeNode> {
        self.state.lock().tree.clone()
    }

    pub fn written_paths(&self) -> Vec<String> {
        self.state.lock().written.iter().cloned().collect()
    }

    fn check_paths<'a>(&self, paths: impl Iterator<Item = &'a str>) -> Result<(), SessionError> {
        let mut all = self.state.lock().written.clone();
        for path in paths {
            validate_path(path)?;
            all.insert(path.to_string());
        }
        file_tree::PathTree::build(&all)?;
        Ok(())
    }

    async fn write_one(&self, path: &str, content: &str) -> Result<(), SessionError> {
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.sandbox
                .make_directory(parent, true)
                .await
                .map_err(|source| SessionError::Write {
                    path: path.to_string(),
                    source,
                })?;
        }
        self.sandbox
            .write_file(path, content)
            .await
            .map_err(|source| SessionError::Write {
                path: path.to_string(),
                source,
            })
    }

    fn rebuild_tree(&self) {
        let mut state = self.state.lock();
        match file_tree::build(&state.written) {
            Ok(tree) => state.tree = tree,
            Err(e) => tracing::error!("file tree rebuild failed: {}", e),
        }
    }

    // ---- editor ----

    /// Open `path` in the editor, loading it on first use
    ///
    /// A pending edit of the previously active file is written before the
    /// load. A write failure is returned after the load has been applied.
    pub async fn select_file(&self, path: &str) -> Result<SelectOutcome, SessionError> {
        let (activation, writes) = {
            let mut state = self.state.lock();
            if TreeNode::find(&state.tree, path).is_some_and(TreeNode::is_folder) {
                tracing::debug!("ignoring selection of folder {}", path);
                return Ok(SelectOutcome::Ignored);
            }
            if !state.tabs.iter().any(|tab| tab == path) {
                state.tabs.push(path.to_string());
            }
            let activation = state.cache.on_file_activated(path);
            (activation, state.cache.take_writes())
        };

        let written = self.write_through(writes).await;

        let outcome = match activation {
            Activation::Unchanged => SelectOutcome::Unchanged,
            Activation::Restored => SelectOutcome::Restored,
            Activation::AwaitingLoad => SelectOutcome::Pending,
            Activation::Load(ticket) => {
                let load = LoadGuard {
                    state: &self.state,
                    ticket: Some(ticket),
                };
                let result = self.on_load_requested(path).await;
                match load.complete(result) {
                    LoadOutcome::Applied => SelectOutcome::Loaded,
                    LoadOutcome::Failed => SelectOutcome::LoadFailed,
                    LoadOutcome::Stale => SelectOutcome::Superseded,
                }
            }
        };
        written.map(|()| outcome)
    }

    /// Read a file's content for the session cache
    pub async fn on_load_requested(&self, path: &str) -> Result<String, SandboxError> {
        tracing::debug!("loading {} from the sandbox", path);
        self.sandbox.read_file(path).await
    }

    /// Record an edit made in the editor for `path`
    pub async fn edit_content(&self, path: &str, content: &str) -> Result<EditOutcome, SessionError> {
        let (outcome, writes) = {
            let mut state = self.state.lock();
            let outcome = state.cache.on_edit_committed(path, content);
            (outcome, state.cache.take_writes())
        };
        self.write_through(writes).await?;
        Ok(outcome)
    }

    pub fn move_cursor(&self, offset: usize) -> usize {
        self.state.lock().cache.move_cursor(offset)
    }

    pub fn scroll_to(&self, offset: ScrollOffset) {
        self.state.lock().cache.scroll_to(offset);
    }

    /// The editor surface finished laying out; apply any restored scroll
    pub fn after_layout(&self) -> Option<ScrollOffset> {
        self.state.lock().cache.after_layout()
    }

    pub fn active_session(&self) -> Option<ActiveSession> {
        let state = self.state.lock();
        let path = state.cache.active_path()?;
        let surface = state.cache.surface();
        Some(ActiveSession {
            path: path.to_string(),
            content: surface.text(),
            cursor: surface.cursor(),
            scroll: surface.scroll(),
            language: surface.language(),
            loading: state.cache.is_loading(path),
        })
    }

    pub fn session(&self, path: &str) -> Option<EditorSession> {
        self.state.lock().cache.get(path).cloned()
    }

    pub fn tabs(&self) -> Vec<String> {
        self.state.lock().tabs.clone()
    }

    /// Close a tab. If it was active, its right neighbor (or else its left
    /// one) becomes active. The file's session is kept.
    pub async fn close_tab(&self, path: &str) -> Result<Option<String>, SessionError> {
        let (next, writes) = {
            let mut state = self.state.lock();
            let Some(index) = state.tabs.iter().position(|tab| tab == path) else {
                return Ok(None);
            };
            state.tabs.remove(index);
            if state.cache.active_path() != Some(path) {
                return Ok(None);
            }
            state.cache.on_file_deactivated(path);
            let next = state
                .tabs
                .get(index)
                .or_else(|| index.checked_sub(1).and_then(|i| state.tabs.get(i)))
                .cloned();
            (next, state.cache.take_writes())
        };

        self.write_through(writes).await?;
        if let Some(next) = &next {
            self.select_file(next).await?;
        }
        Ok(next)
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.state.lock().cache.debounce_deadline()
    }

    /// Write the debounced edit if its quiet period has passed
    pub async fn flush_due_edits(&self) -> Result<bool, SessionError> {
        let writes = {
            let mut state = self.state.lock();
            state.cache.poll_debounce();
            state.cache.take_writes()
        };
        let flushed = !writes.is_empty();
        self.write_through(writes).await?;
        Ok(flushed)
    }

    async fn write_through(&self, writes: Vec<PendingWrite>) -> Result<(), SessionError> {
        let mut first_error = None;
        for write in writes {
            match self.sandbox.write_file(&write.path, &write.content).await {
                Ok(()) => tracing::trace!("wrote {} through to the sandbox", write.path),
                Err(source) => {
                    tracing::error!("failed to write {}: {}", write.path, source);
                    first_error.get_or_insert(SessionError::Write {
                        path: write.path,
                        source,
                    });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // ---- server & terminal ----

    pub async fn run_project(&self) -> Result<(), ProcessError> {
        self.orchestrator.start().await
    }

    pub async fn stop_project(&self) -> Result<(), ProcessError> {
        self.orchestrator.stop().await
    }

    pub async fn execute_terminal_line(&self, line: &str) -> Result<(), ProcessError> {
        self.state.lock().history.record(line);
        self.orchestrator.execute(line).await
    }

    /// Feed raw terminal input to the line editor
    ///
    /// The returned echo should be shown right away; each emission is then
    /// passed to [`SessionController::dispatch`].
    pub fn terminal_input(&self, data: &str) -> InputEffect {
        self.state.lock().line_editor.feed(data)
    }

    pub async fn dispatch(&self, emission: Emission) -> Result<(), ProcessError> {
        match emission {
            Emission::Line(line) => self.execute_terminal_line(&line).await,
            Emission::Interrupt => self.orchestrator.interrupt().await,
        }
    }

    /// Feed input and run whatever it commits. Returns the echo.
    pub async fn handle_terminal_input(&self, data: &str) -> Result<String, ProcessError> {
        let effect = self.terminal_input(data);
        for emission in effect.emissions {
            self.dispatch(emission).await?;
        }
        Ok(effect.echo)
    }

    /// The line currently being typed
    pub fn terminal_line(&self) -> String {
        self.state.lock().line_editor.line().to_string()
    }

    pub fn clear_terminal(&self) {
        self.orchestrator.output().clear();
        self.orchestrator.write_prompt();
    }

    pub fn terminal_output(&self) -> String {
        self.orchestrator.output().contents()
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<OutputEvent> {
        self.orchestrator.output().subscribe()
    }

    pub fn server_state(&self) -> ServerState {
        self.orchestrator.state()
    }

    pub fn subscribe_server_state(&self) -> watch::Receiver<ServerState> {
        self.orchestrator.subscribe_state()
    }

    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.entries().to_vec()
    }

    pub fn history_previous(&self) -> Option<String> {
        self.state.lock().history.previous().map(str::to_string)
    }

    pub fn history_next(&self) -> Option<String> {
        self.state.lock().history.next().map(str::to_string)
    }

    // ---- appearance ----

    pub fn set_background(&self, background: Background) {
        self.appearance.set_background(background);
    }

    pub fn background(&self) -> Background {
        self.appearance.background()
    }

    pub fn subscribe_background(&self) -> watch::Receiver<Background> {
        self.appearance.subscribe()
    }

    /// Tear down the editing surface and stop any server
    ///
    /// The last debounced edit is still written. Sessions are dropped.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let writes = {
            let mut state = self.state.lock();
            state.cache.teardown();
            state.tabs.clear();
            state.cache.take_writes()
        };
        let written = self.write_through(writes).await;

        if self.orchestrator.owns_process() || !self.orchestrator.state().is_idle() {
            if let Err(e) = self.orchestrator.stop().await {
                tracing::warn!("server did not stop on shutdown: {}", e);
            }
        }
        tracing::info!("session controller shut down");
        written
    }
}
