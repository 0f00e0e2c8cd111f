//! Per-file editor session cache
//!
//! The cache is the source of truth for a file's content once it has been
//! loaded. It never talks to the sandbox itself: activation hands out a
//! [`LoadTicket`] when a read is needed, and persisted edits are queued as
//! [`PendingWrite`]s for the owner to write through.

use super::debounce::Debouncer;
use super::document::{Document, DocumentSnapshot, ScrollOffset};
use super::surface::EditorSurface;
use crate::language::Language;
use crate::services::sandbox::SandboxError;
use crate::services::time_source::SharedTimeSource;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Text shown while a file's real content is loading
pub const DEFAULT_PLACEHOLDER: &str = "// Loading file content...";

/// Inline annotation shown in place of content that failed to load
pub fn load_error_annotation(error: &SandboxError) -> String {
    format!("// Error loading file: {error}\n// Please try again or check if the file exists.")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// The load failed with this message; reactivation retries it
    Failed(String),
}

/// Cached state of one file
#[derive(Debug, Clone)]
pub struct EditorSession {
    pub content: String,
    pub document: DocumentSnapshot,
    pub scroll: ScrollOffset,
    pub cursor: usize,
    pub language: Language,
    pub status: LoadStatus,
}

impl EditorSession {
    fn new(content: String, language: Language, status: LoadStatus) -> Self {
        Self {
            document: Document::new(&content).snapshot(),
            content,
            scroll: ScrollOffset::default(),
            cursor: 0,
            language,
            status,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.status == LoadStatus::Loaded
    }
}

/// Content that must be written through to the sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub path: String,
    pub content: String,
}

/// Permission to load one path. The path stays in the loading state until
/// the ticket is completed with the read result or abandoned.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct LoadTicket {
    path: String,
}

impl LoadTicket {
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// What activating a path requires from the caller
#[derive(Debug, PartialEq, Eq)]
pub enum Activation {
    /// The path was already active
    Unchanged,
    /// Restored from the cache, nothing to load
    Restored,
    /// Cache miss; read the file and pass the result to
    /// [`SessionCache::complete_load`]
    Load(LoadTicket),
    /// A load for this path is already in flight
    AwaitingLoad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// The read failed; an inline annotation is shown instead
    Failed,
    /// The path is no longer active, the result was dropped
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Persisting once the debounce period passes
    Scheduled,
    /// The content is the loading placeholder
    DiscardedPlaceholder,
    /// The path is not the one on the surface
    DiscardedInactive,
    /// The path is loading or its load failed
    DiscardedNotLoaded,
}

#[derive(Debug)]
pub struct SessionCache {
    sessions: HashMap<String, EditorSession>,
    /// Paths with a load ticket outstanding
    in_flight: HashSet<String>,
    /// The only path the surface may show or edit
    active: Option<String>,
    surface: EditorSurface,
    debouncer: Debouncer<PendingWrite>,
    outbox: Vec<PendingWrite>,
    placeholder: String,
}

impl SessionCache {
    pub fn new(placeholder: impl Into<String>, debounce: Duration, clock: SharedTimeSource) -> Self {
        Self {
            sessions: HashMap::new(),
            in_flight: HashSet::new(),
            active: None,
            surface: EditorSurface::new(),
            debouncer: Debouncer::new(debounce, clock),
            outbox: Vec::new(),
            placeholder: placeholder.into(),
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn active_path(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn surface(&self) -> &EditorSurface {
        &self.surface
    }

    pub fn get(&self, path: &str) -> Option<&EditorSession> {
        self.sessions.get(path)
    }

    pub fn is_loading(&self, path: &str) -> bool {
        self.in_flight.contains(path)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Put `path` on the surface, deactivating whatever was there
    pub fn on_file_activated(&mut self, path: &str) -> Activation {
        if self.active.as_deref() == Some(path) {
            return Activation::Unchanged;
        }
        if let Some(previous) = self.active.clone() {
            self.on_file_deactivated(&previous);
        }
        self.active = Some(path.to_string());

        if let Some(session) = self.sessions.get(path).filter(|s| s.is_loaded()) {
            self.surface.restore(
                &session.document,
                session.cursor,
                session.scroll,
                session.language,
            );
            tracing::debug!("session cache hit for {}", path);
            return Activation::Restored;
        }

        self.surface
            .show(&self.placeholder, Language::from_file_name(path));
        if self.in_flight.contains(path) {
            tracing::debug!("load already in flight for {}", path);
            return Activation::AwaitingLoad;
        }

        tracing::debug!(
            retry = self.sessions.contains_key(path),
            "session cache miss for {}",
            path
        );
        self.in_flight.insert(path.to_string());
        Activation::Load(LoadTicket {
            path: path.to_string(),
        })
    }

    /// Take `path` off the surface, snapshotting its content, cursor and
    /// scroll and force-flushing any debounced edit
    pub fn on_file_deactivated(&mut self, path: &str) {
        if self.active.as_deref() != Some(path) {
            return;
        }
        self.active = None;

        if self.in_flight.contains(path) {
            tracing::debug!("deactivated {} while loading", path);
            return;
        }
        let Some(session) = self.sessions.get_mut(path).filter(|s| s.is_loaded()) else {
            return;
        };

        session.cursor = self.surface.cursor();
        session.scroll = self.surface.effective_scroll();
        session.document = self.surface.document().snapshot();
        session.content = self.surface.text();

        if self.debouncer.pending().is_some_and(|w| w.path == path) {
            if let Some(mut write) = self.debouncer.flush() {
                write.content = session.content.clone();
                tracing::trace!("flushing pending edit for {} on deactivate", path);
                self.outbox.push(write);
            }
        }
    }

    /// Apply the result of a load. Results for a path that is no longer
    /// active are discarded.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<String, SandboxError>,
    ) -> LoadOutcome {
        let path = ticket.path;
        self.in_flight.remove(&path);

        if self.active.as_deref() != Some(path.as_str()) {
            tracing::debug!("discarding stale load result for {}", path);
            return LoadOutcome::Stale;
        }

        let language = Language::from_file_name(&path);
        match result {
            Ok(content) => {
                tracing::debug!(language = language.name(), "loaded {}", path);
                self.surface.show(&content, language);
                self.sessions.insert(
                    path,
                    EditorSession::new(content, language, LoadStatus::Loaded),
                );
                LoadOutcome::Applied
            }
            Err(e) => {
                tracing::warn!("failed to load {}: {}", path, e);
                let annotation = load_error_annotation(&e);
                self.surface.show(&annotation, language);
                self.sessions.insert(
                    path,
                    EditorSession::new(annotation, language, LoadStatus::Failed(e.to_string())),
                );
                LoadOutcome::Failed
            }
        }
    }

    /// Give up on a load that will never complete. The path leaves the
    /// loading state and, if still active, is taken off the surface so the
    /// next activation reads it again.
    pub fn abandon_load(&mut self, ticket: LoadTicket) {
        let path = ticket.path;
        self.in_flight.remove(&path);
        if self.active.as_deref() == Some(path.as_str()) {
            self.active = None;
        }
        tracing::debug!("abandoned load of {}", path);
    }

    /// Record an edit to the active file and (re)arm its debounced write
    pub fn on_edit_committed(&mut self, path: &str, content: &str) -> EditOutcome {
        if content == self.placeholder {
            tracing::debug!("ignoring placeholder edit for {}", path);
            return EditOutcome::DiscardedPlaceholder;
        }
        if self.active.as_deref() != Some(path) {
            tracing::warn!("ignoring edit for inactive path {}", path);
            return EditOutcome::DiscardedInactive;
        }
        let loaded = self.sessions.get(path).is_some_and(EditorSession::is_loaded);
        if self.in_flight.contains(path) || !loaded {
            tracing::debug!("ignoring edit for {} before it loaded", path);
            return EditOutcome::DiscardedNotLoaded;
        }

        self.surface.set_text(content);
        let superseded = self.debouncer.schedule(PendingWrite {
            path: path.to_string(),
            content: content.to_string(),
        });
        if let Some(previous) = superseded.filter(|w| w.path != path) {
            self.commit(&previous);
            self.outbox.push(previous);
        }
        EditOutcome::Scheduled
    }

    /// Persist the debounced edit if its quiet period has passed
    pub fn poll_debounce(&mut self) -> bool {
        let Some(write) = self.debouncer.poll() else {
            return false;
        };
        tracing::trace!("debounce fired for {}", write.path);
        self.commit(&write);
        self.outbox.push(write);
        true
    }

    /// Persist the debounced edit immediately
    pub fn flush(&mut self) -> bool {
        let Some(write) = self.debouncer.flush() else {
            return false;
        };
        self.commit(&write);
        self.outbox.push(write);
        true
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Drain the writes queued for the sandbox, oldest first
    pub fn take_writes(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.outbox)
    }

    pub fn move_cursor(&mut self, offset: usize) -> usize {
        self.surface.set_cursor(offset)
    }

    pub fn scroll_to(&mut self, offset: ScrollOffset) {
        self.surface.scroll_to(offset);
    }

    pub fn after_layout(&mut self) -> Option<ScrollOffset> {
        self.surface.after_layout()
    }

    /// Tear down the editing surface, dropping every session. Any debounced
    /// edit is still queued for writing.
    pub fn teardown(&mut self) {
        self.flush();
        self.sessions.clear();
        self.in_flight.clear();
        self.active = None;
        self.surface.clear();
        tracing::debug!("session cache torn down");
    }

    fn commit(&mut self, write: &PendingWrite) {
        if let Some(session) = self.sessions.get_mut(&write.path) {
            session.document = Document::new(&write.content).snapshot();
            session.content = write.content.clone();
        }
    }
}
