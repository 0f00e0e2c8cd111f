use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the per-subscriber event backlog
const EVENT_CAPACITY: usize = 1024;

const ERROR_PREFIX: &str = "[ERROR] ";
const SUCCESS_PREFIX: &str = "[OK] ";

/// Change to the committed terminal stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Appended(String),
    Cleared,
}

/// Shared append-only terminal output
///
/// Every producer (install output, server output, ad-hoc commands, the
/// orchestrator's own notices) appends through a clone of the same buffer.
/// Each append happens under one lock, so chunks are never interleaved and
/// subscribers see events in the same order as the stored text.
#[derive(Clone)]
pub struct TerminalBuffer {
    text: Arc<Mutex<String>>,
    events: broadcast::Sender<OutputEvent>,
}

impl std::fmt::Debug for TerminalBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalBuffer")
            .field("len", &self.text.lock().len())
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

impl Default for TerminalBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalBuffer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            text: Arc::new(Mutex::new(String::new())),
            events,
        }
    }

    /// Append a chunk verbatim
    pub fn write(&self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let mut text = self.text.lock();
        text.push_str(chunk);
        // No subscribers is fine; the text is still recorded
        let _ = self.events.send(OutputEvent::Appended(chunk.to_string()));
    }

    pub fn write_error(&self, message: &str) {
        self.write(&format!("{ERROR_PREFIX}{message}"));
    }

    pub fn write_success(&self, message: &str) {
        self.write(&format!("{SUCCESS_PREFIX}{message}"));
    }

    /// Start a new line unless the stream is empty or already at one
    pub fn ensure_line_start(&self) {
        let mut text = self.text.lock();
        if text.is_empty() || text.ends_with('\n') {
            return;
        }
        text.push('\n');
        let _ = self.events.send(OutputEvent::Appended("\n".to_string()));
    }

    /// Truncate the stream to empty
    pub fn clear(&self) {
        let mut text = self.text.lock();
        text.clear();
        let _ = self.events.send(OutputEvent::Cleared);
    }

    pub fn contents(&self) -> String {
        self.text.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.text.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.lock().is_empty()
    }

    /// Receive every change made after this call. A receiver that falls more
    /// than the backlog behind gets `RecvError::Lagged` and should resync
    /// from [`TerminalBuffer::contents`].
    pub fn subscribe(&self) -> broadcast::Receiver<OutputEvent> {
        self.events.subscribe()
    }
}
