//! Editor session state
//!
//! - `document`: the editor's text representation and scroll geometry
//! - `surface`: the single visible editing surface
//! - `debounce`: single-slot timer used to coalesce edit bursts
//! - `cache`: per-path sessions and their load/persist lifecycle

pub mod cache;
pub mod debounce;
pub mod document;
pub mod surface;

pub use cache::{
    load_error_annotation, Activation, EditOutcome, EditorSession, LoadOutcome, LoadStatus,
    LoadTicket, PendingWrite, SessionCache, DEFAULT_PLACEHOLDER,
};
pub use debounce::Debouncer;
pub use document::{Document, DocumentSnapshot, ScrollOffset};
pub use surface::EditorSurface;

use crate::services::sandbox::SandboxError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Writing a file through to the sandbox failed. Not retried.
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: SandboxError,
    },
    #[error(transparent)]
    InvalidPath(#[from] crate::file_tree::TreeError),
}
