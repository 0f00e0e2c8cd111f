//! Terminal state: the shared output stream, the line being typed, and the
//! record of executed lines.

pub mod buffer;
pub mod history;
pub mod line_editor;

pub use buffer::{OutputEvent, TerminalBuffer};
pub use history::CommandHistory;
pub use line_editor::{Emission, InputEffect, LineEditor};
