use ropey::Rope;
use serde::{Deserialize, Serialize};

/// Scroll position of the editing surface, in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScrollOffset {
    pub x: u32,
    pub y: u32,
}

impl ScrollOffset {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Immutable view of a document's text
///
/// Cloning a rope shares its nodes, so taking a snapshot on every tab switch
/// does not copy the text.
#[derive(Debug, Clone, Default)]
pub struct DocumentSnapshot(Rope);

impl DocumentSnapshot {
    pub fn len_chars(&self) -> usize {
        self.0.len_chars()
    }

    pub fn text(&self) -> String {
        self.0.to_string()
    }
}

impl PartialEq for DocumentSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

/// The editor's mutable text plus its primary cursor
///
/// Cursor positions are char offsets and always lie within the text.
#[derive(Debug, Clone, Default)]
pub struct Document {
    text: Rope,
    cursor: usize,
}

impl Document {
    pub fn new(text: &str) -> Self {
        Self {
            text: Rope::from_str(text),
            cursor: 0,
        }
    }

    pub fn from_snapshot(snapshot: &DocumentSnapshot, cursor: usize) -> Self {
        let mut doc = Self {
            text: snapshot.0.clone(),
            cursor: 0,
        };
        doc.set_cursor(cursor);
        doc
    }

    pub fn text(&self) -> String {
        self.text.to_string()
    }

    pub fn len_chars(&self) -> usize {
        self.text.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.text.len_chars() == 0
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor, clamped to the document length. Returns the applied
    /// offset.
    pub fn set_cursor(&mut self, offset: usize) -> usize {
        self.cursor = offset.min(self.len_chars());
        self.cursor
    }

    /// Replace the whole text, keeping the cursor where it still fits
    pub fn replace_all(&mut self, text: &str) {
        self.text = Rope::from_str(text);
        self.cursor = self.cursor.min(self.len_chars());
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot(self.text.clone())
    }

    /// Compare against a string without materializing the rope
    pub fn equals(&self, other: &str) -> bool {
        self.text == other
    }
}
