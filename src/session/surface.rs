use super::document::{Document, DocumentSnapshot, ScrollOffset};
use crate::language::Language;

/// The single visible editing surface
///
/// Holds whatever document is currently shown. Scroll geometry is only valid
/// once the surface has been laid out, so a restored scroll offset is parked
/// in `pending_scroll` until [`EditorSurface::after_layout`] runs.
#[derive(Debug, Clone, Default)]
pub struct EditorSurface {
    document: Document,
    scroll: ScrollOffset,
    pending_scroll: Option<ScrollOffset>,
    language: Language,
}

impl EditorSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn text(&self) -> String {
        self.document.text()
    }

    pub fn cursor(&self) -> usize {
        self.document.cursor()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Scroll offset currently applied to the laid-out surface
    pub fn scroll(&self) -> ScrollOffset {
        self.scroll
    }

    /// Scroll offset waiting for the next layout pass
    pub fn pending_scroll(&self) -> Option<ScrollOffset> {
        self.pending_scroll
    }

    /// The offset the surface is at, or will be at once laid out
    pub fn effective_scroll(&self) -> ScrollOffset {
        self.pending_scroll.unwrap_or(self.scroll)
    }

    /// Show fresh text with the cursor and scroll at the top
    pub fn show(&mut self, text: &str, language: Language) {
        self.document = Document::new(text);
        self.scroll = ScrollOffset::default();
        self.pending_scroll = None;
        self.language = language;
    }

    /// Show a cached document, clamping the cursor and deferring the scroll
    pub fn restore(
        &mut self,
        snapshot: &DocumentSnapshot,
        cursor: usize,
        scroll: ScrollOffset,
        language: Language,
    ) {
        self.document = Document::from_snapshot(snapshot, cursor);
        self.scroll = ScrollOffset::default();
        self.pending_scroll = Some(scroll);
        self.language = language;
    }

    /// Replace the visible text after an edit
    pub fn set_text(&mut self, text: &str) {
        if !self.document.equals(text) {
            self.document.replace_all(text);
        }
    }

    pub fn set_cursor(&mut self, offset: usize) -> usize {
        self.document.set_cursor(offset)
    }

    /// User-driven scroll. Supersedes any restore still waiting for layout.
    pub fn scroll_to(&mut self, offset: ScrollOffset) {
        self.pending_scroll = None;
        self.scroll = offset;
    }

    /// Apply a parked scroll offset now that geometry is valid
    pub fn after_layout(&mut self) -> Option<ScrollOffset> {
        let offset = self.pending_scroll.take()?;
        self.scroll = offset;
        Some(offset)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_defers_scroll_until_layout() {
        let snapshot = Document::new("line 1\nline 2\n").snapshot();
        let mut surface = EditorSurface::new();
        surface.restore(&snapshot, 100, ScrollOffset::new(0, 240), Language::Markdown);

        assert_eq!(surface.cursor(), 14);
        assert_eq!(surface.scroll(), ScrollOffset::default());
        assert_eq!(surface.effective_scroll(), ScrollOffset::new(0, 240));

        assert_eq!(surface.after_layout(), Some(ScrollOffset::new(0, 240)));
        assert_eq!(surface.scroll(), ScrollOffset::new(0, 240));
        assert_eq!(surface.after_layout(), None);
    }

    #[test]
    fn test_user_scroll_cancels_pending_restore() {
        let snapshot = Document::new("x").snapshot();
        let mut surface = EditorSurface::new();
        surface.restore(&snapshot, 0, ScrollOffset::new(0, 50), Language::default());

        surface.scroll_to(ScrollOffset::new(0, 10));
        assert_eq!(surface.after_layout(), None);
        assert_eq!(surface.scroll(), ScrollOffset::new(0, 10));
    }
}
