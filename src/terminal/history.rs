/// Executed command lines, oldest first, with a navigation cursor
///
/// Navigation is available to callers but no key is bound to it.
#[derive(Debug, Clone, Default)]
pub struct CommandHistory {
    entries: Vec<String>,
    /// Index into `entries` while navigating; `None` means "past the end"
    position: Option<usize>,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a line and reset navigation. Blank lines and immediate repeats
    /// are not recorded.
    pub fn record(&mut self, line: &str) {
        self.position = None;
        let line = line.trim();
        if line.is_empty() || self.entries.last().is_some_and(|last| last == line) {
            return;
        }
        self.entries.push(line.to_string());
    }

    /// Step back to an older line
    pub fn previous(&mut self) -> Option<&str> {
        let index = match self.position {
            None => self.entries.len().checked_sub(1)?,
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.position = Some(index);
        self.entries.get(index).map(String::as_str)
    }

    /// Step forward to a newer line; `None` once past the newest
    pub fn next(&mut self) -> Option<&str> {
        let index = self.position? + 1;
        if index >= self.entries.len() {
            self.position = None;
            return None;
        }
        self.position = Some(index);
        self.entries.get(index).map(String::as_str)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
