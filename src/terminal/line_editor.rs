use unicode_segmentation::UnicodeSegmentation;

const ENTER: char = '\r';
const BACKSPACE: char = '\u{7f}';
const CTRL_H: char = '\u{8}';
const INTERRUPT: char = '\u{3}';
const ESCAPE: char = '\u{1b}';

const NEWLINE_ECHO: &str = "\r\n";
const ERASE_ECHO: &str = "\u{8} \u{8}";
const INTERRUPT_ECHO: &str = "^C\r\n";

/// Something the line editor hands downstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// A committed logical line, without its terminator
    Line(String),
    /// Ctrl-C
    Interrupt,
}

/// Result of feeding one input event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputEffect {
    /// Text to echo to the terminal right away
    pub echo: String,
    pub emissions: Vec<Emission>,
}

/// Progress through an escape sequence that may span several chunks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Escape {
    #[default]
    None,
    /// Saw ESC
    Start,
    /// Inside `ESC [`, waiting for the final byte
    Csi,
    /// Saw `ESC O`; the next char ends it
    Ss3,
}

impl Escape {
    /// Advance on `ch`; returns the next state
    fn step(self, ch: char) -> Escape {
        match self {
            Escape::None => Escape::None,
            Escape::Start => match ch {
                '[' => Escape::Csi,
                'O' => Escape::Ss3,
                _ => Escape::None,
            },
            // Parameter and intermediate bytes keep the sequence open
            Escape::Csi if ('\u{20}'..='\u{3f}').contains(&ch) => Escape::Csi,
            Escape::Csi | Escape::Ss3 => Escape::None,
        }
    }
}

/// Turns raw terminal input into committed lines
///
/// Escape sequences (arrow keys and the like) are skipped up to their final
/// byte, as is any other control code without a rule below. Input after the
/// sequence is handled normally.
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    line: String,
    escape: Escape,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The line being composed
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn feed(&mut self, data: &str) -> InputEffect {
        let mut effect = InputEffect::default();
        for ch in data.chars() {
            if self.escape != Escape::None {
                self.escape = self.escape.step(ch);
                continue;
            }
            match ch {
                ESCAPE => self.escape = Escape::Start,
                ENTER => {
                    effect.echo.push_str(NEWLINE_ECHO);
                    effect
                        .emissions
                        .push(Emission::Line(std::mem::take(&mut self.line)));
                }
                BACKSPACE | CTRL_H => {
                    if self.erase_last() {
                        effect.echo.push_str(ERASE_ECHO);
                    }
                }
                INTERRUPT => {
                    self.line.clear();
                    effect.echo.push_str(INTERRUPT_ECHO);
                    effect.emissions.push(Emission::Interrupt);
                }
                c if c.is_control() => {}
                c => {
                    self.line.push(c);
                    effect.echo.push(c);
                }
            }
        }
        // A bare ESC ending the chunk is the Escape key itself
        if self.escape == Escape::Start {
            self.escape = Escape::None;
        }
        effect
    }

    /// Remove the last user-perceived character
    fn erase_last(&mut self) -> bool {
        match self.line.grapheme_indices(true).next_back() {
            Some((start, _)) => {
                self.line.truncate(start);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_commits_and_resets() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.feed("l").echo, "l");
        editor.feed("s");

        let effect = editor.feed("\r");
        assert_eq!(effect.echo, "\r\n");
        assert_eq!(effect.emissions, vec![Emission::Line("ls".into())]);
        assert_eq!(editor.line(), "");
    }

    #[test]
    fn test_backspace_never_underflows() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.feed("\u{7f}"), InputEffect::default());

        editor.feed("ab");
        assert_eq!(editor.feed("\u{7f}").echo, "\u{8} \u{8}");
        assert_eq!(editor.line(), "a");
        editor.feed("\u{7f}\u{7f}\u{7f}");
        assert_eq!(editor.line(), "");
    }

    #[test]
    fn test_backspace_removes_whole_grapheme() {
        let mut editor = LineEditor::new();
        editor.feed("ye\u{301}");
        editor.feed("\u{7f}");
        assert_eq!(editor.line(), "y");
    }

    #[test]
    fn test_interrupt_clears_without_committing() {
        let mut editor = LineEditor::new();
        editor.feed("npm sta");

        let effect = editor.feed("\u{3}");
        assert_eq!(effect.echo, "^C\r\n");
        assert_eq!(effect.emissions, vec![Emission::Interrupt]);
        assert_eq!(editor.line(), "");
    }

    #[test]
    fn test_arrow_keys_are_inert() {
        let mut editor = LineEditor::new();
        editor.feed("ls");
        assert_eq!(editor.feed("\u{1b}[A"), InputEffect::default());
        assert_eq!(editor.feed("\u{1b}[B"), InputEffect::default());
        assert_eq!(editor.feed("\t"), InputEffect::default());
        assert_eq!(editor.line(), "ls");
    }

    #[test]
    fn test_input_after_escape_sequence_is_kept() {
        let mut editor = LineEditor::new();
        let effect = editor.feed("pwd\r\u{1b}[Als\r");
        assert_eq!(effect.echo, "pwd\r\nls\r\n");
        assert_eq!(
            effect.emissions,
            vec![Emission::Line("pwd".into()), Emission::Line("ls".into())]
        );

        // Parameters, SS3 keys and a CSI split across chunks
        editor.feed("a\u{1b}[1;5Cb\u{1b}OHc\u{1b}[1;");
        editor.feed("5D");
        editor.feed("d");
        assert_eq!(editor.line(), "abcd");

        // A lone Escape key press does not swallow the next key
        editor.feed("\u{1b}");
        editor.feed("e");
        assert_eq!(editor.line(), "abcde");
    }

    #[test]
    fn test_pasted_lines() {
        let mut editor = LineEditor::new();
        let effect = editor.feed("pwd\rls\r");
        assert_eq!(
            effect.emissions,
            vec![Emission::Line("pwd".into()), Emission::Line("ls".into())]
        );
    }
}
