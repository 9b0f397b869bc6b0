use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use sqlpane_core::session::{EditorOptions, EditorWidget, LiveEditor};

/// Editable text with a byte-offset cursor that always sits on a char boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    cursor: usize,
}

impl TextBuffer {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self { text, cursor }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Replaces the whole text, keeping the cursor where it still fits.
    pub fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        self.cursor = floor_boundary(&self.text, self.cursor);
    }

    #[must_use]
    pub fn next_char(&self) -> Option<char> {
        self.text[self.cursor..].chars().next()
    }

    #[must_use]
    pub fn previous_char(&self) -> Option<char> {
        self.text[..self.cursor].chars().next_back()
    }

    pub fn insert_char(&mut self, ch: char) {
        self.text.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    pub fn insert_str(&mut self, text: &str) {
        self.text.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    /// Inserts `open` and `close` and leaves the cursor between them.
    pub fn insert_pair(&mut self, open: char, close: char) {
        self.insert_char(open);
        self.text.insert(self.cursor, close);
    }

    pub fn backspace(&mut self) -> bool {
        let Some(previous) = self.previous_char() else {
            return false;
        };
        self.cursor -= previous.len_utf8();
        self.text.remove(self.cursor);
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.text.len() {
            return false;
        }
        self.text.remove(self.cursor);
        true
    }

    /// Replaces `range` with `insert`, then places the cursor `back` chars
    /// before the end of the inserted text.
    pub fn replace_range(&mut self, range: Range<usize>, insert: &str, back: usize) {
        let start = floor_boundary(&self.text, range.start);
        let end = floor_boundary(&self.text, range.end.max(start));
        self.text.replace_range(start..end, insert);
        let inserted_end = start + insert.len();
        self.cursor = insert
            .char_indices()
            .rev()
            .nth(back.saturating_sub(1))
            .filter(|_| back > 0)
            .map_or(inserted_end, |(index, _)| start + index);
    }

    pub fn move_left(&mut self) {
        if let Some(previous) = self.previous_char() {
            self.cursor -= previous.len_utf8();
        }
    }

    pub fn move_right(&mut self) {
        if let Some(next) = self.next_char() {
            self.cursor += next.len_utf8();
        }
    }

    pub fn move_home(&mut self) {
        self.cursor = self.line_start(self.cursor);
    }

    pub fn move_end(&mut self) {
        self.cursor = self.line_end(self.cursor);
    }

    pub fn move_up(&mut self) {
        let start = self.line_start(self.cursor);
        if start == 0 {
            self.cursor = 0;
            return;
        }
        let column = self.text[start..self.cursor].chars().count();
        let previous_end = start - 1;
        let previous_start = self.line_start(previous_end);
        self.cursor = self.offset_at_column(previous_start, previous_end, column);
    }

    pub fn move_down(&mut self) {
        let end = self.line_end(self.cursor);
        if end == self.text.len() {
            self.cursor = end;
            return;
        }
        let column = self.text[self.line_start(self.cursor)..self.cursor]
            .chars()
            .count();
        let next_start = end + 1;
        let next_end = self.line_end(next_start);
        self.cursor = self.offset_at_column(next_start, next_end, column);
    }

    /// Zero-based line and char column of the cursor.
    #[must_use]
    pub fn line_col(&self) -> (usize, usize) {
        let before = &self.text[..self.cursor];
        let line = before.matches('\n').count();
        let column = before[self.line_start(self.cursor)..].chars().count();
        (line, column)
    }

    /// Comments the cursor line with `marker`, or removes an existing marker.
    pub fn toggle_line_comment(&mut self, marker: &str) {
        let start = self.line_start(self.cursor);
        let line = &self.text[start..self.line_end(self.cursor)];
        let indent = line.len() - line.trim_start().len();
        let marker_at = start + indent;

        if line.trim_start().starts_with(marker) {
            let mut removed = marker.len();
            if self.text[marker_at + removed..].starts_with(' ') {
                removed += 1;
            }
            self.text.replace_range(marker_at..marker_at + removed, "");
            self.cursor = if self.cursor >= marker_at + removed {
                self.cursor - removed
            } else {
                self.cursor.min(marker_at)
            };
        } else {
            let inserted = format!("{marker} ");
            self.text.insert_str(marker_at, &inserted);
            if self.cursor >= marker_at {
                self.cursor += inserted.len();
            }
        }
    }

    fn line_start(&self, at: usize) -> usize {
        self.text[..at].rfind('\n').map_or(0, |index| index + 1)
    }

    fn line_end(&self, at: usize) -> usize {
        self.text[at..]
            .find('\n')
            .map_or(self.text.len(), |index| at + index)
    }

    fn offset_at_column(&self, start: usize, end: usize, column: usize) -> usize {
        self.text[start..end]
            .char_indices()
            .nth(column)
            .map_or(end, |(index, _)| start + index)
    }
}

fn floor_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

pub type SharedBuffer = Rc<RefCell<TextBuffer>>;

/// Live session backed by the terminal buffer.
#[derive(Debug)]
pub struct TerminalEditor {
    buffer: SharedBuffer,
}

impl LiveEditor for TerminalEditor {
    fn value(&self) -> String {
        self.buffer.borrow().text().to_string()
    }

    fn set_value(&mut self, text: &str) {
        self.buffer.borrow_mut().set_text(text);
    }
}

/// Builds a fresh buffer per mount; the previous buffer and its cursor are dropped.
#[derive(Debug, Default)]
pub struct TerminalWidget {
    buffer: SharedBuffer,
    version: u64,
    options: EditorOptions,
}

impl TerminalWidget {
    #[must_use]
    pub fn buffer(&self) -> SharedBuffer {
        Rc::clone(&self.buffer)
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn options(&self) -> &EditorOptions {
        &self.options
    }
}

impl EditorWidget for TerminalWidget {
    fn create(&mut self, version: u64, text: &str, options: &EditorOptions) -> Box<dyn LiveEditor> {
        self.buffer = Rc::new(RefCell::new(TextBuffer::new(text)));
        self.version = version;
        self.options = options.clone();
        Box::new(TerminalEditor {
            buffer: Rc::clone(&self.buffer),
        })
    }
}

#[cfg(test)]
mod tests {
    use sqlpane_core::session::{EditorOptions, EditorWidget};

    use super::{TerminalWidget, TextBuffer};

    #[test]
    fn vertical_moves_keep_the_column() {
        let mut buffer = TextBuffer::new("SELECT id\nFROM t\nWHERE id = 1");
        assert_eq!(buffer.line_col(), (2, 12));

        buffer.move_up();
        assert_eq!(buffer.line_col(), (1, 6));
        buffer.move_up();
        assert_eq!(buffer.line_col(), (0, 6));
        buffer.move_up();
        assert_eq!(buffer.cursor(), 0);

        buffer.move_down();
        assert_eq!(buffer.line_col(), (1, 0));
        buffer.move_end();
        buffer.move_down();
        assert_eq!(buffer.line_col(), (2, 6));
    }

    #[test]
    fn editing_respects_multibyte_chars() {
        let mut buffer = TextBuffer::new("名前");
        assert!(buffer.backspace());
        assert_eq!(buffer.text(), "名");
        buffer.move_left();
        buffer.insert_char('é');
        assert_eq!(buffer.text(), "é名");
        assert!(buffer.delete());
        assert_eq!(buffer.text(), "é");
        assert!(!buffer.delete());
    }

    #[test]
    fn pairs_and_replacements_place_the_cursor() {
        let mut buffer = TextBuffer::new("SELECT co");
        buffer.replace_range(7..9, "COUNT()", 1);
        assert_eq!(buffer.text(), "SELECT COUNT()");
        assert_eq!(buffer.next_char(), Some(')'));

        buffer.insert_pair('\'', '\'');
        assert_eq!(buffer.text(), "SELECT COUNT('')");
        assert_eq!(buffer.previous_char(), Some('\''));
        assert_eq!(buffer.next_char(), Some('\''));
    }

    #[test]
    fn line_comments_toggle() {
        let mut buffer = TextBuffer::new("  SELECT 1");
        buffer.toggle_line_comment("--");
        assert_eq!(buffer.text(), "  -- SELECT 1");
        assert_eq!(buffer.cursor(), buffer.text().len());

        buffer.toggle_line_comment("--");
        assert_eq!(buffer.text(), "  SELECT 1");
        assert_eq!(buffer.cursor(), buffer.text().len());
    }

    #[test]
    fn each_mount_gets_a_fresh_buffer() {
        let mut widget = TerminalWidget::default();
        let mut first = widget.create(0, "SELECT 1", &EditorOptions::default());
        let first_buffer = widget.buffer();
        first_buffer.borrow_mut().move_home();

        let second = widget.create(1, "SELECT 2", &EditorOptions::default());
        assert_eq!(widget.version(), 1);
        assert_eq!(second.value(), "SELECT 2");
        assert_eq!(widget.buffer().borrow().cursor(), "SELECT 2".len());

        first.set_value("stale");
        assert_eq!(widget.buffer().borrow().text(), "SELECT 2");
    }
}
