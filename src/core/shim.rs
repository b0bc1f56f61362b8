//! Buffer introspection shim.
//!
//! These reads go straight into the engine's screen representation (cursor
//! fields, buffer selector, raw rows). They are kept out of
//! [`TerminalEngine`](super::engine::TerminalEngine) so that a change to the
//! engine's internal layout only touches the impl in this file. Bump
//! [`BufferShim::REVISION`] whenever that impl is updated for a new layout.

use super::engine::VtEngine;

/// Zero-based cursor location on the active buffer's screen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorPosition {
    pub column: u16,
    pub row: u16,
}

/// Read-only access to engine-internal buffer state
pub trait BufferShim {
    /// Engine layout this shim was written against
    const REVISION: &'static str;

    /// Cursor location. The column may equal the width while a wrap is pending.
    fn cursor_position(&self) -> CursorPosition;

    fn alternate_buffer_active(&self) -> bool;

    /// Text of the line holding the cursor, padded to the terminal width
    fn current_line_text(&self) -> String;

    /// Scroll-back and screen of the active buffer, one line per row with
    /// trailing blanks trimmed and trailing empty rows dropped.
    ///
    /// Unlike a dump of the visible rows, lines are joined with `\n` and
    /// include history, so `"a\nb"` reads the same at any terminal width.
    fn full_buffer_text(&self) -> String;
}

impl BufferShim for VtEngine {
    const REVISION: &'static str = "vt-state/1";

    fn cursor_position(&self) -> CursorPosition {
        let cursor = self.state().active_cursor();
        CursorPosition {
            column: cursor.col,
            row: cursor.row,
        }
    }

    fn alternate_buffer_active(&self) -> bool {
        self.state().using_alternate
    }

    fn current_line_text(&self) -> String {
        let state = self.state();
        state
            .active_screen()
            .rows
            .get(state.active_cursor().row as usize)
            .map(|row| row.text())
            .unwrap_or_default()
    }

    fn full_buffer_text(&self) -> String {
        let mut lines: Vec<String> = self
            .state()
            .active_screen()
            .all_rows()
            .map(|row| row.text().trim_end().to_string())
            .collect();

        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::{Dimensions, EngineOptions, TerminalEngine};

    fn engine(cols: u16, rows: u16) -> VtEngine {
        let mut engine = VtEngine::new(EngineOptions::default()).unwrap();
        engine.resize(Dimensions::new(cols, rows));
        engine
    }

    #[test]
    fn test_current_line_is_padded() {
        let mut engine = engine(6, 3);
        engine.write(b"one\r\nhi");
        assert_eq!(engine.current_line_text(), "hi    ");
        assert_eq!(engine.cursor_position(), CursorPosition { column: 2, row: 1 });
    }

    #[test]
    fn test_full_buffer_includes_scrollback() {
        let mut engine = engine(10, 2);
        engine.write(b"a\r\nb\r\nc\r\nd");
        assert_eq!(engine.full_buffer_text(), "a\nb\nc\nd");
    }

    #[test]
    fn test_empty_buffer_reads_empty() {
        let engine = engine(10, 2);
        assert_eq!(engine.full_buffer_text(), "");
        assert_eq!(engine.current_line_text().trim_end(), "");
    }

    #[test]
    fn test_alternate_buffer_reads_alternate_content() {
        let mut engine = engine(10, 2);
        engine.write(b"main\x1b[?1047hfull");
        assert!(engine.alternate_buffer_active());
        // The alternate buffer keeps its own cursor
        assert_eq!(engine.full_buffer_text(), "full");

        engine.write(b"\x1b[?1047l");
        assert_eq!(engine.full_buffer_text(), "main");
    }
}
