//! Terminal renderer using crossterm
//!
//! Draws a [`TerminalState`] onto the host console.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, SetCursorStyle, Show},
    event::{
        DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
        EnableFocusChange, EnableMouseCapture,
    },
    execute, queue,
    style::{Attribute, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};

use crate::core::term::{AttrFlags, CellAttrs, CursorShape, Row, TerminalState};

/// Terminal renderer
pub struct Renderer {
    /// Whether the host console has been switched into raw mode
    initialized: bool,
    /// Geometry and buffer drawn last; a change forces a full redraw
    last_frame: Option<(u16, u16, bool)>,
    last_shape: Option<CursorShape>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            initialized: false,
            last_frame: None,
            last_shape: None,
        }
    }

    /// Initialize the host console for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            EnableMouseCapture,
            EnableBracketedPaste,
            EnableFocusChange,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;

        self.initialized = true;
        tracing::debug!("Renderer initialized");
        Ok(())
    }

    /// Restore the host console
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            SetCursorStyle::DefaultUserShape,
            Show,
            EnableLineWrap,
            DisableFocusChange,
            DisableBracketedPaste,
            DisableMouseCapture,
            LeaveAlternateScreen
        );
        let _ = stdout.flush();

        terminal::disable_raw_mode()?;
        tracing::debug!("Renderer cleaned up");
        Ok(())
    }

    /// Render the terminal state and clear its dirty tracking
    pub fn render(&mut self, state: &mut TerminalState) -> io::Result<()> {
        let frame = (state.cols, state.rows, state.using_alternate);
        if self.last_frame != Some(frame) {
            state.active_screen_mut().mark_all_dirty();
            self.last_frame = Some(frame);
        }

        {
            let stdout = io::stdout();
            let mut stdout = io::BufWriter::with_capacity(65536, stdout.lock());

            // Begin synchronized update (reduces flicker)
            write!(stdout, "\x1b[?2026h")?;
            queue!(stdout, Hide)?;

            let screen = state.active_screen();
            if screen.full_redraw {
                self.render_full(&mut stdout, state)?;
            } else if !screen.dirty_lines.is_empty() {
                self.render_dirty(&mut stdout, state)?;
            }

            self.render_cursor(&mut stdout, state)?;

            write!(stdout, "\x1b[?2026l")?;
            stdout.flush()?;
        }

        state.active_screen_mut().clear_dirty();
        Ok(())
    }

    fn render_full<W: Write>(&self, out: &mut W, state: &TerminalState) -> io::Result<()> {
        let screen = state.active_screen();

        for row_idx in 0..state.rows as usize {
            queue!(out, MoveTo(0, row_idx as u16), Clear(ClearType::UntilNewLine))?;
            if let Some(row) = screen.get_row_at(row_idx) {
                Self::render_row(out, row, state.cols)?;
            }
        }

        if screen.is_scrolled() {
            queue!(out, MoveTo(0, 0))?;
            Self::apply_attrs(out, &CellAttrs::default())?;
            write!(out, "[↑ {} lines]", screen.scroll_offset)?;
        }

        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
        Ok(())
    }

    fn render_dirty<W: Write>(&self, out: &mut W, state: &TerminalState) -> io::Result<()> {
        let screen = state.active_screen();

        // Sort dirty lines for sequential access
        let mut dirty: Vec<_> = screen.dirty_lines.iter().copied().collect();
        dirty.sort_unstable();

        for row_idx in dirty {
            let Some(row) = screen.get_row_at(row_idx) else {
                continue;
            };
            queue!(out, MoveTo(0, row_idx as u16), Clear(ClearType::UntilNewLine))?;
            Self::render_row(out, row, state.cols)?;
        }

        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
        Ok(())
    }

    /// Write one row, batching runs of cells with equal attributes
    fn render_row<W: Write>(out: &mut W, row: &Row, cols: u16) -> io::Result<()> {
        let mut current_attrs = CellAttrs::default();
        let mut line_buffer = String::with_capacity(256);
        let mut col_idx: u16 = 0;

        for cell in &row.cells {
            if col_idx >= cols {
                break;
            }

            // Continuation cells are covered by their wide parent
            if cell.is_continuation() {
                col_idx += 1;
                continue;
            }

            if cell.attrs != current_attrs {
                if !line_buffer.is_empty() {
                    Self::apply_attrs(out, &current_attrs)?;
                    write!(out, "{}", line_buffer)?;
                    line_buffer.clear();
                }
                current_attrs = cell.attrs.clone();
            }

            line_buffer.push_str(cell.display_char());
            col_idx += cell.width.max(1) as u16;
        }

        if !line_buffer.is_empty() {
            Self::apply_attrs(out, &current_attrs)?;
            write!(out, "{}", line_buffer)?;
        }
        Ok(())
    }

    fn render_cursor<W: Write>(&mut self, out: &mut W, state: &TerminalState) -> io::Result<()> {
        let cursor = state.active_cursor();

        if self.last_shape != Some(cursor.shape) {
            queue!(out, Self::cursor_style(cursor.shape))?;
            self.last_shape = Some(cursor.shape);
        }

        // The cursor belongs to the live screen, not to scroll-back
        if cursor.visible && !state.active_screen().is_scrolled() {
            let col = cursor.col.min(state.cols.saturating_sub(1));
            queue!(out, MoveTo(col, cursor.row), Show)?;
        }
        Ok(())
    }

    fn cursor_style(shape: CursorShape) -> SetCursorStyle {
        match shape {
            CursorShape::Default => SetCursorStyle::DefaultUserShape,
            CursorShape::BlinkingBlock => SetCursorStyle::BlinkingBlock,
            CursorShape::SteadyBlock => SetCursorStyle::SteadyBlock,
            CursorShape::BlinkingUnderline => SetCursorStyle::BlinkingUnderScore,
            CursorShape::SteadyUnderline => SetCursorStyle::SteadyUnderScore,
            CursorShape::BlinkingBar => SetCursorStyle::BlinkingBar,
            CursorShape::SteadyBar => SetCursorStyle::SteadyBar,
        }
    }

    /// Apply cell attributes
    fn apply_attrs<W: Write>(out: &mut W, attrs: &CellAttrs) -> io::Result<()> {
        queue!(out, SetAttribute(Attribute::Reset))?;

        let styles = [
            (AttrFlags::BOLD, Attribute::Bold),
            (AttrFlags::DIM, Attribute::Dim),
            (AttrFlags::ITALIC, Attribute::Italic),
            (AttrFlags::UNDERLINE, Attribute::Underlined),
            (AttrFlags::BLINK, Attribute::SlowBlink),
            (AttrFlags::INVERSE, Attribute::Reverse),
            (AttrFlags::HIDDEN, Attribute::Hidden),
            (AttrFlags::STRIKETHROUGH, Attribute::CrossedOut),
        ];
        for (flag, attribute) in styles {
            if attrs.flags.contains(flag) {
                queue!(out, SetAttribute(attribute))?;
            }
        }

        let fg = attrs.fg.to_crossterm();
        if fg != crossterm::style::Color::Reset {
            queue!(out, SetForegroundColor(fg))?;
        }
        let bg = attrs.bg.to_crossterm();
        if bg != crossterm::style::Color::Reset {
            queue!(out, SetBackgroundColor(bg))?;
        }

        Ok(())
    }

    /// Host console size in cells
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::Color;

    fn row_bytes(row: &Row, cols: u16) -> String {
        let mut out = Vec::new();
        Renderer::render_row(&mut out, row, cols).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_render_row_skips_continuation_cells() {
        let mut state = TerminalState::new(6, 1);
        for ch in "a日b".chars() {
            state.put_char(ch);
        }
        let text = row_bytes(&state.primary_screen.rows[0], 6);
        assert!(text.contains("a日b"));
    }

    #[test]
    fn test_render_row_switches_attributes_between_runs() {
        let mut state = TerminalState::new(4, 1);
        state.put_char('x');
        state.current_attrs.fg = Color::Indexed(1);
        state.put_char('y');

        let plain = row_bytes(&state.primary_screen.rows[0], 4);
        let x = plain.find('x').unwrap();
        let y = plain.find('y').unwrap();
        // A color change is emitted between the two runs
        assert!(plain[x..y].contains("\x1b["));
    }

    #[test]
    fn test_cursor_style_follows_shape() {
        assert!(matches!(
            Renderer::cursor_style(CursorShape::block(true)),
            SetCursorStyle::BlinkingBlock
        ));
        assert!(matches!(
            Renderer::cursor_style(CursorShape::Default),
            SetCursorStyle::DefaultUserShape
        ));
    }
}
