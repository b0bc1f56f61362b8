//! Terminal state management
//!
//! This module defines the terminal's screen buffers, cursor state, and attributes.

use std::collections::{HashSet, VecDeque};

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

/// Default number of scroll-back lines kept for the primary screen
pub const DEFAULT_SCROLLBACK: usize = 1000;

/// Terminal state holding all screen data
pub struct TerminalState {
    pub cols: u16,
    pub rows: u16,
    pub primary_screen: ScreenBuffer,
    pub alternate_screen: ScreenBuffer,
    pub using_alternate: bool,
    pub primary_cursor: CursorState,
    pub alternate_cursor: CursorState,
    pub current_attrs: CellAttrs,
    pub modes: TerminalModes,
    pub title: String,
    /// Scroll region (top, bottom) - 0-indexed, inclusive
    pub scroll_region: (u16, u16),
    /// Cursor shape restored by a soft or full reset
    pub default_shape: CursorShape,
}

impl TerminalState {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_scrollback(cols, rows, DEFAULT_SCROLLBACK)
    }

    pub fn with_scrollback(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            cols,
            rows,
            primary_screen: ScreenBuffer::new(cols, rows, scrollback_limit),
            alternate_screen: ScreenBuffer::new(cols, rows, 0),
            using_alternate: false,
            primary_cursor: CursorState::default(),
            alternate_cursor: CursorState::default(),
            current_attrs: CellAttrs::default(),
            modes: TerminalModes::default(),
            title: String::new(),
            scroll_region: (0, rows.saturating_sub(1)),
            default_shape: CursorShape::Default,
        }
    }

    pub fn active_screen(&self) -> &ScreenBuffer {
        if self.using_alternate {
            &self.alternate_screen
        } else {
            &self.primary_screen
        }
    }

    pub fn active_screen_mut(&mut self) -> &mut ScreenBuffer {
        if self.using_alternate {
            &mut self.alternate_screen
        } else {
            &mut self.primary_screen
        }
    }

    pub fn active_cursor(&self) -> &CursorState {
        if self.using_alternate {
            &self.alternate_cursor
        } else {
            &self.primary_cursor
        }
    }

    pub fn active_cursor_mut(&mut self) -> &mut CursorState {
        if self.using_alternate {
            &mut self.alternate_cursor
        } else {
            &mut self.primary_cursor
        }
    }

    /// Set the cursor shape used by this terminal and by its resets
    pub fn set_default_shape(&mut self, shape: CursorShape) {
        self.default_shape = shape;
        self.primary_cursor.shape = shape;
        self.alternate_cursor.shape = shape;
    }

    /// Resize the terminal
    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        self.primary_cursor.row = self.primary_screen.resize(cols, rows, self.primary_cursor.row);
        self.alternate_cursor.row =
            self.alternate_screen.resize(cols, rows, self.alternate_cursor.row);
        self.scroll_region = (0, rows.saturating_sub(1));

        // Clamp cursor positions
        let max_col = cols.saturating_sub(1);
        let max_row = rows.saturating_sub(1);

        self.primary_cursor.col = self.primary_cursor.col.min(max_col);
        self.primary_cursor.row = self.primary_cursor.row.min(max_row);
        self.alternate_cursor.col = self.alternate_cursor.col.min(max_col);
        self.alternate_cursor.row = self.alternate_cursor.row.min(max_row);
    }

    /// Put a character at the current cursor position
    pub fn put_char(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0) as u16;

        if width == 0 {
            // Combining character - append to previous cell
            self.append_to_previous_cell(ch);
            return;
        }

        if self.rows == 0 || self.cols == 0 {
            return;
        }

        let (cursor_row, cursor_col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col)
        };

        // Wrap when the cursor sits past the edge, or when a wide char no longer fits
        if cursor_col >= self.cols || cursor_col + width > self.cols {
            if self.modes.auto_wrap {
                self.active_screen_mut().rows[cursor_row as usize].wrapped = true;
                self.active_cursor_mut().col = 0;
                self.linefeed();
            } else {
                self.active_cursor_mut().col = self.cols.saturating_sub(width);
            }
        }

        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };

        if col >= self.cols as usize {
            return;
        }

        if self.modes.insert_mode {
            self.insert_chars(width);
        }

        self.handle_wide_char_overwrite(row, col);

        let attrs = self.current_attrs.clone();
        let cols = self.cols;

        let screen = self.active_screen_mut();

        screen.rows[row].cells[col] = Cell {
            grapheme: ch.to_string(),
            width: width as u8,
            attrs: attrs.clone(),
        };

        // For wide characters, mark next cell as continuation (only if it fits)
        if width == 2 && col + 1 < cols as usize {
            screen.rows[row].cells[col + 1] = Cell::continuation(&attrs);
        }

        screen.mark_dirty(row);

        self.active_cursor_mut().col += width;
    }

    fn append_to_previous_cell(&mut self, ch: char) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };

        if col > 0 {
            let screen = self.active_screen_mut();
            if let Some(cell) = screen.rows.get_mut(row).and_then(|r| r.cells.get_mut(col - 1)) {
                cell.grapheme.push(ch);
                screen.mark_dirty(row);
            }
        }
    }

    fn handle_wide_char_overwrite(&mut self, row: usize, col: usize) {
        let attrs = self.current_attrs.clone();
        let cols = self.cols as usize;
        let screen = self.active_screen_mut();

        // Overwriting the right half of a wide char
        if col > 0 && screen.rows[row].cells[col].is_continuation() {
            screen.rows[row].cells[col - 1] = Cell {
                grapheme: " ".to_string(),
                width: 1,
                attrs: attrs.clone(),
            };
        }

        // Overwriting the left half of a wide char
        if screen.rows[row].cells[col].width == 2 && col + 1 < cols {
            screen.rows[row].cells[col + 1] = Cell {
                grapheme: " ".to_string(),
                width: 1,
                attrs,
            };
        }
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        let row = self.active_cursor().row as usize;
        self.active_cursor_mut().col = 0;
        self.active_screen_mut().mark_dirty(row);
    }

    /// Line feed - move cursor down, scroll if needed
    pub fn linefeed(&mut self) {
        let cursor_row = self.active_cursor().row;
        let scroll_bottom = self.scroll_region.1;
        let rows = self.rows;

        if cursor_row == scroll_bottom {
            self.scroll_up(1);
        } else if cursor_row + 1 < rows {
            self.active_cursor_mut().row += 1;
        }
    }

    /// Backspace - move cursor left
    pub fn backspace(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        // A pending wrap leaves the cursor one past the last column
        cursor.col = cursor.col.min(cols).saturating_sub(1);
    }

    /// Horizontal tab
    pub fn horizontal_tab(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        // Tab stops every 8 columns
        cursor.col = ((cursor.col / 8) + 1) * 8;
        if cursor.col >= cols {
            cursor.col = cols.saturating_sub(1);
        }
    }

    /// Scroll the scroll region up by n lines
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;
        let is_primary = !self.using_alternate;

        let screen = self.active_screen_mut();

        for _ in 0..n {
            if (top as usize) < screen.rows.len() && (bottom as usize) < screen.rows.len() {
                let removed_row = screen.rows.remove(top as usize);
                // Only full-screen scrolls of the primary screen feed scroll-back
                if is_primary && top == 0 {
                    screen.push_to_scrollback(removed_row);
                }
                screen.rows.insert(bottom as usize, Row::new(cols));
            }
        }
        screen.mark_all_dirty();
    }

    /// Scroll the scroll region down by n lines
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;

        let screen = self.active_screen_mut();

        for _ in 0..n {
            if (bottom as usize) < screen.rows.len() && (top as usize) <= screen.rows.len() {
                screen.rows.remove(bottom as usize);
                screen.rows.insert(top as usize, Row::new(cols));
            }
        }
        screen.mark_all_dirty();
    }

    pub fn cursor_up(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        let rows = self.rows;
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_add(n).min(rows.saturating_sub(1));
    }

    pub fn cursor_forward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_add(n).min(cols.saturating_sub(1));
    }

    pub fn cursor_backward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.min(cols.saturating_sub(1)).saturating_sub(n);
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        let rows = self.rows;
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.row = row.saturating_sub(1).min(rows.saturating_sub(1));
        cursor.col = col.saturating_sub(1).min(cols.saturating_sub(1));
    }

    /// Erase in display
    pub fn erase_in_display(&mut self, mode: u16) {
        match mode {
            0 => {
                // From cursor to end
                self.erase_in_line(0);
                let cursor_row = self.active_cursor().row as usize;
                let rows = self.rows as usize;
                let attrs = self.current_attrs.clone();
                let screen = self.active_screen_mut();
                for r in (cursor_row + 1)..rows {
                    if r < screen.rows.len() {
                        screen.rows[r].clear(&attrs);
                        screen.mark_dirty(r);
                    }
                }
            }
            1 => {
                // From start to cursor
                let cursor_row = self.active_cursor().row as usize;
                let attrs = self.current_attrs.clone();
                {
                    let screen = self.active_screen_mut();
                    for r in 0..cursor_row {
                        if r < screen.rows.len() {
                            screen.rows[r].clear(&attrs);
                            screen.mark_dirty(r);
                        }
                    }
                }
                self.erase_in_line(1);
            }
            2 => {
                let attrs = self.current_attrs.clone();
                self.active_screen_mut().clear_visible(&attrs);
            }
            3 => {
                // Scroll-back only (xterm)
                self.active_screen_mut().clear_scrollback();
            }
            _ => {}
        }
    }

    /// Erase in line
    pub fn erase_in_line(&mut self, mode: u16) {
        let (cursor_row, cursor_col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let cols = self.cols as usize;
        let attrs = self.current_attrs.clone();

        let screen = self.active_screen_mut();
        let row = cursor_row;

        if row >= screen.rows.len() {
            return;
        }

        match mode {
            0 => {
                for c in cursor_col..cols {
                    if c < screen.rows[row].cells.len() {
                        screen.rows[row].cells[c].clear(&attrs);
                    }
                }
            }
            1 => {
                for c in 0..=cursor_col {
                    if c < screen.rows[row].cells.len() {
                        screen.rows[row].cells[c].clear(&attrs);
                    }
                }
            }
            2 => {
                screen.rows[row].clear(&attrs);
            }
            _ => {}
        }
        screen.mark_dirty(row);
    }

    /// Insert lines at cursor position
    pub fn insert_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let bottom = self.scroll_region.1 as usize;
        let cols = self.cols;

        let screen = self.active_screen_mut();

        for _ in 0..n {
            if cursor_row <= bottom && bottom < screen.rows.len() {
                screen.rows.remove(bottom);
                screen.rows.insert(cursor_row, Row::new(cols));
            }
        }
        screen.mark_all_dirty();
    }

    /// Delete lines at cursor position
    pub fn delete_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let bottom = self.scroll_region.1 as usize;
        let cols = self.cols;

        let screen = self.active_screen_mut();

        for _ in 0..n {
            if cursor_row <= bottom && bottom < screen.rows.len() {
                screen.rows.remove(cursor_row);
                screen.rows.insert(bottom, Row::new(cols));
            }
        }
        screen.mark_all_dirty();
    }

    /// Insert blank characters at the cursor, shifting the rest of the line right
    pub fn insert_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let screen = self.active_screen_mut();
        let Some(line) = screen.rows.get_mut(row) else {
            return;
        };

        for _ in 0..n {
            if col < line.cells.len() {
                line.cells.pop();
                line.cells.insert(col, Cell::default());
            }
        }
        screen.mark_dirty(row);
    }

    /// Delete characters at the cursor, shifting the rest of the line left
    pub fn delete_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let screen = self.active_screen_mut();
        let Some(line) = screen.rows.get_mut(row) else {
            return;
        };

        for _ in 0..n {
            if col < line.cells.len() {
                line.cells.remove(col);
                line.cells.push(Cell::default());
            }
        }
        screen.mark_dirty(row);
    }

    /// Erase characters at the cursor without shifting
    pub fn erase_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let attrs = self.current_attrs.clone();
        let screen = self.active_screen_mut();
        let Some(line) = screen.rows.get_mut(row) else {
            return;
        };

        for cell in line.cells.iter_mut().skip(col).take(n as usize) {
            cell.clear(&attrs);
        }
        screen.mark_dirty(row);
    }

    /// Set scroll region
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let rows = self.rows;
        let top = top.saturating_sub(1).min(rows.saturating_sub(1));
        let bottom = bottom.saturating_sub(1).min(rows.saturating_sub(1));
        if top < bottom {
            self.scroll_region = (top, bottom);
        }
    }

    /// Save cursor position
    pub fn save_cursor(&mut self) {
        let (col, row) = {
            let cursor = self.active_cursor();
            (cursor.col, cursor.row)
        };
        let attrs = self.current_attrs.clone();
        let saved = SavedCursor { col, row, attrs };
        self.active_cursor_mut().saved = Some(saved);
    }

    /// Restore cursor position
    pub fn restore_cursor(&mut self) {
        let saved = self.active_cursor().saved.clone();
        if let Some(saved) = saved {
            let cursor = self.active_cursor_mut();
            cursor.col = saved.col;
            cursor.row = saved.row;
            self.current_attrs = saved.attrs;
        }
    }

    /// Set private mode
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.modes.application_cursor = enable,
            7 => self.modes.auto_wrap = enable,
            9 => self.modes.set_mouse_mode(MouseMode::X10, enable),
            25 => self.active_cursor_mut().visible = enable,
            47 | 1047 => {
                if enable {
                    self.enter_alternate_screen();
                } else {
                    self.using_alternate = false;
                }
                self.active_screen_mut().mark_all_dirty();
            }
            1000 => self.modes.set_mouse_mode(MouseMode::Normal, enable),
            1002 => self.modes.set_mouse_mode(MouseMode::ButtonEvent, enable),
            1003 => self.modes.set_mouse_mode(MouseMode::AnyEvent, enable),
            1004 => self.modes.focus_reporting = enable,
            1006 => self.modes.sgr_mouse = enable,
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.save_cursor();
                    self.enter_alternate_screen();
                    self.alternate_cursor = CursorState {
                        shape: self.default_shape,
                        ..CursorState::default()
                    };
                } else {
                    self.using_alternate = false;
                    self.restore_cursor();
                }
                self.active_screen_mut().mark_all_dirty();
            }
            2004 => self.modes.bracketed_paste = enable,
            _ => {
                tracing::debug!("Ignoring private mode {} ({})", mode, enable);
            }
        }
    }

    fn enter_alternate_screen(&mut self) {
        if !self.using_alternate {
            self.alternate_screen = ScreenBuffer::new(self.cols, self.rows, 0);
        }
        self.using_alternate = true;
    }

    /// Reverse index - cursor up, scroll if at top
    pub fn reverse_index(&mut self) {
        let cursor_row = self.active_cursor().row;
        let scroll_top = self.scroll_region.0;

        if cursor_row == scroll_top {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    /// Index - cursor down, scroll if at bottom
    pub fn index(&mut self) {
        self.linefeed();
    }

    /// DECSTR: reset modes, attributes and scroll region; screen content is untouched
    pub fn soft_reset(&mut self) {
        self.current_attrs.reset();
        self.modes = TerminalModes::default();
        self.scroll_region = (0, self.rows.saturating_sub(1));
        let shape = self.default_shape;
        for cursor in [&mut self.primary_cursor, &mut self.alternate_cursor] {
            cursor.visible = true;
            cursor.shape = shape;
            cursor.saved = None;
        }
    }

    /// Reset formatting and terminal state; primary scroll-back survives
    pub fn reset(&mut self) {
        self.soft_reset();
        self.using_alternate = false;
        self.alternate_screen = ScreenBuffer::new(self.cols, self.rows, 0);
        self.alternate_cursor.col = 0;
        self.alternate_cursor.row = 0;
        self.primary_cursor.col = 0;
        self.primary_cursor.row = 0;
        self.primary_screen.clear_visible(&CellAttrs::default());
        self.primary_screen.scroll_to_bottom();
    }

    /// RIS: everything back to power-on state, including scroll-back and title
    pub fn full_reset(&mut self) {
        let limit = self.primary_screen.scrollback_limit;
        let shape = self.default_shape;
        *self = Self::with_scrollback(self.cols, self.rows, limit);
        self.set_default_shape(shape);
    }

    /// Clear the screen and scroll-back, keeping the cursor line as the new top row
    pub fn clear(&mut self) {
        let cursor_row = self.active_cursor().row as usize;
        let cols = self.cols;
        let screen = self.active_screen_mut();
        let kept = if cursor_row < screen.rows.len() {
            screen.rows.remove(cursor_row)
        } else {
            Row::new(cols)
        };
        let visible = screen.rows.len() + 1;
        screen.rows.clear();
        screen.rows.push(kept);
        while screen.rows.len() < visible {
            screen.rows.push(Row::new(cols));
        }
        screen.clear_scrollback();
        self.active_cursor_mut().row = 0;
    }
}

/// Screen buffer with scroll-back
pub struct ScreenBuffer {
    /// Visible rows
    pub rows: Vec<Row>,
    /// Scroll-back history, oldest first
    pub scrollback: VecDeque<Row>,
    /// Maximum scroll-back lines
    pub scrollback_limit: usize,
    /// Current scroll offset (0 = at bottom, >0 = scrolled up)
    pub scroll_offset: usize,
    pub dirty_lines: HashSet<usize>,
    pub full_redraw: bool,
}

impl ScreenBuffer {
    pub fn new(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
            scrollback: VecDeque::new(),
            scrollback_limit,
            scroll_offset: 0,
            dirty_lines: HashSet::new(),
            full_redraw: true,
        }
    }

    /// Resize to `new_cols` x `new_rows`, keeping the cursor line on screen.
    ///
    /// Shrinking drops blank rows below the cursor first, then moves rows off
    /// the top into scroll-back. Growing pulls scroll-back rows back on top.
    /// Returns the cursor row after the move.
    pub fn resize(&mut self, new_cols: u16, new_rows: u16, cursor_row: u16) -> u16 {
        let target = new_rows as usize;
        let mut cursor_row = cursor_row as usize;

        while self.rows.len() > target
            && self.rows.len() > cursor_row + 1
            && self.rows.last().is_some_and(Row::is_blank)
        {
            self.rows.pop();
        }
        while self.rows.len() > target {
            let row = self.rows.remove(0);
            self.push_to_scrollback(row);
            cursor_row = cursor_row.saturating_sub(1);
        }

        while self.rows.len() < target {
            match self.scrollback.pop_back() {
                Some(row) => {
                    self.rows.insert(0, row);
                    cursor_row += 1;
                }
                None => self.rows.push(Row::new(new_cols)),
            }
        }
        self.scroll_offset = self.scroll_offset.min(self.scrollback.len());

        for row in &mut self.rows {
            row.resize(new_cols);
        }
        for row in &mut self.scrollback {
            row.resize(new_cols);
        }

        self.mark_all_dirty();
        cursor_row.min(target.saturating_sub(1)) as u16
    }

    /// Add a row to scroll-back when scrolling up.
    ///
    /// A scrolled-up viewport stays on the same lines. Once the oldest line is
    /// evicted at the limit, a viewport already at the top stays at the top.
    pub fn push_to_scrollback(&mut self, row: Row) {
        if self.scrollback_limit == 0 {
            return;
        }
        self.scrollback.push_back(row);
        if self.scroll_offset > 0 {
            self.scroll_offset += 1;
        }
        if self.scrollback.len() > self.scrollback_limit {
            self.scrollback.pop_front();
        }
        self.scroll_offset = self.scroll_offset.min(self.scrollback.len());
    }

    /// Get the total number of lines (scroll-back + visible)
    pub fn total_lines(&self) -> usize {
        self.scrollback.len() + self.rows.len()
    }

    /// Get a row at the given viewport position (accounting for scroll offset)
    pub fn get_row_at(&self, visible_row: usize) -> Option<&Row> {
        self.get_row_absolute(self.screen_to_buffer_row(visible_row))
    }

    /// Scroll view up by n lines
    pub fn scroll_view_up(&mut self, n: usize) {
        let max_offset = self.scrollback.len();
        self.scroll_offset = (self.scroll_offset + n).min(max_offset);
        self.mark_all_dirty();
    }

    /// Scroll view down by n lines
    pub fn scroll_view_down(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
        self.mark_all_dirty();
    }

    /// Scroll view to the oldest scroll-back line
    pub fn scroll_to_top(&mut self) {
        if self.scroll_offset != self.scrollback.len() {
            self.scroll_offset = self.scrollback.len();
            self.mark_all_dirty();
        }
    }

    /// Reset scroll to bottom (live view)
    pub fn scroll_to_bottom(&mut self) {
        if self.scroll_offset != 0 {
            self.scroll_offset = 0;
            self.mark_all_dirty();
        }
    }

    pub fn is_scrolled(&self) -> bool {
        self.scroll_offset > 0
    }

    /// Convert screen row to absolute buffer row
    pub fn screen_to_buffer_row(&self, screen_row: usize) -> usize {
        let start_in_scrollback = self.scrollback.len().saturating_sub(self.scroll_offset);
        start_in_scrollback + screen_row
    }

    /// Get a row by absolute buffer position (0 = first scroll-back line)
    pub fn get_row_absolute(&self, abs_row: usize) -> Option<&Row> {
        let total_scrollback = self.scrollback.len();
        if abs_row < total_scrollback {
            self.scrollback.get(abs_row)
        } else {
            self.rows.get(abs_row - total_scrollback)
        }
    }

    /// Iterate over scroll-back followed by visible rows
    pub fn all_rows(&self) -> impl Iterator<Item = &Row> {
        self.scrollback.iter().chain(self.rows.iter())
    }

    pub fn clear_visible(&mut self, attrs: &CellAttrs) {
        for row in &mut self.rows {
            row.clear(attrs);
        }
        self.mark_all_dirty();
    }

    pub fn clear_scrollback(&mut self) {
        self.scrollback.clear();
        self.scroll_offset = 0;
        self.mark_all_dirty();
    }

    pub fn mark_dirty(&mut self, line: usize) {
        self.dirty_lines.insert(line);
    }

    pub fn mark_all_dirty(&mut self) {
        self.full_redraw = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty_lines.clear();
        self.full_redraw = false;
    }
}

/// A single row
#[derive(Clone)]
pub struct Row {
    pub cells: Vec<Cell>,
    pub wrapped: bool,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
            wrapped: false,
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        self.cells.resize(new_cols as usize, Cell::default());
    }

    pub fn clear(&mut self, attrs: &CellAttrs) {
        for cell in &mut self.cells {
            cell.clear(attrs);
        }
        self.wrapped = false;
    }

    /// Whether no cell holds a character
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.grapheme.is_empty())
    }

    /// Text of the row, one space per empty cell
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .filter(|cell| !cell.is_continuation())
            .map(Cell::display_char)
            .collect()
    }
}

/// A single cell
#[derive(Clone)]
pub struct Cell {
    pub grapheme: String,
    pub width: u8,
    pub attrs: CellAttrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            grapheme: String::new(),
            width: 1,
            attrs: CellAttrs::default(),
        }
    }
}

impl Cell {
    pub fn clear(&mut self, attrs: &CellAttrs) {
        self.grapheme.clear();
        self.width = 1;
        self.attrs = attrs.clone();
    }

    pub fn continuation(attrs: &CellAttrs) -> Self {
        Self {
            grapheme: String::new(),
            width: 0,
            attrs: attrs.clone(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    /// Get the display character (space if empty)
    pub fn display_char(&self) -> &str {
        if self.grapheme.is_empty() {
            " "
        } else {
            &self.grapheme
        }
    }
}

/// Cell attributes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl CellAttrs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    pub fn to_crossterm(self) -> crossterm::style::Color {
        match self {
            Color::Default => crossterm::style::Color::Reset,
            Color::Indexed(n) => crossterm::style::Color::AnsiValue(n),
            Color::Rgb(r, g, b) => crossterm::style::Color::Rgb { r, g, b },
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
    }
}

/// Cursor shape
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorShape {
    /// Default (terminal dependent)
    #[default]
    Default,
    BlinkingBlock,
    SteadyBlock,
    BlinkingUnderline,
    SteadyUnderline,
    /// Blinking bar (|)
    BlinkingBar,
    /// Steady bar (|)
    SteadyBar,
}

impl CursorShape {
    /// Block cursor matching a blink preference
    pub fn block(blink: bool) -> Self {
        if blink {
            CursorShape::BlinkingBlock
        } else {
            CursorShape::SteadyBlock
        }
    }

    /// Create from DECSCUSR parameter
    pub fn from_decscusr(n: u8) -> Self {
        match n {
            1 => CursorShape::BlinkingBlock,
            2 => CursorShape::SteadyBlock,
            3 => CursorShape::BlinkingUnderline,
            4 => CursorShape::SteadyUnderline,
            5 => CursorShape::BlinkingBar,
            6 => CursorShape::SteadyBar,
            _ => CursorShape::Default,
        }
    }
}

/// Cursor state
#[derive(Clone)]
pub struct CursorState {
    pub col: u16,
    pub row: u16,
    pub visible: bool,
    pub shape: CursorShape,
    pub saved: Option<SavedCursor>,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
            shape: CursorShape::Default,
            saved: None,
        }
    }
}

/// Saved cursor state
#[derive(Clone)]
pub struct SavedCursor {
    pub col: u16,
    pub row: u16,
    pub attrs: CellAttrs,
}

/// Mouse reporting requested by the application
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseMode {
    #[default]
    None,
    /// DECSET 9: press only
    X10,
    /// DECSET 1000: press and release
    Normal,
    /// DECSET 1002: plus drag
    ButtonEvent,
    /// DECSET 1003: all motion
    AnyEvent,
}

/// Terminal modes
#[derive(Clone, Debug)]
pub struct TerminalModes {
    pub application_cursor: bool,
    pub auto_wrap: bool,
    pub insert_mode: bool,
    pub linefeed_newline: bool,
    pub bracketed_paste: bool,
    pub focus_reporting: bool,
    pub mouse: MouseMode,
    pub sgr_mouse: bool,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self {
            application_cursor: false,
            auto_wrap: true,
            insert_mode: false,
            linefeed_newline: false,
            bracketed_paste: false,
            focus_reporting: false,
            mouse: MouseMode::None,
            sgr_mouse: false,
        }
    }
}

impl TerminalModes {
    fn set_mouse_mode(&mut self, mode: MouseMode, enable: bool) {
        if enable {
            self.mouse = mode;
        } else if self.mouse == mode {
            self.mouse = MouseMode::None;
        }
    }
}
