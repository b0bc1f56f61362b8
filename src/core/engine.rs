//! Terminal engine boundary.
//!
//! [`TerminalEngine`] is the stable operation surface a session drives:
//! output, user input, geometry, scrolling, reset and focus. Reads of
//! engine internals live behind [`BufferShim`](super::shim::BufferShim)
//! instead, so only that adapter has to follow the engine's internal layout.
//!
//! [`VtEngine`] is the built-in implementation on top of [`TerminalState`]
//! and [`VtParser`].

use crossterm::event::{KeyEvent, MouseEvent, MouseEventKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::container::Container;
use super::term::{
    CursorShape, MouseMode, ParserOutput, TerminalState, VtParser, DEFAULT_SCROLLBACK,
};
use crate::ui::KeyMapper;

/// Smallest geometry `propose_geometry` will return
pub const MIN_COLS: u16 = 2;
pub const MIN_ROWS: u16 = 1;

/// Initial geometry before the first fit
const INITIAL_COLS: u16 = 80;
const INITIAL_ROWS: u16 = 24;

/// Lines moved per wheel notch when the application does not track the mouse
const WHEEL_LINES: i32 = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("Container is not attached to a live UI")]
    Detached,

    #[error("Engine is already open on a container")]
    AlreadyOpen,

    #[error("Cell metrics must be non-zero (got {width}x{height})")]
    ZeroSizedCells { width: u32, height: u32 },
}

/// Event produced by the engine while handling output or input
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Data for the application: keystrokes, pastes, and terminal replies
    Data(String),
    /// Title set by OSC 0 or OSC 2
    TitleChanged(String),
    Bell,
}

/// Visible columns and rows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Dimensions {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Pixel size of one character cell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellMetrics {
    pub width: u32,
    pub height: u32,
}

impl Default for CellMetrics {
    fn default() -> Self {
        Self { width: 9, height: 17 }
    }
}

/// Construction options for [`VtEngine`]
#[derive(Clone, Debug, PartialEq)]
pub struct EngineOptions {
    pub cursor_blink: bool,
    pub scrollback: usize,
    pub cell: CellMetrics,
    /// Pixels reserved for a scrollbar on the right edge
    pub scrollbar_width: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cursor_blink: false,
            scrollback: DEFAULT_SCROLLBACK,
            cell: CellMetrics::default(),
            scrollbar_width: 0,
        }
    }
}

/// Operations a terminal session performs on its engine
pub trait TerminalEngine {
    /// Attach to `container`, optionally taking focus
    fn open(&mut self, container: &dyn Container, focus: bool) -> Result<(), EngineError>;

    /// Detach and release engine resources
    fn dispose(&mut self);

    /// Feed program output
    fn write(&mut self, data: &[u8]) -> Vec<EngineEvent>;

    /// Deliver raw user input to the application
    fn input(&mut self, data: &str) -> Vec<EngineEvent>;

    /// Encode and deliver a key press
    fn key(&mut self, event: &KeyEvent) -> Vec<EngineEvent>;

    /// Report a mouse event, or scroll the viewport on wheel events when the
    /// application has not enabled mouse tracking
    fn mouse(&mut self, event: &MouseEvent) -> Vec<EngineEvent>;

    /// Deliver pasted text
    fn paste(&mut self, text: &str) -> Vec<EngineEvent>;

    /// Geometry that fills `container` with whole cells
    fn propose_geometry(&self, container: &dyn Container) -> Dimensions;

    fn resize(&mut self, dims: Dimensions);

    fn dimensions(&self) -> Dimensions;

    fn focus(&mut self) -> Vec<EngineEvent>;

    fn blur(&mut self) -> Vec<EngineEvent>;

    fn is_focused(&self) -> bool;

    /// Move the viewport; negative amounts scroll into history
    fn scroll_lines(&mut self, amount: i32);

    fn scroll_pages(&mut self, pages: i32);

    fn scroll_to_top(&mut self);

    fn scroll_to_bottom(&mut self);

    /// Lines between the viewport and the live bottom
    fn scroll_offset(&self) -> usize;

    /// Reset formatting and state, keeping scroll-back
    fn reset(&mut self);

    /// Clear the visible buffer
    fn clear(&mut self);

    fn title(&self) -> &str;
}

/// Built-in VT100/xterm engine
pub struct VtEngine {
    state: TerminalState,
    parser: VtParser,
    options: EngineOptions,
    focused: bool,
    opened: bool,
}

impl VtEngine {
    pub fn new(options: EngineOptions) -> Result<Self, EngineError> {
        if options.cell.width == 0 || options.cell.height == 0 {
            return Err(EngineError::ZeroSizedCells {
                width: options.cell.width,
                height: options.cell.height,
            });
        }

        let mut state = TerminalState::with_scrollback(INITIAL_COLS, INITIAL_ROWS, options.scrollback);
        state.set_default_shape(CursorShape::block(options.cursor_blink));

        Ok(Self {
            state,
            parser: VtParser::new(),
            options,
            focused: false,
            opened: false,
        })
    }

    /// Screen state, for renderers
    pub fn state(&self) -> &TerminalState {
        &self.state
    }

    /// Screen state, for renderers that track dirty lines
    pub fn state_mut(&mut self) -> &mut TerminalState {
        &mut self.state
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    fn translate(outputs: Vec<ParserOutput>) -> Vec<EngineEvent> {
        outputs
            .into_iter()
            .map(|output| match output {
                ParserOutput::Response(response) => EngineEvent::Data(response.to_sequence()),
                ParserOutput::Title(title) => EngineEvent::TitleChanged(title),
                ParserOutput::Bell => EngineEvent::Bell,
            })
            .collect()
    }
}

impl TerminalEngine for VtEngine {
    fn open(&mut self, container: &dyn Container, focus: bool) -> Result<(), EngineError> {
        if self.opened {
            return Err(EngineError::AlreadyOpen);
        }
        if !container.is_attached() {
            return Err(EngineError::Detached);
        }
        self.opened = true;
        self.focused = focus;
        Ok(())
    }

    fn dispose(&mut self) {
        self.opened = false;
        self.focused = false;
        self.parser.reset();
    }

    fn write(&mut self, data: &[u8]) -> Vec<EngineEvent> {
        let mut outputs = Vec::new();
        self.parser.advance(data, &mut self.state, &mut outputs);
        Self::translate(outputs)
    }

    fn input(&mut self, data: &str) -> Vec<EngineEvent> {
        if data.is_empty() {
            return Vec::new();
        }
        self.state.active_screen_mut().scroll_to_bottom();
        vec![EngineEvent::Data(data.to_string())]
    }

    fn key(&mut self, event: &KeyEvent) -> Vec<EngineEvent> {
        match KeyMapper::map(event, &self.state.modes) {
            Some(bytes) => self.input(&String::from_utf8_lossy(&bytes)),
            None => Vec::new(),
        }
    }

    fn mouse(&mut self, event: &MouseEvent) -> Vec<EngineEvent> {
        if self.state.modes.mouse == MouseMode::None {
            match event.kind {
                MouseEventKind::ScrollUp => self.scroll_lines(-WHEEL_LINES),
                MouseEventKind::ScrollDown => self.scroll_lines(WHEEL_LINES),
                _ => {}
            }
            return Vec::new();
        }

        match KeyMapper::encode_mouse_event(event, &self.state.modes) {
            // Legacy reports carry raw bytes above 0x7f; send them as code points
            Some(bytes) => vec![EngineEvent::Data(bytes.iter().map(|&b| b as char).collect())],
            None => Vec::new(),
        }
    }

    fn paste(&mut self, text: &str) -> Vec<EngineEvent> {
        let text = text.replace("\r\n", "\r").replace('\n', "\r");
        if self.state.modes.bracketed_paste {
            self.input(&format!("\x1b[200~{}\x1b[201~", text))
        } else {
            self.input(&text)
        }
    }

    fn propose_geometry(&self, container: &dyn Container) -> Dimensions {
        let size = container.size_px();
        let padding = container.padding();
        let cell = self.options.cell;

        let width = size
            .width
            .saturating_sub(padding.left + padding.right)
            .saturating_sub(self.options.scrollbar_width);
        let height = size.height.saturating_sub(padding.top + padding.bottom);

        let cols = (width / cell.width).min(u16::MAX as u32) as u16;
        let rows = (height / cell.height).min(u16::MAX as u32) as u16;
        Dimensions::new(cols.max(MIN_COLS), rows.max(MIN_ROWS))
    }

    fn resize(&mut self, dims: Dimensions) {
        if dims != self.dimensions() {
            self.state.resize(dims.cols, dims.rows);
        }
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.state.cols, self.state.rows)
    }

    fn focus(&mut self) -> Vec<EngineEvent> {
        if self.focused {
            return Vec::new();
        }
        self.focused = true;
        if self.state.modes.focus_reporting {
            vec![EngineEvent::Data("\x1b[I".to_string())]
        } else {
            Vec::new()
        }
    }

    fn blur(&mut self) -> Vec<EngineEvent> {
        if !self.focused {
            return Vec::new();
        }
        self.focused = false;
        if self.state.modes.focus_reporting {
            vec![EngineEvent::Data("\x1b[O".to_string())]
        } else {
            Vec::new()
        }
    }

    fn is_focused(&self) -> bool {
        self.focused
    }

    fn scroll_lines(&mut self, amount: i32) {
        let screen = self.state.active_screen_mut();
        let lines = amount.unsigned_abs() as usize;
        if amount < 0 {
            screen.scroll_view_up(lines);
        } else {
            screen.scroll_view_down(lines);
        }
    }

    fn scroll_pages(&mut self, pages: i32) {
        let page = self.state.rows.saturating_sub(1).max(1) as i32;
        self.scroll_lines(pages.saturating_mul(page));
    }

    fn scroll_to_top(&mut self) {
        self.state.active_screen_mut().scroll_to_top();
    }

    fn scroll_to_bottom(&mut self) {
        self.state.active_screen_mut().scroll_to_bottom();
    }

    fn scroll_offset(&self) -> usize {
        self.state.active_screen().scroll_offset
    }

    fn reset(&mut self) {
        self.parser.reset();
        self.state.reset();
    }

    fn clear(&mut self) {
        self.state.clear();
    }

    fn title(&self) -> &str {
        &self.state.title
    }
}
