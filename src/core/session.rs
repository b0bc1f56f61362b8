//! Terminal session
//!
//! A [`TerminalSession`] owns one engine opened on one container and routes
//! the engine's events to two single-slot handlers: user input and title
//! changes.

use crossterm::event::{KeyEvent, MouseEvent};
use tracing::{debug, info, trace};

use super::container::Container;
use super::engine::{Dimensions, EngineError, EngineEvent, EngineOptions, TerminalEngine, VtEngine};
use super::handler::HandlerSlot;
use super::shim::{BufferShim, CursorPosition};
use crate::config::SessionConfig;

/// Show the primary buffer, reset visual attributes and X10 mouse mode
const SHOW_PRIMARY_BUFFER: &str = "\x1b[?1047l\x1b[m\x1b[?9l";
const SHOW_ALTERNATE_BUFFER: &str = "\x1b[?1047h";

/// One terminal engine bound to one container
pub struct TerminalSession<E: TerminalEngine + BufferShim = VtEngine> {
    container: Box<dyn Container>,
    engine: E,
    input_handler: HandlerSlot<str>,
    title_handler: HandlerSlot<str>,
    disposed: bool,
}

impl TerminalSession<VtEngine> {
    /// Create a session with the built-in engine
    pub fn create<C>(container: C, cursor_blink: bool, take_focus: bool) -> Result<Self, EngineError>
    where
        C: Container + 'static,
    {
        let options = EngineOptions {
            cursor_blink,
            ..EngineOptions::default()
        };
        Self::with_engine(container, VtEngine::new(options)?, take_focus)
    }

    /// Create a session with the built-in engine configured from `config`
    pub fn from_config<C>(container: C, config: &SessionConfig) -> Result<Self, EngineError>
    where
        C: Container + 'static,
    {
        Self::with_engine(container, VtEngine::new(config.engine_options())?, config.take_focus)
    }
}

impl<E: TerminalEngine + BufferShim> TerminalSession<E> {
    /// Open `engine` on `container` and fit it to the container
    pub fn with_engine<C>(container: C, mut engine: E, take_focus: bool) -> Result<Self, EngineError>
    where
        C: Container + 'static,
    {
        engine.open(&container, take_focus)?;

        let mut session = Self {
            container: Box::new(container),
            engine,
            input_handler: HandlerSlot::new(),
            title_handler: HandlerSlot::new(),
            disposed: false,
        };
        let dims = session.fit();
        info!("Terminal session opened at {} (buffer shim {})", dims, E::REVISION);
        Ok(session)
    }

    /// Detach handlers and release the engine
    pub fn destroy(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.disposed {
            return;
        }
        self.input_handler.clear();
        self.title_handler.clear();
        self.engine.dispose();
        self.disposed = true;
        info!("Terminal session destroyed");
    }

    /// Write raw text, escape sequences included
    pub fn write(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    /// Write raw bytes; UTF-8 sequences may be split across calls
    pub fn write_bytes(&mut self, data: &[u8]) {
        let events = self.engine.write(data);
        self.dispatch(events);
    }

    /// Write text followed by CR/LF
    pub fn write_line(&mut self, text: &str) {
        self.write(text);
        self.write("\r\n");
    }

    /// Resize the engine to whole cells of the container's current size
    pub fn fit(&mut self) -> Dimensions {
        let dims = self.engine.propose_geometry(self.container.as_ref());
        if dims != self.engine.dimensions() {
            debug!("Fitting terminal to {}", dims);
            self.engine.resize(dims);
        }
        dims
    }

    pub fn focus(&mut self) {
        let events = self.engine.focus();
        self.dispatch(events);
    }

    pub fn blur(&mut self) {
        let events = self.engine.blur();
        self.dispatch(events);
    }

    /// Scroll the viewport; negative values move into scroll-back
    pub fn scroll_by(&mut self, lines: i32) {
        self.engine.scroll_lines(lines);
    }

    pub fn scroll_by_pages(&mut self, pages: i32) {
        self.engine.scroll_pages(pages);
    }

    pub fn scroll_to_top(&mut self) {
        self.engine.scroll_to_top();
    }

    pub fn scroll_to_bottom(&mut self) {
        self.engine.scroll_to_bottom();
    }

    /// Clear formatting and terminal state; scroll-back is kept
    pub fn reset(&mut self) {
        self.engine.reset();
    }

    /// Clear the visible buffer
    pub fn clear(&mut self) {
        self.engine.clear();
    }

    pub fn cursor_position(&self) -> CursorPosition {
        self.engine.cursor_position()
    }

    pub fn is_alternate_buffer_active(&self) -> bool {
        self.engine.alternate_buffer_active()
    }

    pub fn current_line_text(&self) -> String {
        self.engine.current_line_text()
    }

    pub fn full_buffer_text(&self) -> String {
        self.engine.full_buffer_text()
    }

    /// Install the sole consumer of user input, replacing any previous one.
    ///
    /// Returns `true` when a previous handler was replaced.
    pub fn on_input<F>(&mut self, handler: F) -> bool
    where
        F: FnMut(&str) + 'static,
    {
        let replaced = self.input_handler.replace(handler);
        if replaced {
            trace!("Input handler replaced");
        }
        replaced
    }

    /// Install the sole consumer of title changes, replacing any previous one.
    ///
    /// Returns `true` when a previous handler was replaced.
    pub fn on_title_change<F>(&mut self, handler: F) -> bool
    where
        F: FnMut(&str) + 'static,
    {
        let replaced = self.title_handler.replace(handler);
        if replaced {
            trace!("Title handler replaced");
        }
        replaced
    }

    pub fn switch_to_primary_buffer(&mut self) {
        debug!("Switching to primary buffer");
        self.write(SHOW_PRIMARY_BUFFER);
    }

    pub fn switch_to_alternate_buffer(&mut self) {
        debug!("Switching to alternate buffer");
        self.write(SHOW_ALTERNATE_BUFFER);
    }

    /// Encode a key press and deliver it to the input handler
    pub fn handle_key(&mut self, event: &KeyEvent) {
        let events = self.engine.key(event);
        self.dispatch(events);
    }

    /// Report a mouse event in cell coordinates, or scroll on wheel events
    /// when the application is not tracking the mouse
    pub fn handle_mouse(&mut self, event: &MouseEvent) {
        let events = self.engine.mouse(event);
        self.dispatch(events);
    }

    /// Deliver pasted text to the input handler
    pub fn paste(&mut self, text: &str) {
        let events = self.engine.paste(text);
        self.dispatch(events);
    }

    /// Deliver already-encoded input (e.g. composed text) to the input handler
    pub fn input(&mut self, data: &str) {
        let events = self.engine.input(data);
        self.dispatch(events);
    }

    pub fn dimensions(&self) -> Dimensions {
        self.engine.dimensions()
    }

    pub fn title(&self) -> &str {
        self.engine.title()
    }

    pub fn is_focused(&self) -> bool {
        self.engine.is_focused()
    }

    pub fn scroll_offset(&self) -> usize {
        self.engine.scroll_offset()
    }

    pub fn container(&self) -> &dyn Container {
        self.container.as_ref()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    fn dispatch(&mut self, events: Vec<EngineEvent>) {
        for event in events {
            match event {
                EngineEvent::Data(data) => {
                    if !self.input_handler.emit(&data) {
                        trace!("No input handler, dropped {} bytes", data.len());
                    }
                }
                EngineEvent::TitleChanged(title) => {
                    debug!("Title changed: {}", title);
                    self.title_handler.emit(&title);
                }
                EngineEvent::Bell => trace!("Bell"),
            }
        }
    }
}

impl<E: TerminalEngine + BufferShim> Drop for TerminalSession<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::container::FixedContainer;
    use crossterm::event::{KeyCode, KeyModifiers};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Engine double with fixed 10x20 pixel cells that records calls
    struct MockEngine {
        log: Log,
        dims: Dimensions,
        focused: bool,
        offset: usize,
        history: usize,
    }

    impl MockEngine {
        fn new(log: Log) -> Self {
            Self {
                log,
                dims: Dimensions::new(80, 24),
                focused: false,
                offset: 0,
                history: 0,
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.log.borrow_mut().push(call.into());
        }
    }

    impl TerminalEngine for MockEngine {
        fn open(&mut self, container: &dyn Container, focus: bool) -> Result<(), EngineError> {
            if !container.is_attached() {
                return Err(EngineError::Detached);
            }
            self.focused = focus;
            self.record(format!("open focus={}", focus));
            Ok(())
        }

        fn dispose(&mut self) {
            self.record("dispose");
        }

        fn write(&mut self, data: &[u8]) -> Vec<EngineEvent> {
            let text = String::from_utf8_lossy(data).into_owned();
            self.history += text.matches('\n').count();
            self.record(format!("write {:?}", text));
            match text.strip_prefix("title:") {
                Some(title) => vec![EngineEvent::TitleChanged(title.to_string())],
                None => Vec::new(),
            }
        }

        fn input(&mut self, data: &str) -> Vec<EngineEvent> {
            vec![EngineEvent::Data(data.to_string())]
        }

        fn key(&mut self, _event: &KeyEvent) -> Vec<EngineEvent> {
            vec![EngineEvent::Data("k".to_string())]
        }

        fn mouse(&mut self, _event: &MouseEvent) -> Vec<EngineEvent> {
            vec![EngineEvent::Data("m".to_string())]
        }

        fn paste(&mut self, text: &str) -> Vec<EngineEvent> {
            self.input(text)
        }

        fn propose_geometry(&self, container: &dyn Container) -> Dimensions {
            let size = container.size_px();
            Dimensions::new((size.width / 10) as u16, (size.height / 20) as u16)
        }

        fn resize(&mut self, dims: Dimensions) {
            self.record(format!("resize {}", dims));
            self.dims = dims;
        }

        fn dimensions(&self) -> Dimensions {
            self.dims
        }

        fn focus(&mut self) -> Vec<EngineEvent> {
            self.focused = true;
            Vec::new()
        }

        fn blur(&mut self) -> Vec<EngineEvent> {
            self.focused = false;
            Vec::new()
        }

        fn is_focused(&self) -> bool {
            self.focused
        }

        fn scroll_lines(&mut self, amount: i32) {
            self.offset = (self.offset as i64 - amount as i64).clamp(0, self.history as i64) as usize;
        }

        fn scroll_pages(&mut self, pages: i32) {
            self.scroll_lines(pages * (self.dims.rows as i32 - 1));
        }

        fn scroll_to_top(&mut self) {
            self.offset = self.history;
        }

        fn scroll_to_bottom(&mut self) {
            self.offset = 0;
        }

        fn scroll_offset(&self) -> usize {
            self.offset
        }

        fn reset(&mut self) {
            self.record("reset");
        }

        fn clear(&mut self) {
            self.record("clear");
        }

        fn title(&self) -> &str {
            ""
        }
    }

    impl BufferShim for MockEngine {
        const REVISION: &'static str = "mock";

        fn cursor_position(&self) -> CursorPosition {
            CursorPosition::default()
        }

        fn alternate_buffer_active(&self) -> bool {
            false
        }

        fn current_line_text(&self) -> String {
            String::new()
        }

        fn full_buffer_text(&self) -> String {
            String::new()
        }
    }

    fn mock_session(container: Rc<FixedContainer>) -> (TerminalSession<MockEngine>, Log) {
        let log: Log = Rc::default();
        let session = TerminalSession::with_engine(container, MockEngine::new(log.clone()), false).unwrap();
        (session, log)
    }

    fn vt_session(width: u32, height: u32) -> TerminalSession {
        TerminalSession::create(FixedContainer::new(width, height), false, false).unwrap()
    }

    fn recorder() -> (Log, impl FnMut(&str) + 'static) {
        let log: Log = Rc::default();
        let sink = log.clone();
        (log, move |data: &str| sink.borrow_mut().push(data.to_string()))
    }

    #[test]
    fn test_create_then_destroy_releases_handlers() {
        for (blink, focus) in [(false, false), (false, true), (true, false), (true, true)] {
            let token = Rc::new(());
            let mut session =
                TerminalSession::create(FixedContainer::new(640, 480), blink, focus).unwrap();
            assert_eq!(session.is_focused(), focus);

            let (a, b) = (token.clone(), token.clone());
            session.on_input(move |_| {
                let _ = Rc::strong_count(&a);
            });
            session.on_title_change(move |_| {
                let _ = Rc::strong_count(&b);
            });
            assert_eq!(Rc::strong_count(&token), 3);

            session.destroy();
            assert_eq!(Rc::strong_count(&token), 1);
        }
    }

    #[test]
    fn test_create_on_detached_container_fails() {
        let result = TerminalSession::create(FixedContainer::detached(640, 480), false, true);
        assert_eq!(result.err(), Some(EngineError::Detached));
    }

    #[test]
    fn test_drop_disposes_engine_once() {
        let (session, log) = mock_session(Rc::new(FixedContainer::new(100, 100)));
        session.destroy();
        let disposals = log.borrow().iter().filter(|c| c.as_str() == "dispose").count();
        assert_eq!(disposals, 1);

        let (session, log) = mock_session(Rc::new(FixedContainer::new(100, 100)));
        drop(session);
        assert_eq!(log.borrow().last().map(String::as_str), Some("dispose"));
    }

    #[test]
    fn test_write_shows_on_current_line() {
        let mut session = vt_session(640, 480);
        session.write("x");
        assert!(session.current_line_text().contains('x'));
    }

    #[test]
    fn test_write_line_appends_crlf() {
        let mut session = vt_session(640, 480);
        session.write_line("first");
        session.write("second");
        assert_eq!(session.cursor_position(), CursorPosition { column: 6, row: 1 });
        assert_eq!(session.full_buffer_text(), "first\nsecond");
    }

    #[test]
    fn test_buffer_switching() {
        let mut session = vt_session(640, 480);
        assert!(!session.is_alternate_buffer_active());

        session.switch_to_alternate_buffer();
        assert!(session.is_alternate_buffer_active());

        session.switch_to_primary_buffer();
        assert!(!session.is_alternate_buffer_active());
    }

    #[test]
    fn test_primary_buffer_switch_resets_attributes_and_mouse() {
        use crate::core::term::{CellAttrs, MouseMode};

        let mut session = vt_session(640, 480);
        session.write("\x1b[1;31m\x1b[?9h");
        session.switch_to_alternate_buffer();
        session.switch_to_primary_buffer();

        let state = session.engine().state();
        assert_eq!(state.current_attrs, CellAttrs::default());
        assert_eq!(state.modes.mouse, MouseMode::None);
    }

    #[test]
    fn test_second_input_handler_replaces_first() {
        let mut session = vt_session(640, 480);
        let (first, first_handler) = recorder();
        let (second, second_handler) = recorder();

        assert!(!session.on_input(first_handler));
        session.paste("one");
        assert!(session.on_input(second_handler));
        session.paste("two");
        session.handle_key(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));

        assert_eq!(*first.borrow(), vec!["one".to_string()]);
        assert_eq!(*second.borrow(), vec!["two".to_string(), "\u{3}".to_string()]);
    }

    #[test]
    fn test_title_escape_reaches_title_handler() {
        let mut session = vt_session(640, 480);
        let (titles, handler) = recorder();
        session.on_title_change(handler);

        session.write("\x1b]0;build: ok\x07plain text");

        assert_eq!(*titles.borrow(), vec!["build: ok".to_string()]);
        assert_eq!(session.title(), "build: ok");
    }

    #[test]
    fn test_terminal_replies_go_to_input_handler() {
        let mut session = vt_session(640, 480);
        let (data, handler) = recorder();
        session.on_input(handler);

        session.write("\x1b[2;4H\x1b[6n");
        assert_eq!(*data.borrow(), vec!["\x1b[2;4R".to_string()]);
    }

    #[test]
    fn test_fit_matches_cell_metrics() {
        let container = Rc::new(FixedContainer::new(800, 600));
        let (mut session, log) = mock_session(container.clone());
        assert_eq!(session.dimensions(), Dimensions::new(80, 30));

        container.set_size(1005, 419);
        assert_eq!(session.fit(), Dimensions::new(100, 20));
        assert_eq!(session.dimensions(), Dimensions::new(100, 20));

        // Same size again: no resize call
        let resizes = log.borrow().iter().filter(|c| c.starts_with("resize")).count();
        session.fit();
        let after = log.borrow().iter().filter(|c| c.starts_with("resize")).count();
        assert_eq!(resizes, after);
    }

    #[test]
    fn test_fit_with_builtin_engine() {
        let container = Rc::new(FixedContainer::new(9 * 80, 17 * 24));
        let mut session = TerminalSession::create(container.clone(), true, false).unwrap();
        assert_eq!(session.dimensions(), Dimensions::new(80, 24));

        container.set_size(9 * 120 + 8, 17 * 40);
        assert_eq!(session.fit(), Dimensions::new(120, 40));
    }

    #[test]
    fn test_scroll_to_bottom_after_top_restores_latest_line() {
        let mut session = vt_session(9 * 20, 17 * 5);
        for i in 0..50 {
            session.write_line(&format!("line {}", i));
        }
        session.write("latest");

        session.scroll_to_top();
        assert!(session.scroll_offset() > 0);
        let top = session.engine().state().active_screen().get_row_at(0).map(|r| r.text());
        assert_eq!(top.as_deref().map(str::trim_end), Some("line 0"));

        session.scroll_to_bottom();
        assert_eq!(session.scroll_offset(), 0);
        let screen = session.engine().state().active_screen();
        let last = screen.get_row_at(4).map(|r| r.text());
        assert_eq!(last.as_deref().map(str::trim_end), Some("latest"));
    }

    #[test]
    fn test_scrolling_without_scrollback_is_noop() {
        let mut session = vt_session(640, 480);
        session.scroll_by(-5);
        session.scroll_by_pages(-1);
        session.scroll_to_top();
        assert_eq!(session.scroll_offset(), 0);
    }

    #[test]
    fn test_scroll_by_and_pages_delegate() {
        let (mut session, _log) = mock_session(Rc::new(FixedContainer::new(100, 100)));
        session.write("a\nb\nc\nd\ne\nf\n");
        session.scroll_by(-2);
        assert_eq!(session.scroll_offset(), 2);
        session.scroll_by_pages(-1);
        assert_eq!(session.scroll_offset(), 6);
        session.scroll_by(3);
        assert_eq!(session.scroll_offset(), 3);
    }

    #[test]
    fn test_reset_preserves_scrollback_clear_empties_screen() {
        let mut session = vt_session(9 * 20, 17 * 3);
        for i in 0..6 {
            session.write_line(&format!("row {}", i));
        }
        session.write("\x1b[7mprompt$ ");

        session.reset();
        let text = session.full_buffer_text();
        assert!(text.starts_with("row 0\nrow 1"));
        assert!(!text.contains("prompt"));
        assert_eq!(session.cursor_position(), CursorPosition { column: 0, row: 0 });

        session.write("again$ ");
        session.clear();
        assert_eq!(session.current_line_text().trim_end(), "again$");
        assert_eq!(session.cursor_position().row, 0);
        assert_eq!(session.full_buffer_text(), "again$");
    }

    #[test]
    fn test_fit_shrink_keeps_cursor_line_and_output() {
        let container = Rc::new(FixedContainer::new(9 * 20, 17 * 10));
        let mut session = TerminalSession::create(container.clone(), false, false).unwrap();
        for i in 0..9 {
            session.write_line(&format!("line {}", i));
        }
        session.write("x");

        container.set_size(9 * 20, 17 * 4);
        assert_eq!(session.fit(), Dimensions::new(20, 4));

        assert_eq!(session.cursor_position(), CursorPosition { column: 1, row: 3 });
        assert!(session.current_line_text().contains('x'));
        let expected: Vec<String> = (0..9).map(|i| format!("line {}", i)).collect();
        assert_eq!(session.full_buffer_text(), format!("{}\nx", expected.join("\n")));

        session.write("y");
        assert_eq!(session.current_line_text().trim_end(), "xy");
    }

    #[test]
    fn test_fit_shrink_then_grow_restores_rows() {
        let container = Rc::new(FixedContainer::new(9 * 20, 17 * 6));
        let mut session = TerminalSession::create(container.clone(), false, false).unwrap();
        session.write_line("a");
        session.write("b");

        // Blank rows under the cursor go first; nothing enters scroll-back
        container.set_size(9 * 20, 17 * 2);
        session.fit();
        assert_eq!(session.cursor_position().row, 1);
        assert_eq!(session.full_buffer_text(), "a\nb");
        assert_eq!(session.scroll_offset(), 0);

        container.set_size(9 * 20, 17 * 6);
        session.fit();
        assert_eq!(session.cursor_position().row, 1);
        assert_eq!(session.full_buffer_text(), "a\nb");
    }

    #[test]
    fn test_focus_and_blur() {
        let mut session = vt_session(640, 480);
        let (data, handler) = recorder();
        session.on_input(handler);
        session.write("\x1b[?1004h");

        session.focus();
        assert!(session.is_focused());
        session.blur();
        assert!(!session.is_focused());
        assert_eq!(*data.borrow(), vec!["\x1b[I".to_string(), "\x1b[O".to_string()]);
    }

    #[test]
    fn test_session_delegates_reset_and_clear() {
        let (mut session, log) = mock_session(Rc::new(FixedContainer::new(100, 100)));
        session.reset();
        session.clear();
        let log = log.borrow();
        assert!(log.iter().any(|c| c == "reset"));
        assert!(log.iter().any(|c| c == "clear"));
    }

    #[test]
    fn test_mock_title_event_dispatch() {
        let (mut session, _log) = mock_session(Rc::new(FixedContainer::new(100, 100)));
        let (titles, handler) = recorder();
        session.on_title_change(handler);
        session.write("title:from mock");
        assert_eq!(*titles.borrow(), vec!["from mock".to_string()]);
    }

    #[test]
    fn test_mouse_report_reaches_input_handler() {
        use crossterm::event::{MouseButton, MouseEventKind};

        let mut session = vt_session(640, 480);
        let (data, handler) = recorder();
        session.on_input(handler);

        let click = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 4,
            row: 0,
            modifiers: KeyModifiers::NONE,
        };
        session.handle_mouse(&click);
        assert!(data.borrow().is_empty());

        session.write("\x1b[?1000h\x1b[?1006h");
        session.handle_mouse(&click);
        assert_eq!(*data.borrow(), vec!["\x1b[<0;5;1M".to_string()]);
    }
}
