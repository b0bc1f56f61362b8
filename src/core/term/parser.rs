//! VT sequence parser
//!
//! Parses ANSI/VT escape sequences and updates terminal state.

use super::state::{AttrFlags, Color, CursorShape, TerminalState};

/// Parameters kept per CSI sequence; extras are ignored
const MAX_PARAMS: usize = 32;
/// Intermediate and prefix bytes kept per sequence
const MAX_INTERMEDIATES: usize = 4;
/// Longest OSC payload kept; the rest of an oversized string is dropped
const MAX_OSC_BYTES: usize = 4096;

/// Reply the terminal sends back to the application
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// Device status report: terminal OK
    StatusOk,
    /// Device attributes response
    DeviceAttributes,
    /// Secondary device attributes response
    SecondaryDeviceAttributes,
}

impl Response {
    pub fn to_sequence(&self) -> String {
        match self {
            Response::CursorPosition(row, col) => format!("\x1b[{};{}R", row, col),
            Response::StatusOk => "\x1b[0n".to_string(),
            // VT220
            Response::DeviceAttributes => "\x1b[?62;c".to_string(),
            Response::SecondaryDeviceAttributes => "\x1b[>1;10;0c".to_string(),
        }
    }
}

/// Something the parser produced besides screen updates
#[derive(Debug, Clone, PartialEq)]
pub enum ParserOutput {
    Response(Response),
    Title(String),
    Bell,
}

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<u8>,
    current_param: Option<u16>,
    osc_bytes: Vec<u8>,
    /// Pending bytes of a UTF-8 sequence split across writes
    utf8: Vec<u8>,
    utf8_len: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    EscapeInOsc, // ESC received within OSC, waiting for backslash
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            intermediates: Vec::with_capacity(4),
            current_param: None,
            osc_bytes: Vec::new(),
            utf8: Vec::with_capacity(4),
            utf8_len: 0,
        }
    }

    /// Drop any partially parsed sequence
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed a chunk of UTF-8 encoded output
    pub fn advance(&mut self, bytes: &[u8], state: &mut TerminalState, out: &mut Vec<ParserOutput>) {
        for &byte in bytes {
            if !self.utf8.is_empty() && byte & 0xC0 != 0x80 {
                self.utf8.clear();
                state.put_char(char::REPLACEMENT_CHARACTER);
            }

            if byte >= 0x80 && self.state == ParserState::Ground {
                self.feed_utf8(byte, state);
                continue;
            }

            if let Some(output) = self.feed(byte, state) {
                out.push(output);
            }
        }
    }

    fn feed_utf8(&mut self, byte: u8, state: &mut TerminalState) {
        if self.utf8.is_empty() {
            self.utf8_len = match byte {
                0xC2..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF4 => 4,
                _ => {
                    state.put_char(char::REPLACEMENT_CHARACTER);
                    return;
                }
            };
        }

        self.utf8.push(byte);
        if self.utf8.len() < self.utf8_len {
            return;
        }

        match std::str::from_utf8(&self.utf8) {
            Ok(s) => s.chars().for_each(|ch| state.put_char(ch)),
            Err(_) => state.put_char(char::REPLACEMENT_CHARACTER),
        }
        self.utf8.clear();
    }

    /// Feed a single byte to the parser
    pub fn feed(&mut self, byte: u8, state: &mut TerminalState) -> Option<ParserOutput> {
        // C0 controls act anywhere except inside OSC strings
        if byte < 0x20 && self.state != ParserState::OscString && self.state != ParserState::EscapeInOsc {
            match byte {
                0x1B => {
                    self.enter_escape();
                    return None;
                }
                0x07 => return Some(ParserOutput::Bell),
                0x08 => state.backspace(),
                0x09 => state.horizontal_tab(),
                0x0A..=0x0C => {
                    if state.modes.linefeed_newline {
                        state.carriage_return();
                    }
                    state.linefeed();
                }
                0x0D => state.carriage_return(),
                // CAN / SUB abort the sequence in progress
                0x18 | 0x1A => self.state = ParserState::Ground,
                _ => {}
            }
            return None;
        }

        match self.state {
            ParserState::Ground => self.ground(byte, state),
            ParserState::Escape => self.escape(byte, state),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte),
            ParserState::CsiEntry => self.csi_entry(byte, state),
            ParserState::CsiParam => self.csi_param(byte, state),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, state),
            ParserState::OscString => self.osc_string_state(byte, state),
            ParserState::EscapeInOsc => self.escape_in_osc(byte, state),
        }
    }

    /// Handle ESC received within OSC sequence
    fn escape_in_osc(&mut self, byte: u8, state: &mut TerminalState) -> Option<ParserOutput> {
        let output = self.execute_osc(state);
        if byte == b'\\' {
            // ST (ESC \)
            self.state = ParserState::Ground;
            return output;
        }
        // Not ST: the OSC ends here and the byte starts a new escape
        self.enter_escape();
        let next = self.escape(byte, state);
        output.or(next)
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn push_param(&mut self, param: u16) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(param);
        }
    }

    fn push_intermediate(&mut self, byte: u8) {
        if self.intermediates.len() < MAX_INTERMEDIATES {
            self.intermediates.push(byte);
        }
    }

    fn ground(&mut self, byte: u8, state: &mut TerminalState) -> Option<ParserOutput> {
        if (0x20..0x7F).contains(&byte) {
            state.put_char(byte as char);
        }
        None
    }

    fn escape(&mut self, byte: u8, state: &mut TerminalState) -> Option<ParserOutput> {
        self.state = ParserState::Ground;
        match byte {
            b'[' => {
                self.state = ParserState::CsiEntry;
                self.params.clear();
                self.intermediates.clear();
                self.current_param = None;
            }
            b']' => {
                self.state = ParserState::OscString;
                self.osc_bytes.clear();
            }
            // DECSC / DECRC
            b'7' => state.save_cursor(),
            b'8' => state.restore_cursor(),
            // IND
            b'D' => state.index(),
            // NEL
            b'E' => {
                state.carriage_return();
                state.linefeed();
            }
            // RI
            b'M' => state.reverse_index(),
            // RIS
            b'c' => state.full_reset(),
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => {}
        }
        None
    }

    fn escape_intermediate(&mut self, byte: u8) -> Option<ParserOutput> {
        match byte {
            0x20..=0x2F => {
                self.push_intermediate(byte);
            }
            _ => {
                // Final byte: charset selection and friends are ignored
                self.state = ParserState::Ground;
            }
        }
        None
    }

    fn csi_entry(&mut self, byte: u8, state: &mut TerminalState) -> Option<ParserOutput> {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some((byte - b'0') as u16);
                self.state = ParserState::CsiParam;
            }
            b';' => {
                self.push_param(0);
                self.state = ParserState::CsiParam;
            }
            b'?' | b'>' | b'!' | b'=' => {
                self.push_intermediate(byte);
            }
            0x20..=0x2F => {
                self.push_intermediate(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                return self.execute_csi(byte, state);
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
        None
    }

    fn csi_param(&mut self, byte: u8, state: &mut TerminalState) -> Option<ParserOutput> {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param.unwrap_or(0).saturating_mul(10).saturating_add(digit)
                );
            }
            // ':' separates SGR subparameters; treated like ';'
            b';' | b':' => {
                self.push_param(self.current_param.unwrap_or(0));
                self.current_param = None;
            }
            0x20..=0x2F => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                self.push_intermediate(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                return self.execute_csi(byte, state);
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
        None
    }

    fn csi_intermediate(&mut self, byte: u8, state: &mut TerminalState) -> Option<ParserOutput> {
        match byte {
            0x20..=0x2F => {
                self.push_intermediate(byte);
            }
            0x40..=0x7E => {
                return self.execute_csi(byte, state);
            }
            _ => {
                self.state = ParserState::Ground;
            }
        }
        None
    }

    fn osc_string_state(&mut self, byte: u8, state: &mut TerminalState) -> Option<ParserOutput> {
        match byte {
            0x07 => {
                // BEL terminates OSC
                self.state = ParserState::Ground;
                self.execute_osc(state)
            }
            0x1B => {
                // Possibly ST (ESC \)
                self.state = ParserState::EscapeInOsc;
                None
            }
            _ => {
                if self.osc_bytes.len() < MAX_OSC_BYTES {
                    self.osc_bytes.push(byte);
                }
                None
            }
        }
    }

    fn execute_csi(&mut self, final_byte: u8, state: &mut TerminalState) -> Option<ParserOutput> {
        self.state = ParserState::Ground;

        let is_private = self.intermediates.contains(&b'?');
        let is_gt = self.intermediates.contains(&b'>');
        let params = &self.params;
        let count = params.first().copied().unwrap_or(1).max(1);

        match (is_private, is_gt, final_byte) {
            // Cursor movement
            (false, false, b'A') => state.cursor_up(count),
            (false, false, b'B') => state.cursor_down(count),
            (false, false, b'C') => state.cursor_forward(count),
            (false, false, b'D') => state.cursor_backward(count),
            (false, false, b'E') => {
                // CNL
                state.cursor_down(count);
                state.carriage_return();
            }
            (false, false, b'F') => {
                // CPL
                state.cursor_up(count);
                state.carriage_return();
            }
            (false, false, b'G') => {
                // CHA
                let row = state.active_cursor().row + 1;
                state.cursor_position(row, count);
            }
            (false, false, b'H') | (false, false, b'f') => {
                // CUP / HVP
                let row = params.first().copied().unwrap_or(1);
                let col = params.get(1).copied().unwrap_or(1);
                state.cursor_position(row, col);
            }
            (false, false, b'd') => {
                // VPA
                let col = state.active_cursor().col + 1;
                state.cursor_position(count, col);
            }

            // Erase
            (false, false, b'J') => state.erase_in_display(params.first().copied().unwrap_or(0)),
            (false, false, b'K') => state.erase_in_line(params.first().copied().unwrap_or(0)),

            // Line and character editing
            (false, false, b'L') => state.insert_lines(count),
            (false, false, b'M') => state.delete_lines(count),
            (false, false, b'@') => state.insert_chars(count),
            (false, false, b'P') => state.delete_chars(count),
            (false, false, b'X') => state.erase_chars(count),

            // Scroll
            (false, false, b'S') => state.scroll_up(count),
            (false, false, b'T') => state.scroll_down(count),

            // DECSTBM
            (false, false, b'r') => {
                let top = params.first().copied().unwrap_or(1);
                let bottom = params.get(1).copied().filter(|&b| b > 0).unwrap_or(state.rows);
                state.set_scroll_region(top, bottom);
                state.cursor_position(1, 1);
            }

            (false, false, b'm') => Self::execute_sgr(params, state),

            (false, false, b's') => state.save_cursor(),
            (false, false, b'u') => state.restore_cursor(),

            // Device Status Report
            (false, false, b'n') => {
                return match params.first() {
                    Some(5) => Some(ParserOutput::Response(Response::StatusOk)),
                    Some(6) => {
                        let cursor = state.active_cursor();
                        let col = cursor.col.min(state.cols.saturating_sub(1));
                        Some(ParserOutput::Response(Response::CursorPosition(cursor.row + 1, col + 1)))
                    }
                    _ => None,
                };
            }

            // Device Attributes
            (false, false, b'c') => {
                return Some(ParserOutput::Response(Response::DeviceAttributes));
            }
            (false, true, b'c') => {
                return Some(ParserOutput::Response(Response::SecondaryDeviceAttributes));
            }

            // DEC private modes
            (true, false, b'h') | (true, false, b'l') => {
                let enable = final_byte == b'h';
                for &p in params {
                    state.set_private_mode(p, enable);
                }
            }

            // Standard modes
            (false, false, b'h') | (false, false, b'l') => {
                let enable = final_byte == b'h';
                for &p in params {
                    match p {
                        4 => state.modes.insert_mode = enable,
                        20 => state.modes.linefeed_newline = enable,
                        _ => {}
                    }
                }
            }

            _ => {
                if final_byte == b'q' && self.intermediates.contains(&b' ') {
                    // DECSCUSR
                    let shape = match CursorShape::from_decscusr(params.first().copied().unwrap_or(0) as u8) {
                        CursorShape::Default => state.default_shape,
                        shape => shape,
                    };
                    state.active_cursor_mut().shape = shape;
                } else if final_byte == b'p' && self.intermediates.contains(&b'!') {
                    // DECSTR
                    state.soft_reset();
                } else {
                    tracing::debug!(
                        "Unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                        self.intermediates,
                        params,
                        final_byte as char
                    );
                }
            }
        }

        None
    }

    fn execute_sgr(params: &[u16], state: &mut TerminalState) {
        if params.is_empty() {
            state.current_attrs.reset();
            return;
        }

        let mut iter = params.iter().copied();

        while let Some(param) = iter.next() {
            let attrs = &mut state.current_attrs;
            match param {
                0 => attrs.reset(),
                1 => attrs.flags |= AttrFlags::BOLD,
                2 => attrs.flags |= AttrFlags::DIM,
                3 => attrs.flags |= AttrFlags::ITALIC,
                4 => attrs.flags |= AttrFlags::UNDERLINE,
                5 => attrs.flags |= AttrFlags::BLINK,
                7 => attrs.flags |= AttrFlags::INVERSE,
                8 => attrs.flags |= AttrFlags::HIDDEN,
                9 => attrs.flags |= AttrFlags::STRIKETHROUGH,

                22 => attrs.flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
                23 => attrs.flags &= !AttrFlags::ITALIC,
                24 => attrs.flags &= !AttrFlags::UNDERLINE,
                25 => attrs.flags &= !AttrFlags::BLINK,
                27 => attrs.flags &= !AttrFlags::INVERSE,
                28 => attrs.flags &= !AttrFlags::HIDDEN,
                29 => attrs.flags &= !AttrFlags::STRIKETHROUGH,

                30..=37 => attrs.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        attrs.fg = color;
                    }
                }
                39 => attrs.fg = Color::Default,

                40..=47 => attrs.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        attrs.bg = color;
                    }
                }
                49 => attrs.bg = Color::Default,

                90..=97 => attrs.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => attrs.bg = Color::Indexed((param - 100 + 8) as u8),

                _ => {}
            }
        }
    }

    /// Parse the tail of SGR 38/48: `5;n` or `2;r;g;b`
    fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
        match iter.next()? {
            5 => iter.next().map(|n| Color::Indexed(n as u8)),
            2 => {
                let r = iter.next().unwrap_or(0) as u8;
                let g = iter.next().unwrap_or(0) as u8;
                let b = iter.next().unwrap_or(0) as u8;
                Some(Color::Rgb(r, g, b))
            }
            _ => None,
        }
    }

    fn execute_osc(&mut self, state: &mut TerminalState) -> Option<ParserOutput> {
        let osc = String::from_utf8_lossy(&self.osc_bytes).into_owned();
        self.osc_bytes.clear();

        let (code, text) = osc.split_once(';')?;
        match code {
            // 1 only sets the icon name
            "0" | "2" => {
                state.title = text.to_string();
                Some(ParserOutput::Title(text.to_string()))
            }
            _ => {
                tracing::debug!("Ignoring OSC {}", code);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(parser: &mut VtParser, state: &mut TerminalState, input: &str) -> Vec<ParserOutput> {
        let mut out = Vec::new();
        parser.advance(input.as_bytes(), state, &mut out);
        out
    }

    #[test]
    fn test_cursor_movement() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, "\x1b[5;10H");

        assert_eq!(state.active_cursor().row, 4);
        assert_eq!(state.active_cursor().col, 9);
    }

    #[test]
    fn test_sgr_colors() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, "\x1b[31m");
        assert_eq!(state.current_attrs.fg, Color::Indexed(1));

        run(&mut parser, &mut state, "\x1b[38;2;10;20;30;48;5;200m");
        assert_eq!(state.current_attrs.fg, Color::Rgb(10, 20, 30));
        assert_eq!(state.current_attrs.bg, Color::Indexed(200));

        run(&mut parser, &mut state, "\x1b[m");
        assert_eq!(state.current_attrs.fg, Color::Default);
    }

    #[test]
    fn test_osc_title_with_bel_and_st() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let out = run(&mut parser, &mut state, "\x1b]0;first\x07");
        assert_eq!(out, vec![ParserOutput::Title("first".to_string())]);

        let out = run(&mut parser, &mut state, "\x1b]2;zweite ü\x1b\\");
        assert_eq!(out, vec![ParserOutput::Title("zweite ü".to_string())]);
        assert_eq!(state.title, "zweite ü");
    }

    #[test]
    fn test_icon_name_is_not_a_title() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let out = run(&mut parser, &mut state, "\x1b]1;icon\x07");
        assert!(out.is_empty());
        assert!(state.title.is_empty());
    }

    #[test]
    fn test_cursor_position_report() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let out = run(&mut parser, &mut state, "\x1b[3;7H\x1b[6n");
        assert_eq!(out, vec![ParserOutput::Response(Response::CursorPosition(3, 7))]);
    }

    #[test]
    fn test_utf8_split_across_writes() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        let bytes = "é".as_bytes();
        let mut out = Vec::new();

        parser.advance(&bytes[..1], &mut state, &mut out);
        parser.advance(&bytes[1..], &mut state, &mut out);

        assert_eq!(state.active_screen().rows[0].cells[0].grapheme, "é");
        assert_eq!(state.active_cursor().col, 1);
    }

    #[test]
    fn test_broken_utf8_becomes_replacement() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();
        let mut out = Vec::new();

        parser.advance(&[0xE3, b'a'], &mut state, &mut out);

        let row = &state.active_screen().rows[0];
        assert_eq!(row.cells[0].grapheme, "\u{FFFD}");
        assert_eq!(row.cells[1].grapheme, "a");
    }

    #[test]
    fn test_alternate_buffer_modes() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, "\x1b[?1047h");
        assert!(state.using_alternate);
        run(&mut parser, &mut state, "\x1b[?1047l");
        assert!(!state.using_alternate);
    }

    #[test]
    fn test_bell_and_soft_reset() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let out = run(&mut parser, &mut state, "\x07\x1b[?2004h\x1b[4m");
        assert_eq!(out, vec![ParserOutput::Bell]);
        assert!(state.modes.bracketed_paste);

        run(&mut parser, &mut state, "\x1b[!p");
        assert!(!state.modes.bracketed_paste);
        assert!(!state.current_attrs.flags.contains(AttrFlags::UNDERLINE));
    }

    #[test]
    fn test_insert_mode_shifts_text() {
        let mut state = TerminalState::new(10, 2);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, "bc\r\x1b[4ha");
        assert_eq!(state.active_screen().rows[0].text().trim_end(), "abc");
    }

    #[test]
    fn test_oversized_sequences_are_bounded() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        let csi = format!("\x1b[{}5H", "1;".repeat(1000));
        run(&mut parser, &mut state, &csi);
        assert!(parser.params.len() <= MAX_PARAMS);
        // The first two parameters still position the cursor
        assert_eq!((state.active_cursor().row, state.active_cursor().col), (0, 0));

        run(&mut parser, &mut state, &format!("\x1b[{}q", " ".repeat(100)));
        assert!(parser.intermediates.len() <= MAX_INTERMEDIATES);

        let long_title = "t".repeat(MAX_OSC_BYTES * 3);
        let out = run(&mut parser, &mut state, &format!("\x1b]2;{}\x07", long_title));
        assert!(parser.osc_bytes.capacity() <= MAX_OSC_BYTES * 2);
        match out.as_slice() {
            [ParserOutput::Title(title)] => assert_eq!(title.len(), MAX_OSC_BYTES - 2),
            other => panic!("unexpected output: {:?}", other),
        }

        // Parsing continues normally afterwards
        run(&mut parser, &mut state, "ok");
        assert_eq!(state.active_screen().rows[0].text().trim_end(), "ok");
    }
}
