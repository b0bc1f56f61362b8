//! Key mapping for terminal input
//!
//! Converts host key and mouse events to the VT sequences an application
//! running in the terminal expects.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::core::term::{MouseMode, TerminalModes};

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Key mapper for converting host events to bytes
pub struct KeyMapper;

impl KeyMapper {
    /// Map a crossterm KeyEvent to input bytes
    pub fn map(event: &KeyEvent, modes: &TerminalModes) -> Option<Vec<u8>> {
        let mods = Modifiers::from(event.modifiers);

        match event.code {
            KeyCode::Char(ch) => Some(Self::map_char(ch, mods)),

            KeyCode::Enter => {
                if modes.linefeed_newline {
                    Some(vec![0x0D, 0x0A])
                } else {
                    Some(vec![0x0D])
                }
            }

            KeyCode::Backspace => {
                if mods.contains(Modifiers::ALT) {
                    Some(vec![0x1B, 0x7F])
                } else {
                    Some(vec![0x7F])
                }
            }

            KeyCode::Tab => Some(vec![0x09]),
            KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),

            KeyCode::Esc => Some(vec![0x1B]),

            KeyCode::Up => Some(Self::cursor_key(b'A', mods, modes)),
            KeyCode::Down => Some(Self::cursor_key(b'B', mods, modes)),
            KeyCode::Right => Some(Self::cursor_key(b'C', mods, modes)),
            KeyCode::Left => Some(Self::cursor_key(b'D', mods, modes)),
            KeyCode::Home => Some(Self::cursor_key(b'H', mods, modes)),
            KeyCode::End => Some(Self::cursor_key(b'F', mods, modes)),

            KeyCode::PageUp => Some(Self::tilde_key(5, mods)),
            KeyCode::PageDown => Some(Self::tilde_key(6, mods)),
            KeyCode::Insert => Some(Self::tilde_key(2, mods)),
            KeyCode::Delete => Some(Self::tilde_key(3, mods)),

            KeyCode::F(n) => Self::function_key(n, mods),

            _ => None,
        }
    }

    /// Map a character with modifiers
    fn map_char(ch: char, mods: Modifiers) -> Vec<u8> {
        let ctrl = mods.contains(Modifiers::CTRL);
        let alt = mods.contains(Modifiers::ALT);

        if ctrl {
            if let Some(code) = Self::control_code(ch) {
                return if alt { vec![0x1B, code] } else { vec![code] };
            }
        }

        let mut bytes = Vec::with_capacity(5);
        if alt {
            bytes.push(0x1B);
        }
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        bytes
    }

    /// C0 code produced by Ctrl + `ch`
    fn control_code(ch: char) -> Option<u8> {
        match ch {
            'a'..='z' => Some(ch as u8 - b'a' + 1),
            'A'..='Z' => Some(ch as u8 - b'A' + 1),
            '@' | '`' | ' ' | '2' => Some(0x00),
            '[' | '3' => Some(0x1B),
            '\\' | '4' => Some(0x1C),
            ']' | '5' => Some(0x1D),
            '^' | '~' | '6' => Some(0x1E),
            '_' | '?' | '7' => Some(0x1F),
            _ => None,
        }
    }

    /// Cursor and Home/End keys: CSI or SS3 depending on DECCKM
    fn cursor_key(key: u8, mods: Modifiers, modes: &TerminalModes) -> Vec<u8> {
        if !mods.is_empty() {
            format!("\x1b[1;{}{}", Self::modifier_code(mods), key as char).into_bytes()
        } else if modes.application_cursor {
            vec![0x1B, b'O', key]
        } else {
            vec![0x1B, b'[', key]
        }
    }

    /// Tilde key sequence (PageUp, PageDown, Insert, Delete)
    fn tilde_key(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            format!("\x1b[{};{}~", code, Self::modifier_code(mods)).into_bytes()
        }
    }

    /// Function key sequence
    fn function_key(n: u8, mods: Modifiers) -> Option<Vec<u8>> {
        let ss3 = match n {
            1 => Some(b'P'),
            2 => Some(b'Q'),
            3 => Some(b'R'),
            4 => Some(b'S'),
            _ => None,
        };
        if let Some(key) = ss3 {
            return Some(if mods.is_empty() {
                vec![0x1B, b'O', key]
            } else {
                format!("\x1b[1;{}{}", Self::modifier_code(mods), key as char).into_bytes()
            });
        }

        let code = match n {
            5 => 15,
            6 => 17,
            7 => 18,
            8 => 19,
            9 => 20,
            10 => 21,
            11 => 23,
            12 => 24,
            _ => return None,
        };
        Some(Self::tilde_key(code, mods))
    }

    /// xterm modifier parameter
    fn modifier_code(mods: Modifiers) -> u8 {
        1 + if mods.contains(Modifiers::SHIFT) { 1 } else { 0 }
            + if mods.contains(Modifiers::ALT) { 2 } else { 0 }
            + if mods.contains(Modifiers::CTRL) { 4 } else { 0 }
    }

    /// Encode a mouse event for the application, honouring its reporting mode.
    ///
    /// Coordinates are cell positions relative to the terminal. Returns `None`
    /// when the mode does not report this kind of event.
    pub fn encode_mouse_event(event: &MouseEvent, modes: &TerminalModes) -> Option<Vec<u8>> {
        let (button, pressed) = match (modes.mouse, event.kind) {
            (MouseMode::None, _) => return None,
            (MouseMode::X10, MouseEventKind::Down(btn)) => (Self::mouse_button_code(btn), true),
            (MouseMode::X10, _) => return None,
            (_, MouseEventKind::Down(btn)) => (Self::mouse_button_code(btn), true),
            (_, MouseEventKind::Up(btn)) => (Self::mouse_button_code(btn), false),
            (MouseMode::ButtonEvent | MouseMode::AnyEvent, MouseEventKind::Drag(btn)) => {
                (Self::mouse_button_code(btn) + 32, true)
            }
            (MouseMode::AnyEvent, MouseEventKind::Moved) => (35, true),
            (_, MouseEventKind::ScrollUp) => (64, true),
            (_, MouseEventKind::ScrollDown) => (65, true),
            (_, MouseEventKind::ScrollLeft) => (66, true),
            (_, MouseEventKind::ScrollRight) => (67, true),
            _ => return None,
        };

        // X10 mode reports no modifiers
        let mut cb = button;
        if modes.mouse != MouseMode::X10 {
            if event.modifiers.contains(KeyModifiers::SHIFT) {
                cb += 4;
            }
            if event.modifiers.contains(KeyModifiers::ALT) {
                cb += 8;
            }
            if event.modifiers.contains(KeyModifiers::CONTROL) {
                cb += 16;
            }
        }

        // 1-based coordinates
        let x = event.column.saturating_add(1);
        let y = event.row.saturating_add(1);

        if modes.sgr_mouse {
            let suffix = if pressed { 'M' } else { 'm' };
            return Some(format!("\x1b[<{};{};{}{}", cb, x, y, suffix).into_bytes());
        }

        // Legacy encoding: release is button 3, coordinates limited to 223
        let cb = if pressed { cb } else { 3 | (cb & !3) };
        if x <= 223 && y <= 223 {
            Some(vec![0x1B, b'[', b'M', cb + 32, x as u8 + 32, y as u8 + 32])
        } else {
            None
        }
    }

    fn mouse_button_code(button: MouseButton) -> u8 {
        match button {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }
}
