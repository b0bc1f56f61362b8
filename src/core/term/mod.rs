//! VT100/xterm terminal emulation: screen state and escape sequence parser.

mod parser;
mod state;

pub use parser::{ParserOutput, Response, VtParser};
pub use state::*;
