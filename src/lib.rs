//! termsession - an embeddable VT terminal session
//!
//! A [`TerminalSession`] binds one terminal engine to one container and
//! exposes a small surface: write output, fit to the container, scroll,
//! reset, inspect the buffer, and receive user input and title changes
//! through single-slot handlers.
//!
//! ```no_run
//! use termsession::{FixedContainer, TerminalSession};
//!
//! let mut session = TerminalSession::create(FixedContainer::new(720, 408), false, true)?;
//! session.on_input(|data| println!("input: {:?}", data));
//! session.write_line("hello");
//! assert_eq!(session.current_line_text().trim_end(), "");
//! # Ok::<(), termsession::EngineError>(())
//! ```

pub mod config;
pub mod core;
pub mod ui;

pub use crate::config::{ConfigError, SessionConfig};
pub use crate::core::container::{Container, FixedContainer, Padding, PixelSize};
pub use crate::core::engine::{
    CellMetrics, Dimensions, EngineError, EngineEvent, EngineOptions, TerminalEngine, VtEngine,
};
pub use crate::core::session::TerminalSession;
pub use crate::core::shim::{BufferShim, CursorPosition};
