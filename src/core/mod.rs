//! Core terminal session components.
//!
//! - **term**: VT100/xterm terminal state and escape sequence parser
//! - **engine**: the operation surface a session drives, and the built-in engine
//! - **shim**: reads of engine internals, kept apart from the engine surface
//! - **container**: render targets a session is opened on
//! - **handler**: single-slot event handlers
//! - **session**: one engine bound to one container
//!
//! # Architecture
//!
//! ```text
//! TerminalSession
//! ├── Container (pixel size, padding, attachment)
//! ├── HandlerSlot x2 (input, title)
//! └── VtEngine: TerminalEngine + BufferShim
//!     ├── TerminalState
//!     │   ├── ScreenBuffer x2 (primary with scroll-back, alternate)
//!     │   └── Cursor x2
//!     └── VtParser (escape sequences, UTF-8 decoding)
//! ```

pub mod container;
pub mod engine;
pub mod handler;
pub mod session;
pub mod shim;
pub mod term;
