//! Host console front end.
//!
//! - **keymapper**: key and mouse events to the byte sequences an application expects
//! - **renderer**: draws terminal state onto the console with crossterm

pub mod keymapper;
pub mod renderer;

pub use keymapper::*;
pub use renderer::*;
