//! Session configuration.
//!
//! Settings are loaded from `~/.termsession/config.toml`:
//!
//! ```toml
//! cursor_blink = true
//! take_focus = true
//!
//! # Lines kept for the primary buffer
//! scrollback = 1000
//!
//! # Pixels reserved for a scrollbar when fitting
//! scrollbar_width = 0
//!
//! [cell]
//! width = 9
//! height = 17
//! ```
//!
//! Missing keys fall back to their defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::engine::{CellMetrics, EngineOptions};
use crate::core::term::DEFAULT_SCROLLBACK;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings for new terminal sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cursor_blink: bool,
    /// Focus the terminal when it is created
    pub take_focus: bool,
    pub scrollback: usize,
    pub scrollbar_width: u32,
    pub cell: CellMetrics,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cursor_blink: false,
            take_focus: true,
            scrollback: DEFAULT_SCROLLBACK,
            scrollbar_width: 0,
            cell: CellMetrics::default(),
        }
    }
}

impl SessionConfig {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Engine construction options derived from this config
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            cursor_blink: self.cursor_blink,
            scrollback: self.scrollback,
            cell: self.cell,
            scrollbar_width: self.scrollbar_width,
        }
    }

    /// `~/.termsession/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        data_dir().map(|dir| dir.join("config.toml"))
    }
}

/// `~/.termsession`, also home of the log file
pub fn data_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(|home| PathBuf::from(home).join(".termsession"))
}
