//! TOML configuration for the `systemhook` binary.
//!
//! Every field is optional; a missing file section falls back to the
//! defaults (both hooks enabled, legacy acquisition, `info` logging).
//!
//! ```toml
//! log_level = "debug"
//!
//! [keyboard]
//! enabled = true
//! raw_input = false
//!
//! [mouse]
//! enabled = true
//! raw_input = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::hook::{AcquisitionMode, InputClass};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `log` filter: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub keyboard: ClassConfig,
    #[serde(default)]
    pub mouse: ClassConfig,
}

/// Per input class settings.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClassConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Use raw input (device handles) instead of the low-level hook.
    #[serde(default)]
    pub raw_input: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            keyboard: ClassConfig::default(),
            mouse: ClassConfig::default(),
        }
    }
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            raw_input: false,
        }
    }
}

impl ClassConfig {
    pub fn mode(&self) -> AcquisitionMode {
        AcquisitionMode::from_raw_flag(self.raw_input)
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn class(&self, class: InputClass) -> &ClassConfig {
        match class {
            InputClass::Keyboard => &self.keyboard,
            InputClass::Mouse => &self.mouse,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
