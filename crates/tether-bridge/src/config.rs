//! Bridge configuration
//!
//! Runtime limits for the marshalling layer, loadable from TOML. Defaults
//! match the wire-level constants callers already depend on, so an absent
//! config file changes nothing.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Cap on fuzzy byte-buffer coercion from numeric arrays.
pub const DEFAULT_MAX_ARRAY_BYTES: usize = 1024 * 1024;

/// Bridge runtime limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct BridgeConfig {
    /// Maximum element count accepted when coercing a numeric array into a
    /// byte buffer.
    pub max_array_bytes: usize,

    /// Emit a debug log line per finalized resource.
    pub log_finalizers: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            max_array_bytes: DEFAULT_MAX_ARRAY_BYTES,
            log_finalizers: false,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
