//! Configuration types for a Lua context.
//!
//! This module provides the settings a `LuaContext` is created with.

use serde::{Deserialize, Serialize};

use crate::error::{LuaError, LuaResult};

/// Lua context configuration.
///
/// Controls how the VM is created and how scripts are loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LuaConfig {
    /// Open the Lua standard libraries on creation.
    /// Default: true
    pub open_libs: bool,

    /// Chunk name used when compiling source passed to `eval`.
    /// Default: "=eval"
    pub chunk_name: String,
}

impl Default for LuaConfig {
    fn default() -> Self {
        Self {
            open_libs: true,
            chunk_name: "=eval".to_string(),
        }
    }
}

impl LuaConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config for a bare VM without the standard libraries.
    pub fn bare() -> Self {
        Self {
            open_libs: false,
            ..Default::default()
        }
    }

    /// Enable or disable the standard libraries.
    pub fn open_libs(mut self, enabled: bool) -> Self {
        self.open_libs = enabled;
        self
    }

    /// Set the chunk name used for evaluated source.
    pub fn chunk_name(mut self, name: impl Into<String>) -> Self {
        self.chunk_name = name.into();
        self
    }

    /// Load configuration from TOML text.
    ///
    /// Missing keys keep their defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use otter_lua_core::LuaConfig;
    ///
    /// let config = LuaConfig::from_toml_str("chunk_name = \"=main\"").unwrap();
    /// assert_eq!(config.chunk_name, "=main");
    /// assert!(config.open_libs);
    /// ```
    pub fn from_toml_str(text: &str) -> LuaResult<Self> {
        toml::from_str(text).map_err(|e| LuaError::Config {
            message: e.to_string(),
        })
    }
}
