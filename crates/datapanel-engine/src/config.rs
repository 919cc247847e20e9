//! Engine configuration

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// HTTP panel request timeout in seconds
    pub http_timeout_secs: u64,
    /// Program panel wall-clock limit in seconds
    pub script_timeout_secs: u64,
    /// Interpreter used for JavaScript program panels
    pub node_binary: String,
    /// Interpreter used for Python program panels
    pub python_binary: String,
    /// User agent sent by HTTP panels
    pub user_agent: String,
    /// Turn numeric and boolean CSV cells into JSON numbers and booleans
    pub csv_infer_types: bool,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With HTTP timeout
    #[inline]
    #[must_use]
    pub fn with_http_timeout(mut self, secs: u64) -> Self {
        self.http_timeout_secs = secs;
        self
    }

    /// With script timeout
    #[inline]
    #[must_use]
    pub fn with_script_timeout(mut self, secs: u64) -> Self {
        self.script_timeout_secs = secs;
        self
    }

    /// With CSV type inference on or off
    #[inline]
    #[must_use]
    pub fn with_csv_infer_types(mut self, infer: bool) -> Self {
        self.csv_infer_types = infer;
        self
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// - `EngineError::Config` on syntax errors or unknown keys
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// - `EngineError::Io` if the file cannot be read
    /// - `EngineError::Config` if it does not parse
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            script_timeout_secs: 60,
            node_binary: "node".to_string(),
            python_binary: "python3".to_string(),
            user_agent: format!("datapanel/{}", crate::VERSION),
            csv_infer_types: true,
        }
    }
}
