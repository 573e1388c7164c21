//! Harness configuration.
//!
//! Configuration is a JSON object whose keys mirror the fields of [`Config`].
//! Every key is optional; omitted keys keep their defaults, so `{}` is the
//! default configuration. For example:
//!
//! ```json
//! { "namespace": "spectest", "max-wasm-stack": 1048576, "tail-call": false }
//! ```

use serde::Deserialize;
use std::path::Path;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Engine features and host settings for a [`crate::runtime::Harness`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    /// Reserved namespace the host stub is registered under.
    pub namespace: String,
    /// Maximum native stack, in bytes, available to wasm code before a
    /// call is reported as resource exhaustion.
    pub max_wasm_stack: usize,
    pub gc: bool,
    /// Implied by `gc`.
    pub function_references: bool,
    pub tail_call: bool,
    pub multi_memory: bool,
    pub simd: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            namespace: "spectest".to_string(),
            max_wasm_stack: 512 * 1024,
            gc: true,
            function_references: true,
            tail_call: true,
            multi_memory: true,
            simd: true,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_override() {
        let config = Config::from_json(r#"{"namespace": "host", "max-wasm-stack": 65536, "simd": false}"#).unwrap();
        assert_eq!(config.namespace, "host");
        assert_eq!(config.max_wasm_stack, 65536);
        assert!(!config.simd);
        assert!(config.gc);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(matches!(Config::from_json(r#"{"gcc": true}"#), Err(ConfigError::Json(_))));
    }

    #[test]
    fn missing_file() {
        let err = Config::load("/nonexistent/wastest.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/wastest.json"));
    }
}
