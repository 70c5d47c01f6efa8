// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # LSP Engine Configuration
//!
//! This module provides configuration management for the LSP engine.
//!
//! ## Configuration Structure
//!
//! The engine configuration includes:
//! - Diagnostics switches (enabled, publish on change, problem cap)
//! - An optional log filter applied at runtime
//!
//! ## Sources
//!
//! 1. **Client Settings** (`workspace/didChangeConfiguration` or
//!    `initializationOptions`)
//! ```json
//! {
//!   "flinkSqlLsp": {
//!     "diagnostics": { "enabled": true, "onChange": false, "maxProblems": 100 },
//!     "logLevel": "debug"
//!   }
//! }
//! ```
//!
//! 2. **Configuration File** (`flink-sql-lsp.yaml` in the workspace root)
//! ```yaml
//! diagnostics:
//!   enabled: true
//!   onChange: true
//! logLevel: info
//! ```
//!
//! Missing keys take their defaults.
//!
//! ## Example
//!
//! ```rust
//! use flink_sql_lsp::EngineConfig;
//! use serde_json::json;
//!
//! let settings = json!({ "flinkSqlLsp": { "diagnostics": { "maxProblems": 10 } } });
//! let config = EngineConfig::from_lsp_settings(&settings).unwrap().unwrap();
//!
//! assert!(config.diagnostics.enabled);
//! assert_eq!(config.diagnostics.max_problems, 10);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Key of the server's section in client settings
pub const SETTINGS_SECTION: &str = "flinkSqlLsp";

/// Name of the workspace configuration file
pub const CONFIG_FILE_NAME: &str = "flink-sql-lsp.yaml";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Diagnostics configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiagnosticsConfig {
    /// Analyze documents and publish diagnostics
    pub enabled: bool,

    /// Also publish after every change, not only on open and save
    pub on_change: bool,

    /// Maximum diagnostics published per document
    pub max_problems: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_change: false,
            max_problems: 100,
        }
    }
}

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Diagnostics configuration
    pub diagnostics: DiagnosticsConfig,

    /// Log filter directive (`info`, `flink_sql_lsp=debug`, ...)
    pub log_level: Option<String>,
}

impl EngineConfig {
    /// Validate the configuration
    ///
    /// Checks that:
    /// - At least one problem may be published
    /// - The log level starts with a known level or a target directive
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.diagnostics.max_problems == 0 {
            return Err(ConfigError::InvalidMaxProblems);
        }

        if let Some(level) = &self.log_level {
            let known = level.split(',').all(|directive| {
                let level = directive
                    .rsplit_once('=')
                    .map_or(directive, |(_, level)| level)
                    .trim();
                LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
            });
            if !known {
                return Err(ConfigError::InvalidLogLevel(level.clone()));
            }
        }

        Ok(())
    }

    /// Parse engine config from LSP client settings payload.
    ///
    /// # Returns
    ///
    /// - `Ok(None)` if the payload has no `flinkSqlLsp` section
    /// - `Ok(Some(config))` for a valid section
    /// - `Err` if the section is malformed or fails validation
    pub fn from_lsp_settings(settings: &Value) -> Result<Option<Self>, ConfigError> {
        let Some(section) = settings.get(SETTINGS_SECTION) else {
            return Ok(None);
        };

        let config: Self = serde_json::from_value(section.clone())?;
        config.validate()?;
        Ok(Some(config))
    }

    /// Parse engine config from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `flink-sql-lsp.yaml` from a workspace root, if present
    pub fn discover(root: &Path) -> Result<Option<Self>, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(None);
        }

        debug!("Loading configuration from {}", path.display());
        let yaml = std::fs::read_to_string(&path)?;
        Self::from_yaml_str(&yaml).map(Some)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The problem cap must allow at least one diagnostic
    #[error("diagnostics.maxProblems must be greater than 0")]
    InvalidMaxProblems,

    /// Unknown log level
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    /// Malformed client settings
    #[error("Invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    /// Malformed configuration file
    #[error("Invalid configuration file: {0}")]
    File(#[from] serde_yaml::Error),

    /// Configuration file could not be read
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.diagnostics.enabled);
        assert!(!config.diagnostics.on_change);
        assert_eq!(config.diagnostics.max_problems, 100);
        assert!(config.log_level.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lsp_settings() {
        let settings = json!({
            "flinkSqlLsp": {
                "diagnostics": { "enabled": false, "onChange": true },
                "logLevel": "flink_sql_lsp=debug,info"
            }
        });

        let config = EngineConfig::from_lsp_settings(&settings).unwrap().unwrap();
        assert!(!config.diagnostics.enabled);
        assert!(config.diagnostics.on_change);
        assert_eq!(config.diagnostics.max_problems, 100);
        assert_eq!(config.log_level.as_deref(), Some("flink_sql_lsp=debug,info"));
    }

    #[test]
    fn test_from_lsp_settings_without_section() {
        let settings = json!({ "otherServer": { "enabled": true } });
        assert!(EngineConfig::from_lsp_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_from_lsp_settings_rejects_bad_values() {
        let wrong_type = json!({ "flinkSqlLsp": { "diagnostics": { "enabled": "yes" } } });
        assert!(matches!(
            EngineConfig::from_lsp_settings(&wrong_type),
            Err(ConfigError::Settings(_))
        ));

        let zero = json!({ "flinkSqlLsp": { "diagnostics": { "maxProblems": 0 } } });
        assert!(matches!(
            EngineConfig::from_lsp_settings(&zero),
            Err(ConfigError::InvalidMaxProblems)
        ));

        let level = json!({ "flinkSqlLsp": { "logLevel": "loud" } });
        assert!(matches!(
            EngineConfig::from_lsp_settings(&level),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_from_yaml_str() {
        let config = EngineConfig::from_yaml_str(
            "diagnostics:\n  onChange: true\n  maxProblems: 5\nlogLevel: WARN\n",
        )
        .unwrap();
        assert!(config.diagnostics.enabled);
        assert!(config.diagnostics.on_change);
        assert_eq!(config.diagnostics.max_problems, 5);

        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
        assert!(matches!(
            EngineConfig::from_yaml_str("diagnostics: [1, 2]"),
            Err(ConfigError::File(_))
        ));
    }

    #[test]
    fn test_discover_missing_file() {
        let dir = std::env::temp_dir().join("flink-sql-lsp-config-missing");
        assert!(EngineConfig::discover(&dir).unwrap().is_none());
    }

    #[test]
    fn test_discover_reads_file() {
        let dir = std::env::temp_dir().join(format!("flink-sql-lsp-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE_NAME), "diagnostics:\n  enabled: false\n").unwrap();

        let config = EngineConfig::discover(&dir).unwrap().unwrap();
        assert!(!config.diagnostics.enabled);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
