#![deny(missing_docs)]
//! The on-disk configuration the Orchestrator Facade loads once at boot.
//!
//! This crate only defines and parses the typed shape; it does not watch
//! the file or hot-reload it. Loading happens once, the result is passed
//! through constructors as an explicit record, and nothing downstream
//! reads configuration from ambient global state.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading or parsing the configuration file.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read configuration file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error, stringified (`std::io::Error` isn't `Clone`).
        source: String,
    },

    /// The file's contents did not parse as the expected schema.
    #[error("could not parse configuration: {0}")]
    Parse(String),
}

/// Top-level configuration record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Providers and triggers to install automatically on boot.
    #[serde(default)]
    pub auto_install: AutoInstall,

    /// Model identifier used when an agent/team/workflow definition
    /// doesn't specify one.
    pub default_model: String,

    /// Per-stage deadlines, in seconds.
    #[serde(default)]
    pub execution_timeouts: ExecutionTimeouts,
}

/// Names to install automatically at boot, reconciled against the
/// installation manifests by the lifecycle managers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AutoInstall {
    /// Tool-provider names to install if not already present.
    #[serde(default)]
    pub providers: Vec<String>,
    /// Trigger package names to install if not already present.
    #[serde(default)]
    pub triggers: Vec<String>,
}

/// Deadlines bounding the stages named in §5's concurrency model, in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionTimeouts {
    /// Deadline for a single Model Gateway call.
    pub per_llm_call: u64,
    /// Deadline for a single Tool Client call.
    pub per_tool_call: u64,
    /// Deadline for one ReAct iteration (model call plus any tool calls it issues).
    pub per_iteration: u64,
    /// Deadline for an entire execution (agent, team, or workflow run).
    pub per_execution: u64,
}

impl Default for ExecutionTimeouts {
    fn default() -> Self {
        Self { per_llm_call: 60, per_tool_call: 30, per_iteration: 120, per_execution: 600 }
    }
}

impl Config {
    /// Load and parse a configuration file from `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Read { path: path.display().to_string(), source: e.to_string() })?;
        Self::parse(&contents)
    }

    /// Parse a configuration document already read into memory.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_fully_specified_document() {
        let yaml = r#"
auto_install:
  providers: ["files", "net-scan"]
  triggers: ["nightly-report"]
default_model: "claude-opus"
execution_timeouts:
  per_llm_call: 45
  per_tool_call: 20
  per_iteration: 90
  per_execution: 500
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.auto_install.providers, vec!["files", "net-scan"]);
        assert_eq!(config.auto_install.triggers, vec!["nightly-report"]);
        assert_eq!(config.default_model, "claude-opus");
        assert_eq!(config.execution_timeouts.per_llm_call, 45);
    }

    #[test]
    fn missing_optional_sections_fall_back_to_defaults() {
        let yaml = "default_model: \"claude-opus\"\n";
        let config = Config::parse(yaml).unwrap();
        assert!(config.auto_install.providers.is_empty());
        assert!(config.auto_install.triggers.is_empty());
        assert_eq!(config.execution_timeouts.per_execution, 600);
    }

    #[test]
    fn missing_default_model_is_a_parse_error() {
        let yaml = "auto_install:\n  providers: []\n";
        assert!(Config::parse(yaml).is_err());
    }

    #[tokio::test]
    async fn load_reads_a_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit.yaml");
        tokio::fs::write(&path, "default_model: \"local-model\"\n").await.unwrap();
        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.default_model, "local-model");
    }

    #[tokio::test]
    async fn load_reports_a_read_error_for_a_missing_file() {
        let err = Config::load("/nonexistent/conduit.yaml").await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
