// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Error types for the skill orchestrator core.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for the execution engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Skill lookup failure. Carries the sorted list of valid names so the
    /// caller can never claim a skill exists that does not.
    #[error("Skill '{name}' not found in registry. Available skills: {available:?}")]
    SkillNotFound { name: String, available: Vec<String> },

    /// Workflow lookup failure, with the enumeration of valid names.
    #[error("Workflow '{name}' not found in registry. Available workflows: {available:?}")]
    WorkflowNotFound { name: String, available: Vec<String> },

    /// Required input missing or enum constraint violated.
    #[error("{0}")]
    InputInvalid(String),

    /// A pre-requisite probe failed before any step ran.
    #[error("{0}")]
    PrereqFailed(String),

    /// A template placeholder could not be resolved from the inputs mapping.
    #[error("Missing input for template: {0}")]
    MissingInput(String),

    /// A working directory or input-derived path resolves outside the base path.
    #[error("Path '{path}' escapes base directory '{base}'")]
    PathEscape { path: PathBuf, base: PathBuf },

    /// Subprocess exceeded its timeout.
    #[error("Command timed out after {}s", duration.as_secs())]
    Timeout { duration: Duration },

    /// A step type that requires an agent callback ran without one.
    #[error("No agent callback provided for {step_type} step")]
    CallbackMissing { step_type: String },

    /// The agent callback returned an error.
    #[error("Agent callback failed: {0}")]
    CallbackFailed(String),

    /// A post-step verification probe failed.
    #[error("{0}")]
    VerificationFailed(String),

    /// A schema file exists on disk but the validator is not compiled in.
    #[error("Schema present at '{schema}' but schema validation is not available; \
             build with the `schema-validation` feature or remove the schema file")]
    SchemaValidatorMissing { schema: PathBuf },

    /// Host-originated cancellation.
    #[error("Interrupted by user")]
    Interrupted,

    /// Spec parsing error.
    #[error("Failed to parse spec: {0}")]
    Parse(String),

    /// Spec validation error.
    #[error("Spec validation failed: {0}")]
    Validation(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Create a new parse error.
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = EngineError::parse("invalid JSON");
        assert!(matches!(err, EngineError::Parse(_)));

        let err = EngineError::validation("missing field");
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_not_found_enumerates_names() {
        let err = EngineError::SkillNotFound {
            name: "baz".to_string(),
            available: vec!["bar".to_string(), "foo".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("baz"));
        assert!(msg.contains("bar"));
        assert!(msg.contains("foo"));
    }

    #[test]
    fn test_timeout_message() {
        let err = EngineError::Timeout {
            duration: Duration::from_secs(300),
        };
        assert!(err.to_string().contains("300s"));
    }
}
