// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Engine configuration.
//!
//! All filesystem layout decisions live here: where skills and workflows are
//! discovered, where execution logs and resumable state are written, and
//! which interpreter backs `python` steps. The base path is captured at
//! construction; it is never a process-wide singleton.

use std::env;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the default base path.
pub const WORKSPACE_ENV_VAR: &str = "AGENT_WORKSPACE";

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base path under which all skill assets, logs and state live.
    /// Subprocess working directories must resolve inside it.
    pub base_path: PathBuf,

    /// Directory of skill definitions, relative to the base path.
    /// Each subdirectory holds one `skill.json`.
    pub skills_dir: String,

    /// Directory of workflow definitions (`*.json`), relative to the base path.
    pub workflows_dir: String,

    /// Directory holding JSON Schema documents, relative to the base path.
    pub schemas_dir: String,

    /// Directory for per-execution skill logs, relative to the base path.
    pub log_dir: String,

    /// Directory for resumable workflow state files, relative to the base path.
    pub state_dir: String,

    /// Interpreter used for `python` steps. Always run as a child process.
    pub python_bin: String,
}

impl EngineConfig {
    /// Create a configuration rooted at an explicit base path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            skills_dir: "SKILLS".to_string(),
            workflows_dir: "WORKFLOWS".to_string(),
            schemas_dir: "schemas".to_string(),
            log_dir: "outputs/skill_logs".to_string(),
            state_dir: "outputs/workflow_state".to_string(),
            python_bin: "python3".to_string(),
        }
    }

    /// Create a configuration from the environment.
    ///
    /// The base path is `$AGENT_WORKSPACE` when set, else the current
    /// working directory.
    pub fn from_env() -> Self {
        let base = env::var_os(WORKSPACE_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        Self::new(base)
    }

    /// Override the Python interpreter used for `python` steps.
    pub fn with_python_bin(mut self, bin: impl Into<String>) -> Self {
        self.python_bin = bin.into();
        self
    }

    /// Absolute directory of skill definitions.
    pub fn skills_path(&self) -> PathBuf {
        self.base_path.join(&self.skills_dir)
    }

    /// Absolute directory of workflow definitions.
    pub fn workflows_path(&self) -> PathBuf {
        self.base_path.join(&self.workflows_dir)
    }

    /// Path of the skill JSON Schema document.
    pub fn skill_schema_path(&self) -> PathBuf {
        self.base_path.join(&self.schemas_dir).join("skill-schema.json")
    }

    /// Path of the workflow JSON Schema document.
    pub fn workflow_schema_path(&self) -> PathBuf {
        self.base_path.join(&self.schemas_dir).join("workflow-schema.json")
    }

    /// Absolute directory for execution logs.
    pub fn log_path(&self) -> PathBuf {
        self.base_path.join(&self.log_dir)
    }

    /// Absolute directory for workflow state files.
    pub fn state_path(&self) -> PathBuf {
        self.base_path.join(&self.state_dir)
    }

    /// Resolve a possibly-relative path against the base path.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let config = EngineConfig::new("/workspace");
        assert_eq!(config.skills_path(), PathBuf::from("/workspace/SKILLS"));
        assert_eq!(config.workflows_path(), PathBuf::from("/workspace/WORKFLOWS"));
        assert_eq!(
            config.skill_schema_path(),
            PathBuf::from("/workspace/schemas/skill-schema.json")
        );
        assert_eq!(config.log_path(), PathBuf::from("/workspace/outputs/skill_logs"));
        assert_eq!(
            config.state_path(),
            PathBuf::from("/workspace/outputs/workflow_state")
        );
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = EngineConfig::new("/workspace");
        assert_eq!(config.resolve("sub/dir"), PathBuf::from("/workspace/sub/dir"));
        assert_eq!(config.resolve("/elsewhere"), PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_python_bin_override() {
        let config = EngineConfig::new("/workspace").with_python_bin("python3.12");
        assert_eq!(config.python_bin, "python3.12");
    }
}
