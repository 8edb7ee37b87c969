// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Skill definition types.
//!
//! A skill is an immutable declarative record: prerequisites, an ordered
//! step sequence, post-execution verification probes and compensating
//! rollback commands. Step types form a closed tagged enum so a malformed
//! spec is rejected at load time, not mid-execution.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{EngineError, Result};

/// Autonomy level of a skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    /// Execute without confirmation.
    Delegado,
    /// Confirm before major changes.
    #[serde(rename = "co-pilot")]
    CoPilot,
    /// Confirm every step.
    Asistente,
}

impl std::fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Delegado => write!(f, "delegado"),
            Self::CoPilot => write!(f, "co-pilot"),
            Self::Asistente => write!(f, "asistente"),
        }
    }
}

/// Declaration of a single named input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    /// Declared data type (informational; values stay dynamic JSON).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,

    /// Whether the input must be provided by the caller.
    #[serde(default)]
    pub required: bool,

    /// Value applied when the caller omits the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Closed set of permitted values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Step type. Closed set: adding a tag requires a spec revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Shell command in a child process.
    Bash,
    /// Python code in a child interpreter process.
    Python,
    /// Delegated to the agent callback.
    Agent,
    /// Human-in-the-loop pause point.
    Checkpoint,
    /// MCP tool call through the agent callback.
    Mcp,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bash => write!(f, "bash"),
            Self::Python => write!(f, "python"),
            Self::Agent => write!(f, "agent"),
            Self::Checkpoint => write!(f, "checkpoint"),
            Self::Mcp => write!(f, "mcp"),
        }
    }
}

/// A single step within a skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique step identifier within the skill.
    pub id: String,

    /// Step type tag.
    #[serde(rename = "type")]
    pub step_type: StepType,

    /// Command or code template for `bash`/`python` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    /// Working directory template. `.` means the configured base path.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// Environment variables overlaid on the ambient environment.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Per-step timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Additional attempts after the first failure.
    #[serde(default)]
    pub retry: u32,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Message shown for `checkpoint` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_message: Option<String>,

    /// Target server for `mcp` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_server: Option<String>,

    /// Target tool for `mcp` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_tool: Option<String>,

    /// Tool arguments for `mcp` steps.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub mcp_args: Map<String, Value>,
}

fn default_working_dir() -> String {
    ".".to_string()
}

fn default_timeout() -> u64 {
    300
}

/// Declarative probe used for prerequisites and verification.
///
/// Prerequisites use `check` + `args`; verification probes use `type` with
/// `cmd`/`path`. Both spellings of the tag are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probe {
    /// Probe tag (`command_exists`, `file_exists`, `dir_exists`,
    /// `env_var_set`, `bash`, `json_valid`).
    #[serde(alias = "type", default = "default_probe_kind")]
    pub check: String,

    /// Positional arguments for prerequisite probes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Shell command template for `bash` verification probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,

    /// Path template for file/dir/json probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Expected exit code for `bash` verification probes.
    #[serde(default)]
    pub expect_exit: i32,

    /// Message surfaced when the probe fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn default_probe_kind() -> String {
    "bash".to_string()
}

/// A compensating action run during rollback. Always a shell command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackStep {
    /// Id of the step this entry compensates, or the literal `cleanup`
    /// which always runs.
    pub id: String,

    /// Shell command template.
    pub cmd: String,
}

/// A complete skill definition. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Unique skill name; the registry key.
    pub name: String,

    /// Skill version (semantic versioning).
    pub version: String,

    /// Autonomy level.
    pub autonomy: AutonomyLevel,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared inputs, in declaration order.
    #[serde(default)]
    pub inputs: IndexMap<String, InputSpec>,

    /// Probes that must all pass before any step runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_requisites: Vec<Probe>,

    /// Documentation libraries preloaded through the agent callback.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context7_required: Vec<String>,

    /// Ordered step sequence. Ordering is total and significant.
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Probes run after all steps succeed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification: Vec<Probe>,

    /// Compensating actions for unrecoverable step failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollback: Vec<RollbackStep>,

    /// Directory the skill was loaded from; stamped by the registry so
    /// relative assets can be resolved.
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

impl Skill {
    /// Parse a skill from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::parse(e.to_string()))
    }

    /// Get a step by id.
    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(EngineError::validation("Skill name must not be empty"));
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(&step.id) {
                return Err(EngineError::validation(format!(
                    "Duplicate step id: {}",
                    step.id
                )));
            }
            if matches!(step.step_type, StepType::Bash | StepType::Python) && step.cmd.is_none() {
                return Err(EngineError::validation(format!(
                    "Step '{}' of type {} requires a cmd",
                    step.id, step.step_type
                )));
            }
        }

        Ok(())
    }
}
