// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Workflow definition types.
//!
//! A workflow composes skills into an ordered phase sequence with
//! per-phase conditions, checkpoints and failure policies.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::{EngineError, Result};
use crate::skill::InputSpec;

/// Declarative condition guarding a phase. Unknown tags evaluate true so a
/// newer spec degrades to "always run" on an older engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// True when the named input equals the given value.
    InputEquals { key: String, value: Value },
    /// True when the named input is truthy.
    InputTruthy { key: String },
    /// True when the named phase completed successfully.
    PreviousSuccess { key: String },
    /// True when the templated path exists on disk.
    FileExists { path: String },
    /// Permissive default for tags this engine does not know.
    #[serde(other)]
    Unknown,
}

/// What the orchestrator does when a phase fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Persist state and return failure immediately.
    #[default]
    Stop,
    /// Stop executing further phases but return the aggregate result.
    SkipRemaining,
    /// Record the failure and keep going.
    Continue,
}

/// Completion hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnComplete {
    /// Whether to append an execution block to `PROJECT_CONTEXT.md`.
    #[serde(default = "default_true")]
    pub update_context: bool,
}

impl Default for OnComplete {
    fn default() -> Self {
        Self { update_context: true }
    }
}

fn default_true() -> bool {
    true
}

/// One skill invocation within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    /// Unique phase name within the workflow.
    pub name: String,

    /// Name of the skill to execute; resolved against the skill registry.
    pub skill: String,

    /// Inputs overlaid on the workflow inputs for this phase.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub inputs: Map<String, Value>,

    /// Condition deciding whether the phase runs at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    /// Whether to pause at a checkpoint after this phase succeeds.
    #[serde(default)]
    pub checkpoint: bool,

    /// Message shown at the checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_message: Option<String>,

    /// Failure policy.
    #[serde(default)]
    pub on_failure: OnFailure,
}

/// A complete workflow definition. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow name; the registry key.
    pub name: String,

    /// Workflow version (semantic versioning).
    pub version: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Declared inputs, in declaration order. Same shape as skill inputs.
    #[serde(default)]
    pub inputs: IndexMap<String, InputSpec>,

    /// Ordered phase sequence.
    #[serde(default)]
    pub phases: Vec<Phase>,

    /// Completion hooks.
    #[serde(default)]
    pub on_complete: OnComplete,

    /// File the workflow was loaded from; stamped by the registry.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Workflow {
    /// Parse a workflow from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::parse(e.to_string()))
    }

    /// Get a phase by name.
    pub fn get_phase(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(EngineError::validation("Workflow name must not be empty"));
        }

        let mut seen = std::collections::HashSet::new();
        for phase in &self.phases {
            if !seen.insert(&phase.name) {
                return Err(EngineError::validation(format!(
                    "Duplicate phase name: {}",
                    phase.name
                )));
            }
            if phase.skill.is_empty() {
                return Err(EngineError::validation(format!(
                    "Phase '{}' must name a skill",
                    phase.name
                )));
            }
        }

        Ok(())
    }
}
