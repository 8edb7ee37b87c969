// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Workflow state persistence.
//!
//! State is written when a workflow pauses at a checkpoint, fails or is
//! cancelled, and deleted when the same workflow later completes
//! successfully. The file is the resume point: while it says `paused`,
//! `current_phase_index` is the next phase to run.

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

use crate::error::Result;

/// Workflow execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Workflow has not started.
    Pending,
    /// Workflow is currently running.
    InProgress,
    /// Workflow is paused at a checkpoint.
    Paused,
    /// Workflow completed successfully.
    Completed,
    /// Workflow failed.
    Failed,
    /// Workflow was cancelled by the host.
    Cancelled,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid workflow status: {s}")),
        }
    }
}

/// Persistent snapshot of a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_name: String,
    pub version: String,
    pub status: WorkflowStatus,
    /// Index of the next phase to execute when `status == paused`.
    pub current_phase_index: usize,
    /// Inputs at snapshot time, redacted before persistence.
    pub inputs: Value,
    pub phases_completed: Vec<String>,
    pub phases_failed: Vec<String>,
    /// Per-phase `{success, outputs}` records.
    pub phase_outputs: Map<String, Value>,
    /// ISO-8601 timestamps.
    pub started_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl WorkflowState {
    /// Create an in-progress state snapshot at workflow start.
    pub fn begin(workflow_name: &str, version: &str, started_at: String) -> Self {
        Self {
            workflow_name: workflow_name.to_string(),
            version: version.to_string(),
            status: WorkflowStatus::InProgress,
            current_phase_index: 0,
            inputs: Value::Object(Map::new()),
            phases_completed: Vec::new(),
            phases_failed: Vec::new(),
            phase_outputs: Map::new(),
            started_at: started_at.clone(),
            updated_at: started_at,
            error: None,
        }
    }
}

/// File-backed store for workflow state.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the state file for a workflow name.
    pub fn path_for(&self, workflow_name: &str) -> PathBuf {
        self.dir.join(format!("{workflow_name}_state.json"))
    }

    /// Persist the state, stamping `updated_at`.
    pub fn save(&self, state: &mut WorkflowState) -> Result<PathBuf> {
        state.updated_at = Local::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&state.workflow_name);
        fs::write(&path, serde_json::to_string_pretty(state)?)?;
        Ok(path)
    }

    /// Load the persisted state for a workflow, if any.
    pub fn load(&self, workflow_name: &str) -> Option<WorkflowState> {
        let path = self.path_for(workflow_name);
        if !path.is_file() {
            return None;
        }
        match fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "Failed to load workflow state");
                None
            }
        }
    }

    /// Remove the state file after successful completion. Idempotent.
    pub fn clear(&self, workflow_name: &str) -> Result<()> {
        let path = self.path_for(workflow_name);
        if path.is_file() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Whether a state file currently exists for the workflow.
    pub fn exists(&self, workflow_name: &str) -> bool {
        self.path_for(workflow_name).is_file()
    }
}
