// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Workflow orchestration engine.
//!
//! `WorkflowOrchestrator` composes skills into multi-phase workflows:
//! phases run strictly in order through the `SkillRunner`, conditions can
//! skip them, checkpoints persist state and ask the host whether to go on,
//! and a paused or failed run leaves a state file behind for `resume`.

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::callback::{value_truthy, AgentCallback, CallbackVerb};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::guard::{self, Interpolator};
use crate::project_context::update_project_context;
use crate::registry::WorkflowRegistry;
use crate::runner::SkillRunner;
use crate::state::{StateStore, WorkflowState, WorkflowStatus};
use crate::workflow::{Condition, OnFailure, Workflow};

/// Result of a complete workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub workflow_name: String,
    pub version: String,
    pub status: WorkflowStatus,
    pub phases_completed: Vec<String>,
    pub phases_failed: Vec<String>,
    pub phases_skipped: Vec<String>,
    /// Phase that failed or paused, when one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    fn failure(workflow_name: &str, version: &str, status: WorkflowStatus, error: String) -> Self {
        Self {
            success: false,
            workflow_name: workflow_name.to_string(),
            version: version.to_string(),
            status,
            phases_completed: Vec::new(),
            phases_failed: Vec::new(),
            phases_skipped: Vec::new(),
            current_phase: None,
            total_duration_ms: 0,
            state_file: None,
            error: Some(error),
        }
    }
}

/// Orchestrates multi-skill workflows with state persistence and
/// checkpoints.
pub struct WorkflowOrchestrator {
    config: EngineConfig,
    registry: WorkflowRegistry,
    skill_runner: SkillRunner,
    state_store: StateStore,
    interpolator: Interpolator,
    cancel: CancellationToken,
}

impl WorkflowOrchestrator {
    /// Load both registries and build an orchestrator.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let skill_runner = SkillRunner::new(config.clone())?;
        let registry = WorkflowRegistry::load(&config, skill_runner.registry())?;
        let state_store = StateStore::new(config.state_path());
        Ok(Self {
            config,
            registry,
            skill_runner,
            state_store,
            interpolator: Interpolator::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Attach a host cancellation token, shared with the skill runner.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.skill_runner = self.skill_runner.with_cancellation_token(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn skill_runner(&self) -> &SkillRunner {
        &self.skill_runner
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state_store
    }

    /// Sorted list of available workflows.
    pub fn list_workflows(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Detailed record of a workflow, if loaded.
    pub fn workflow_info(&self, name: &str) -> Option<Workflow> {
        self.registry.get(name)
    }

    /// Reload both registries from disk.
    pub fn reload(&self) -> Result<()> {
        self.skill_runner.reload()?;
        self.registry.reload(self.skill_runner.registry())
    }

    /// Execute a workflow end-to-end.
    ///
    /// Never returns `Err`: every failure mode is folded into the
    /// `WorkflowResult`.
    pub async fn execute_workflow(
        &self,
        workflow_name: &str,
        mut inputs: Map<String, Value>,
        agent_callback: Option<&dyn AgentCallback>,
        dry_run: bool,
        resume: bool,
    ) -> WorkflowResult {
        let started = Local::now();
        let t0 = Instant::now();

        let Some(workflow) = self.registry.get(workflow_name) else {
            let err = EngineError::WorkflowNotFound {
                name: workflow_name.to_string(),
                available: self.registry.names(),
            };
            error!("WORKFLOW NOT FOUND: '{workflow_name}'");
            return WorkflowResult::failure(
                workflow_name,
                "unknown",
                WorkflowStatus::Failed,
                err.to_string(),
            );
        };

        info!(
            workflow = %workflow.name,
            version = %workflow.version,
            phases = workflow.phases.len(),
            "Executing workflow"
        );

        // Workflow input defaults, then any restored state underneath the
        // fresh inputs.
        for (name, spec) in &workflow.inputs {
            if !inputs.contains_key(name) {
                if let Some(default) = &spec.default {
                    inputs.insert(name.clone(), default.clone());
                }
            }
        }

        let mut start_phase = 0usize;
        let mut phase_outputs: Map<String, Value> = Map::new();
        let mut phases_completed: Vec<String> = Vec::new();
        let mut phases_failed: Vec<String> = Vec::new();
        let mut phases_skipped: Vec<String> = Vec::new();

        if resume {
            if let Some(saved) = self.state_store.load(workflow_name) {
                if saved.status == WorkflowStatus::Paused {
                    info!(
                        phase_index = saved.current_phase_index,
                        "Resuming workflow from saved state"
                    );
                    start_phase = saved.current_phase_index;
                    phase_outputs = saved.phase_outputs;
                    phases_completed = saved.phases_completed;
                    phases_failed = saved.phases_failed;
                    if let Value::Object(saved_inputs) = saved.inputs {
                        let mut merged = saved_inputs;
                        for (key, value) in inputs {
                            merged.insert(key, value);
                        }
                        inputs = merged;
                    }
                }
            }
        }

        let mut state =
            WorkflowState::begin(&workflow.name, &workflow.version, started.to_rfc3339());
        state.current_phase_index = start_phase;
        state.inputs = Value::Object(guard::redact_inputs(&inputs));
        state.phase_outputs = phase_outputs.clone();
        state.phases_completed = phases_completed.clone();
        state.phases_failed = phases_failed.clone();

        if dry_run {
            info!("[DRY RUN] Validating workflow");
            for (i, phase) in workflow.phases.iter().enumerate() {
                info!(phase = i + 1, name = %phase.name, skill = %phase.skill, "Would execute");
            }
            return WorkflowResult {
                success: true,
                workflow_name: workflow.name.clone(),
                version: workflow.version.clone(),
                status: WorkflowStatus::Completed,
                phases_completed: vec!["(dry run)".to_string()],
                phases_failed: Vec::new(),
                phases_skipped: Vec::new(),
                current_phase: None,
                total_duration_ms: t0.elapsed().as_millis() as u64,
                state_file: None,
                error: None,
            };
        }

        let total = workflow.phases.len();
        for (i, phase) in workflow.phases.iter().enumerate().skip(start_phase) {
            state.current_phase_index = i;
            info!(phase = i + 1, of = total, name = %phase.name, skill = %phase.skill, "Phase starting");

            if let Some(condition) = &phase.condition {
                if !self.evaluate_condition(condition, &inputs, &phase_outputs) {
                    info!(phase = %phase.name, "Skipping phase: condition not met");
                    phases_skipped.push(phase.name.clone());
                    continue;
                }
            }

            // Phase inputs overlay the workflow inputs.
            let mut phase_inputs = inputs.clone();
            for (key, value) in &phase.inputs {
                phase_inputs.insert(key.clone(), value.clone());
            }

            let skill_result = self
                .skill_runner
                .execute_skill(&phase.skill, phase_inputs, agent_callback, false)
                .await;

            phase_outputs.insert(
                phase.name.clone(),
                json!({
                    "success": skill_result.success,
                    "outputs": Value::Object(skill_result.outputs.clone()),
                }),
            );
            state.phase_outputs = phase_outputs.clone();

            if self.cancel.is_cancelled() {
                warn!("Workflow cancelled by user");
                state.status = WorkflowStatus::Cancelled;
                let state_file = self.save_state(&mut state);
                return WorkflowResult {
                    success: false,
                    workflow_name: workflow.name.clone(),
                    version: workflow.version.clone(),
                    status: WorkflowStatus::Cancelled,
                    phases_completed,
                    phases_failed,
                    phases_skipped,
                    current_phase: Some(phase.name.clone()),
                    total_duration_ms: t0.elapsed().as_millis() as u64,
                    state_file,
                    error: Some("Cancelled by user".to_string()),
                };
            }

            if !skill_result.success {
                phases_failed.push(phase.name.clone());
                state.phases_failed = phases_failed.clone();
                error!(phase = %phase.name, error = ?skill_result.error, "Phase failed");

                match phase.on_failure {
                    OnFailure::Stop => {
                        state.status = WorkflowStatus::Failed;
                        state.error = Some(format!(
                            "Phase '{}' failed: {}",
                            phase.name,
                            skill_result.error.as_deref().unwrap_or("unknown error")
                        ));
                        let state_file = self.save_state(&mut state);
                        return WorkflowResult {
                            success: false,
                            workflow_name: workflow.name.clone(),
                            version: workflow.version.clone(),
                            status: WorkflowStatus::Failed,
                            phases_completed,
                            phases_failed,
                            phases_skipped,
                            current_phase: Some(phase.name.clone()),
                            total_duration_ms: t0.elapsed().as_millis() as u64,
                            state_file,
                            error: Some(format!("Phase '{}' failed", phase.name)),
                        };
                    }
                    OnFailure::SkipRemaining => {
                        warn!("Skipping remaining phases");
                        break;
                    }
                    OnFailure::Continue => continue,
                }
            }

            phases_completed.push(phase.name.clone());
            state.phases_completed = phases_completed.clone();
            info!(phase = %phase.name, "Phase completed");

            if phase.checkpoint {
                let message = phase.checkpoint_message.clone().unwrap_or_else(|| {
                    format!("Phase '{}' completed. Continue?", phase.name)
                });
                info!(phase = %phase.name, "CHECKPOINT: {message}");

                // Persist before asking: if the process dies mid-prompt the
                // workflow resumes from the phase after this one.
                state.status = WorkflowStatus::Paused;
                state.current_phase_index = i + 1;
                let state_file = self.save_state(&mut state);
                if let Some(path) = &state_file {
                    info!(file = %path.display(), "State saved");
                }

                if let Some(callback) = agent_callback {
                    match self.invoke_checkpoint(callback, &message).await {
                        Ok(true) => {
                            state.status = WorkflowStatus::InProgress;
                        }
                        Ok(false) => {
                            return WorkflowResult {
                                success: false,
                                workflow_name: workflow.name.clone(),
                                version: workflow.version.clone(),
                                status: WorkflowStatus::Paused,
                                phases_completed,
                                phases_failed,
                                phases_skipped,
                                current_phase: Some(phase.name.clone()),
                                total_duration_ms: t0.elapsed().as_millis() as u64,
                                state_file,
                                error: Some("Paused at checkpoint".to_string()),
                            };
                        }
                        Err(e) => {
                            let (status, error) = if matches!(e, EngineError::Interrupted) {
                                (WorkflowStatus::Cancelled, "Cancelled by user".to_string())
                            } else {
                                (WorkflowStatus::Failed, e.to_string())
                            };
                            state.status = status;
                            state.error = Some(error.clone());
                            let state_file = self.save_state(&mut state);
                            return WorkflowResult {
                                success: false,
                                workflow_name: workflow.name.clone(),
                                version: workflow.version.clone(),
                                status,
                                phases_completed,
                                phases_failed,
                                phases_skipped,
                                current_phase: Some(phase.name.clone()),
                                total_duration_ms: t0.elapsed().as_millis() as u64,
                                state_file,
                                error: Some(error),
                            };
                        }
                    }
                } else {
                    // Non-interactive: state is saved, keep going.
                    state.status = WorkflowStatus::InProgress;
                }
            }
        }

        let total_duration_ms = t0.elapsed().as_millis() as u64;
        let success = phases_failed.is_empty();

        let mut result = WorkflowResult {
            success,
            workflow_name: workflow.name.clone(),
            version: workflow.version.clone(),
            status: if success {
                WorkflowStatus::Completed
            } else {
                WorkflowStatus::Failed
            },
            phases_completed,
            phases_failed,
            phases_skipped,
            current_phase: None,
            total_duration_ms,
            state_file: None,
            error: None,
        };

        if workflow.on_complete.update_context {
            update_project_context(
                &workflow.name,
                &inputs,
                &result,
                &self.config.base_path,
                &self.interpolator,
            );
        }

        if success {
            if let Err(e) = self.state_store.clear(&workflow.name) {
                warn!(error = %e, "Failed to clear workflow state");
            }
            info!(workflow = %workflow.name, duration_ms = total_duration_ms, "WORKFLOW COMPLETED");
        } else {
            state.status = WorkflowStatus::Failed;
            state.error = Some(format!(
                "Phases failed: {}",
                result.phases_failed.join(", ")
            ));
            result.state_file = self.save_state(&mut state);
            result.error = state.error.clone();
            warn!(workflow = %workflow.name, duration_ms = total_duration_ms, "WORKFLOW FINISHED WITH ERRORS");
        }

        result
    }

    /// Evaluate a phase condition against the current inputs and the
    /// accumulated phase outputs.
    fn evaluate_condition(
        &self,
        condition: &Condition,
        inputs: &Map<String, Value>,
        phase_outputs: &Map<String, Value>,
    ) -> bool {
        match condition {
            Condition::InputEquals { key, value } => inputs.get(key) == Some(value),
            Condition::InputTruthy { key } => inputs.get(key).map(value_truthy).unwrap_or(false),
            Condition::PreviousSuccess { key } => phase_outputs
                .get(key)
                .and_then(|record| record.get("success"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Condition::FileExists { path } => match self.interpolator.render(path, inputs) {
                Ok(rendered) => self.config.resolve(&rendered).exists(),
                Err(e) => {
                    warn!(error = %e, "Condition path could not be resolved");
                    false
                }
            },
            Condition::Unknown => true,
        }
    }

    /// Ask the host whether to continue past a checkpoint.
    async fn invoke_checkpoint(
        &self,
        callback: &dyn AgentCallback,
        message: &str,
    ) -> Result<bool> {
        let payload = json!({ "message": message });
        let value = tokio::select! {
            _ = self.cancel.cancelled() => return Err(EngineError::Interrupted),
            result = callback.invoke(CallbackVerb::Checkpoint, payload) => {
                result.map_err(|e| EngineError::CallbackFailed(e.to_string()))?
            }
        };
        Ok(value_truthy(&value))
    }

    fn save_state(&self, state: &mut WorkflowState) -> Option<PathBuf> {
        match self.state_store.save(state) {
            Ok(path) => Some(path),
            Err(e) => {
                error!(error = %e, "Failed to persist workflow state");
                None
            }
        }
    }
}
