// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Skill execution engine.
//!
//! `SkillRunner` drives one skill to success-or-failure with strict
//! enforcement: the skill must exist in the registry, prerequisites gate
//! every step, steps run sequentially with per-step retries, verification
//! decides the final verdict, and an unrecoverable step failure triggers
//! declaration-order rollback. Every execution that gets past input
//! validation persists a JSON log, success or not.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::callback::{value_truthy, AgentCallback, CallbackError, CallbackVerb};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::exec;
use crate::execution_log::{truncate_output, ExecutionLog, StepLogEntry};
use crate::guard::{self, Interpolator};
use crate::probes;
use crate::registry::SkillRegistry;
use crate::retry::RetryPolicy;
use crate::skill::{Skill, Step, StepType};

/// Delay between step retry attempts.
const STEP_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Timeout applied to each rollback command.
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Error recorded when the host cancels an execution.
const INTERRUPTED_BY_USER: &str = "Interrupted by user";

/// Result of a single step execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retries_used: u32,
}

impl StepResult {
    fn success(step_id: &str, output: impl Into<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            success: true,
            output: output.into(),
            duration_ms: 0,
            error: None,
            retries_used: 0,
        }
    }

    fn failure(step_id: &str, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            success: false,
            output: String::new(),
            duration_ms: 0,
            error: Some(error.into()),
            retries_used: 0,
        }
    }
}

/// Result of a complete skill execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResult {
    pub success: bool,
    pub skill_name: String,
    pub version: String,
    pub steps_completed: Vec<String>,
    pub steps_failed: Vec<String>,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Reserved carrier for per-skill structured returns; not populated yet.
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

impl SkillResult {
    fn failure(skill_name: &str, version: &str, error: String) -> Self {
        Self {
            success: false,
            skill_name: skill_name.to_string(),
            version: version.to_string(),
            steps_completed: Vec::new(),
            steps_failed: Vec::new(),
            total_duration_ms: 0,
            log_file: None,
            error: Some(error),
            outputs: Map::new(),
        }
    }
}

/// Executes skills from the registry with strict enforcement.
pub struct SkillRunner {
    config: EngineConfig,
    registry: SkillRegistry,
    interpolator: Interpolator,
    cancel: CancellationToken,
}

impl SkillRunner {
    /// Load the skill registry and build a runner.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let registry = SkillRegistry::load(&config)?;
        Ok(Self {
            config,
            registry,
            interpolator: Interpolator::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Attach a host cancellation token.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    /// Sorted list of available skills.
    pub fn list_skills(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Detailed record of a skill, if loaded.
    pub fn skill_info(&self, name: &str) -> Option<Skill> {
        self.registry.get(name)
    }

    /// Reload the skill registry from disk.
    pub fn reload(&self) -> Result<()> {
        self.registry.reload()
    }

    /// Execute a skill end-to-end.
    ///
    /// Never returns `Err`: every failure mode is folded into the
    /// `SkillResult`, including host cancellation.
    pub async fn execute_skill(
        &self,
        skill_name: &str,
        mut inputs: Map<String, Value>,
        agent_callback: Option<&dyn AgentCallback>,
        dry_run: bool,
    ) -> SkillResult {
        let started = Local::now();
        let t0 = Instant::now();

        // The skill must exist; the caller gets the full enumeration so a
        // hallucinated name is immediately visible.
        let Some(skill) = self.registry.get(skill_name) else {
            let err = EngineError::SkillNotFound {
                name: skill_name.to_string(),
                available: self.registry.names(),
            };
            error!("SKILL NOT FOUND: '{skill_name}'");
            return SkillResult::failure(skill_name, "unknown", err.to_string());
        };

        info!(
            skill = %skill.name,
            version = %skill.version,
            autonomy = %skill.autonomy,
            "Executing skill"
        );

        // Input validation happens before any side effect.
        if let Err(e) = validate_inputs(&skill, &inputs) {
            return SkillResult::failure(&skill.name, &skill.version, e.to_string());
        }
        apply_defaults(&skill, &mut inputs);

        let mut log = ExecutionLog::begin(
            &skill.name,
            &skill.version,
            &skill.autonomy.to_string(),
            Value::Object(guard::redact_inputs(&inputs)),
            dry_run,
            started,
        );
        let mut steps_completed: Vec<String> = Vec::new();
        let mut steps_failed: Vec<String> = Vec::new();

        // Pre-requisites gate everything; nothing has run yet, so failure
        // needs no rollback.
        for prereq in &skill.pre_requisites {
            let report = probes::check_prereq(prereq, &self.config.base_path);
            if !report.passed {
                let error_msg = prereq.error_message.clone().unwrap_or_else(|| {
                    format!("Pre-requisite failed: {} ({})", prereq.check, report.detail)
                });
                error!(check = %prereq.check, "{error_msg}");
                return self.finalize(
                    &mut log,
                    started,
                    t0,
                    &skill,
                    steps_completed,
                    steps_failed,
                    false,
                    Some(error_msg),
                );
            }
            info!(check = %prereq.check, args = ?prereq.args, "Pre-requisite passed");
        }

        // Documentation preload is best-effort; a failing host hook must
        // not take the execution down.
        if !skill.context7_required.is_empty() {
            info!(libs = ?skill.context7_required, "Loading documentation libraries");
            if let (Some(callback), false) = (agent_callback, dry_run) {
                let payload = json!({ "libs": skill.context7_required });
                match self.invoke(callback, CallbackVerb::UseContext7, payload).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "Context7 callback failed"),
                    Err(_) => {
                        return self.finalize(
                            &mut log,
                            started,
                            t0,
                            &skill,
                            steps_completed,
                            steps_failed,
                            false,
                            Some(INTERRUPTED_BY_USER.to_string()),
                        )
                    }
                }
            }
        }

        if dry_run {
            info!("[DRY RUN] Skipping execution");
            return SkillResult {
                success: true,
                skill_name: skill.name.clone(),
                version: skill.version.clone(),
                steps_completed: vec!["(dry run)".to_string()],
                steps_failed: Vec::new(),
                total_duration_ms: t0.elapsed().as_millis() as u64,
                log_file: None,
                error: None,
                outputs: Map::new(),
            };
        }

        // Steps run strictly in declaration order; a step only starts once
        // its predecessor reached a terminal outcome.
        let total_steps = skill.steps.len();
        for (index, step) in skill.steps.iter().enumerate() {
            info!(
                step = index + 1,
                of = total_steps,
                step_id = %step.id,
                step_type = %step.step_type,
                "Executing step"
            );

            let result = match self.run_step_with_retry(step, &inputs, agent_callback).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Execution interrupted by user");
                    return self.finalize(
                        &mut log,
                        started,
                        t0,
                        &skill,
                        steps_completed,
                        steps_failed,
                        false,
                        Some(INTERRUPTED_BY_USER.to_string()),
                    );
                }
            };

            log.steps.push(StepLogEntry {
                id: step.id.clone(),
                step_type: step.step_type.to_string(),
                status: if result.success { "success" } else { "failed" }.to_string(),
                duration_ms: result.duration_ms,
                output: truncate_output(&result.output),
                error: result.error.clone(),
                retries_used: result.retries_used,
            });

            if !result.success {
                error!(step_id = %step.id, error = ?result.error, "Step failed");
                steps_failed.push(step.id.clone());

                if !skill.rollback.is_empty() {
                    self.run_rollback(&skill, &steps_completed, &inputs).await;
                }

                let error_msg = format!(
                    "Step '{}' failed: {}",
                    step.id,
                    result.error.as_deref().unwrap_or("unknown error")
                );
                return self.finalize(
                    &mut log,
                    started,
                    t0,
                    &skill,
                    steps_completed,
                    steps_failed,
                    false,
                    Some(error_msg),
                );
            }

            steps_completed.push(step.id.clone());
            info!(step_id = %step.id, duration_ms = result.duration_ms, "Step succeeded");
        }

        // Verification decides success. It reflects reality outside the
        // engine, so a failure here is surfaced as-is with no rollback.
        for (index, probe) in skill.verification.iter().enumerate() {
            let report = probes::verify(
                probe,
                &inputs,
                &self.config.base_path,
                &self.interpolator,
                &self.cancel,
            )
            .await;
            if !report.passed {
                let error_msg = probe
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Verification failed: {}", report.detail));
                error!(check = index + 1, "{error_msg}");
                log.verification_failed = Some(probe.clone());
                return self.finalize(
                    &mut log,
                    started,
                    t0,
                    &skill,
                    steps_completed,
                    steps_failed,
                    false,
                    Some(error_msg),
                );
            }
            info!(check = index + 1, "Verification passed");
        }
        log.verification = Some(json!({"status": "passed"}));

        info!(skill = %skill.name, "Skill completed");
        self.finalize(
            &mut log,
            started,
            t0,
            &skill,
            steps_completed,
            steps_failed,
            true,
            None,
        )
    }

    /// Run one step, retrying up to `step.retry` additional attempts.
    /// The returned result reflects the final attempt.
    async fn run_step_with_retry(
        &self,
        step: &Step,
        inputs: &Map<String, Value>,
        callback: Option<&dyn AgentCallback>,
    ) -> Result<StepResult> {
        let policy = RetryPolicy::fixed_delay(step.retry, STEP_RETRY_DELAY);
        let mut attempt: u32 = 0;

        loop {
            let mut result = self.dispatch_step(step, inputs, callback).await?;
            result.retries_used = attempt;

            if result.success || attempt >= step.retry {
                return Ok(result);
            }

            warn!(
                step_id = %step.id,
                error = ?result.error,
                attempt = attempt + 1,
                of = step.retry,
                "Step failed; retrying"
            );
            tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }

    /// Dispatch a step by type. Every failure except host cancellation is
    /// folded into a failed `StepResult`; cancellation is the only `Err`.
    async fn dispatch_step(
        &self,
        step: &Step,
        inputs: &Map<String, Value>,
        callback: Option<&dyn AgentCallback>,
    ) -> Result<StepResult> {
        let t0 = Instant::now();

        let outcome = match step.step_type {
            StepType::Bash => self.run_scripted(step, inputs, false).await,
            StepType::Python => self.run_scripted(step, inputs, true).await,
            StepType::Agent => self.run_agent(step, inputs, callback).await,
            StepType::Checkpoint => self.run_checkpoint(step, callback).await,
            StepType::Mcp => self.run_mcp(step, callback).await,
        };

        match outcome {
            Ok(mut result) => {
                if result.duration_ms == 0 {
                    result.duration_ms = t0.elapsed().as_millis() as u64;
                }
                Ok(result)
            }
            Err(EngineError::Interrupted) => Err(EngineError::Interrupted),
            Err(e) => {
                let mut result = StepResult::failure(&step.id, e.to_string());
                result.duration_ms = t0.elapsed().as_millis() as u64;
                Ok(result)
            }
        }
    }

    /// `bash` and `python` steps: interpolate, contain, spawn, capture.
    async fn run_scripted(
        &self,
        step: &Step,
        inputs: &Map<String, Value>,
        python: bool,
    ) -> Result<StepResult> {
        let template = step.cmd.as_deref().unwrap_or_default();
        let cmd = self.interpolator.render(template, inputs)?;

        // Containment is checked before anything is spawned.
        let cwd = if step.working_dir == "." {
            self.config.base_path.clone()
        } else {
            let rendered = self.interpolator.render(&step.working_dir, inputs)?;
            guard::resolve_contained(&self.config.base_path, &rendered)?
        };

        let limit = Duration::from_secs(step.timeout);
        let out = if python {
            exec::run_interpreter(
                &self.config.python_bin,
                &cmd,
                Some(&cwd),
                &step.env,
                limit,
                &self.cancel,
            )
            .await?
        } else {
            exec::run_shell(&cmd, Some(&cwd), &step.env, limit, &self.cancel).await?
        };

        if out.success() {
            Ok(StepResult::success(&step.id, out.stdout))
        } else {
            let error = if out.stderr.trim().is_empty() {
                match out.exit_code {
                    Some(code) => format!("Command exited with code {code}"),
                    None => "Command terminated by signal".to_string(),
                }
            } else {
                out.stderr
            };
            let mut result = StepResult::failure(&step.id, error);
            result.output = out.stdout;
            Ok(result)
        }
    }

    /// `agent` steps delegate to the host callback.
    async fn run_agent(
        &self,
        step: &Step,
        inputs: &Map<String, Value>,
        callback: Option<&dyn AgentCallback>,
    ) -> Result<StepResult> {
        let Some(callback) = callback else {
            return Ok(StepResult::failure(
                &step.id,
                EngineError::CallbackMissing { step_type: "agent".to_string() }.to_string(),
            ));
        };

        let payload = json!({ "step": step, "inputs": inputs });
        match self.invoke(callback, CallbackVerb::ExecuteStep, payload).await? {
            Ok(value) => {
                // A StepResult-shaped return passes through verbatim.
                if let Ok(passthrough) = serde_json::from_value::<StepResult>(value.clone()) {
                    return Ok(passthrough);
                }
                Ok(StepResult::success(&step.id, stringify_output(&value)))
            }
            Err(e) => Ok(StepResult::failure(
                &step.id,
                EngineError::CallbackFailed(e.to_string()).to_string(),
            )),
        }
    }

    /// `checkpoint` steps ask the host whether to continue.
    async fn run_checkpoint(
        &self,
        step: &Step,
        callback: Option<&dyn AgentCallback>,
    ) -> Result<StepResult> {
        let message = step
            .checkpoint_message
            .clone()
            .or_else(|| step.description.clone())
            .unwrap_or_else(|| "Continue?".to_string());
        info!(step_id = %step.id, "CHECKPOINT: {message}");

        let Some(callback) = callback else {
            // Non-interactive mode auto-passes.
            return Ok(StepResult::success(&step.id, "Auto-passed (no callback)"));
        };

        match self
            .invoke(callback, CallbackVerb::Checkpoint, json!({ "message": message }))
            .await?
        {
            Ok(value) => {
                if let Ok(passthrough) = serde_json::from_value::<StepResult>(value.clone()) {
                    return Ok(passthrough);
                }
                // An absent answer means continue.
                if value.is_null() || value_truthy(&value) {
                    Ok(StepResult::success(&step.id, "Checkpoint passed"))
                } else {
                    Ok(StepResult::failure(&step.id, "Checkpoint declined by agent"))
                }
            }
            Err(e) => Ok(StepResult::failure(
                &step.id,
                EngineError::CallbackFailed(e.to_string()).to_string(),
            )),
        }
    }

    /// `mcp` steps call a tool through the host callback.
    async fn run_mcp(
        &self,
        step: &Step,
        callback: Option<&dyn AgentCallback>,
    ) -> Result<StepResult> {
        let Some(callback) = callback else {
            return Ok(StepResult::failure(
                &step.id,
                EngineError::CallbackMissing { step_type: "mcp".to_string() }.to_string(),
            ));
        };

        let payload = json!({
            "server": step.mcp_server,
            "tool": step.mcp_tool,
            "args": step.mcp_args,
        });
        match self.invoke(callback, CallbackVerb::McpCall, payload).await? {
            Ok(value) => Ok(StepResult::success(&step.id, stringify_output(&value))),
            Err(e) => Ok(StepResult::failure(
                &step.id,
                EngineError::CallbackFailed(e.to_string()).to_string(),
            )),
        }
    }

    /// Invoke the host callback, racing it against cancellation.
    async fn invoke(
        &self,
        callback: &dyn AgentCallback,
        verb: CallbackVerb,
        payload: Value,
    ) -> Result<std::result::Result<Value, CallbackError>> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(EngineError::Interrupted),
            result = callback.invoke(verb, payload) => Ok(result),
        }
    }

    /// Best-effort rollback in declaration order: entries whose step
    /// completed, plus the `cleanup` entry which always runs. Failures are
    /// logged and never alter the already-failed outcome.
    async fn run_rollback(
        &self,
        skill: &Skill,
        steps_completed: &[String],
        inputs: &Map<String, Value>,
    ) {
        warn!(skill = %skill.name, "ROLLBACK: reverting changes");

        for entry in &skill.rollback {
            let applies =
                entry.id == "cleanup" || steps_completed.iter().any(|id| id == &entry.id);
            if !applies {
                continue;
            }
            info!(entry = %entry.id, "Rolling back");

            let cmd = match self.interpolator.render(&entry.cmd, inputs) {
                Ok(cmd) => cmd,
                Err(e) => {
                    error!(entry = %entry.id, error = %e, "Rollback interpolation failed");
                    continue;
                }
            };

            match exec::run_shell(
                &cmd,
                Some(&self.config.base_path),
                &HashMap::new(),
                ROLLBACK_TIMEOUT,
                &self.cancel,
            )
            .await
            {
                Ok(out) if !out.success() => {
                    error!(entry = %entry.id, code = ?out.exit_code, "Rollback command exited non-zero")
                }
                Err(e) => error!(entry = %entry.id, error = %e, "Rollback command failed"),
                Ok(_) => {}
            }
        }
    }

    /// Persist the execution log and assemble the final result.
    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        log: &mut ExecutionLog,
        started: DateTime<Local>,
        t0: Instant,
        skill: &Skill,
        steps_completed: Vec<String>,
        steps_failed: Vec<String>,
        success: bool,
        error: Option<String>,
    ) -> SkillResult {
        let total_duration_ms = t0.elapsed().as_millis() as u64;

        log.success = success;
        log.total_duration_ms = total_duration_ms;
        log.steps_completed = steps_completed.clone();
        log.steps_failed = steps_failed.clone();
        log.error = error.clone();

        let log_file = match log.write(&self.config.log_path(), started) {
            Ok(path) => {
                info!(file = %path.display(), "Execution log saved");
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "Failed to write execution log");
                None
            }
        };

        SkillResult {
            success,
            skill_name: skill.name.clone(),
            version: skill.version.clone(),
            steps_completed,
            steps_failed,
            total_duration_ms,
            log_file,
            error,
            outputs: Map::new(),
        }
    }
}

fn validate_inputs(skill: &Skill, inputs: &Map<String, Value>) -> Result<()> {
    for (name, spec) in &skill.inputs {
        if spec.required && !inputs.contains_key(name) {
            return Err(EngineError::InputInvalid(format!(
                "Missing required input: {name}"
            )));
        }
        if let (Some(value), Some(allowed)) = (inputs.get(name), spec.allowed.as_ref()) {
            if !allowed.contains(value) {
                return Err(EngineError::InputInvalid(format!(
                    "Invalid value for {name}: must be one of {}",
                    Value::Array(allowed.clone())
                )));
            }
        }
    }
    Ok(())
}

fn apply_defaults(skill: &Skill, inputs: &mut Map<String, Value>) {
    for (name, spec) in &skill.inputs {
        if !inputs.contains_key(name) {
            if let Some(default) = &spec.default {
                inputs.insert(name.clone(), default.clone());
            }
        }
    }
}

fn stringify_output(value: &Value) -> String {
    if !value_truthy(value) {
        return "OK".to_string();
    }
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    fn write_skill(base: &Path, dir_name: &str, body: Value) {
        let skill_dir = base.join("SKILLS").join(dir_name);
        fs::create_dir_all(&skill_dir).unwrap();
        fs::write(skill_dir.join("skill.json"), body.to_string()).unwrap();
    }

    fn runner_for(base: &Path) -> SkillRunner {
        SkillRunner::new(EngineConfig::new(base)).unwrap()
    }

    fn inputs(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_skill_enumerates_available() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "foo",
            json!({"name": "foo", "version": "1.0", "autonomy": "delegado", "steps": []}),
        );
        write_skill(
            dir.path(),
            "bar",
            json!({"name": "bar", "version": "1.0", "autonomy": "delegado", "steps": []}),
        );

        let runner = runner_for(dir.path());
        let result = runner.execute_skill("baz", Map::new(), None, false).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("baz"));
        // Sorted enumeration: bar before foo.
        let bar_at = error.find("bar").unwrap();
        let foo_at = error.find("foo").unwrap();
        assert!(bar_at < foo_at);
    }

    #[tokio::test]
    async fn test_required_input_missing_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "needs-input",
            json!({
                "name": "needs-input",
                "version": "1.0",
                "autonomy": "delegado",
                "inputs": {"project": {"required": true}},
                "steps": [{"id": "touch", "type": "bash", "cmd": "touch ran.txt"}]
            }),
        );

        let runner = runner_for(dir.path());
        let result = runner
            .execute_skill("needs-input", Map::new(), None, false)
            .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Missing required input: project"));
        assert!(result.log_file.is_none());
        assert!(!dir.path().join("ran.txt").exists());
        assert!(!dir.path().join("outputs/skill_logs").exists());
    }

    #[tokio::test]
    async fn test_enum_violation_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "enum-skill",
            json!({
                "name": "enum-skill",
                "version": "1.0",
                "autonomy": "delegado",
                "inputs": {"env": {"enum": ["stage", "prod"]}},
                "steps": []
            }),
        );

        let runner = runner_for(dir.path());
        let result = runner
            .execute_skill("enum-skill", inputs(&[("env", json!("laptop"))]), None, false)
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("must be one of"));
    }

    #[tokio::test]
    async fn test_defaults_applied_to_command_templates() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "defaulted",
            json!({
                "name": "defaulted",
                "version": "1.0",
                "autonomy": "delegado",
                "inputs": {"greeting": {"default": "hello"}},
                "steps": [{"id": "say", "type": "bash", "cmd": "echo {{greeting}} > said.txt"}]
            }),
        );

        let runner = runner_for(dir.path());
        let result = runner.execute_skill("defaulted", Map::new(), None, false).await;

        assert!(result.success, "{:?}", result.error);
        let said = fs::read_to_string(dir.path().join("said.txt")).unwrap();
        assert_eq!(said.trim(), "hello");
    }

    #[tokio::test]
    async fn test_dry_run_short_circuits_without_log() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "dry",
            json!({
                "name": "dry",
                "version": "1.0",
                "autonomy": "delegado",
                "steps": [{"id": "boom", "type": "bash", "cmd": "touch boom.txt"}]
            }),
        );

        let runner = runner_for(dir.path());
        let result = runner.execute_skill("dry", Map::new(), None, true).await;

        assert!(result.success);
        assert_eq!(result.steps_completed, vec!["(dry run)"]);
        assert!(result.log_file.is_none());
        assert!(!dir.path().join("boom.txt").exists());
    }

    #[tokio::test]
    async fn test_prereq_failure_aborts_before_steps() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "gated",
            json!({
                "name": "gated",
                "version": "1.0",
                "autonomy": "delegado",
                "pre_requisites": [
                    {"check": "file_exists", "args": ["required.txt"], "error_message": "required.txt must exist"}
                ],
                "steps": [{"id": "touch", "type": "bash", "cmd": "touch ran.txt"}]
            }),
        );

        let runner = runner_for(dir.path());
        let result = runner.execute_skill("gated", Map::new(), None, false).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("required.txt must exist"));
        assert!(result.steps_completed.is_empty());
        assert!(!dir.path().join("ran.txt").exists());
        // Prereq failures still produce a log.
        assert!(result.log_file.is_some());
    }

    #[tokio::test]
    async fn test_missing_template_input_is_step_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "holey",
            json!({
                "name": "holey",
                "version": "1.0",
                "autonomy": "delegado",
                "steps": [{"id": "use", "type": "bash", "cmd": "echo {{absent}}"}]
            }),
        );

        let runner = runner_for(dir.path());
        let result = runner.execute_skill("holey", Map::new(), None, false).await;

        assert!(!result.success);
        assert_eq!(result.steps_failed, vec!["use"]);
        assert!(result.error.unwrap().contains("Missing input"));
    }

    #[tokio::test]
    async fn test_agent_step_without_callback_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "delegating",
            json!({
                "name": "delegating",
                "version": "1.0",
                "autonomy": "delegado",
                "steps": [{"id": "ask", "type": "agent"}]
            }),
        );

        let runner = runner_for(dir.path());
        let result = runner.execute_skill("delegating", Map::new(), None, false).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("No agent callback"));
    }

    #[tokio::test]
    async fn test_checkpoint_auto_passes_without_callback() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "paused",
            json!({
                "name": "paused",
                "version": "1.0",
                "autonomy": "asistente",
                "steps": [
                    {"id": "gate", "type": "checkpoint", "checkpoint_message": "Go on?"},
                    {"id": "after", "type": "bash", "cmd": "touch after.txt"}
                ]
            }),
        );

        let runner = runner_for(dir.path());
        let result = runner.execute_skill("paused", Map::new(), None, false).await;

        assert!(result.success);
        assert_eq!(result.steps_completed, vec!["gate", "after"]);
        assert!(dir.path().join("after.txt").exists());
    }

    #[test]
    fn test_stringify_output() {
        assert_eq!(stringify_output(&json!(null)), "OK");
        assert_eq!(stringify_output(&json!(false)), "OK");
        assert_eq!(stringify_output(&json!("done")), "done");
        assert_eq!(stringify_output(&json!({"n": 1})), r#"{"n":1}"#);
    }
}
