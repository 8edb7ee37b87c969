// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Persisted per-execution skill log.
//!
//! Every skill execution that reaches the finalize stage writes one JSON
//! document under `outputs/skill_logs/`, success or not. Inputs are
//! redacted before they land on disk and captured step output is truncated
//! to keep logs bounded.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;
use crate::skill::Probe;

/// Maximum characters of captured stdout persisted per step.
pub const OUTPUT_TRUNCATE_CHARS: usize = 1_000;

/// One step entry in the persisted log. Records the final attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    /// `success` or `failed`.
    pub status: String,
    pub duration_ms: u64,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retries_used: u32,
}

/// The complete execution log document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    /// Unique id of this execution.
    pub run_id: Uuid,
    /// ISO-8601 start timestamp.
    pub timestamp: String,
    pub skill: String,
    pub version: String,
    pub autonomy: String,
    /// Inputs after defaulting, with sensitive values redacted.
    pub inputs: Value,
    pub dry_run: bool,
    pub steps: Vec<StepLogEntry>,
    /// `{"status": "passed"}` when all verification probes passed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Value>,
    /// The probe that failed verification, when one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_failed: Option<Probe>,
    pub success: bool,
    pub total_duration_ms: u64,
    pub steps_completed: Vec<String>,
    pub steps_failed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionLog {
    /// Start a log document for one execution. Inputs must already be
    /// redacted by the caller.
    pub fn begin(
        skill: &str,
        version: &str,
        autonomy: &str,
        redacted_inputs: Value,
        dry_run: bool,
        started: DateTime<Local>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            timestamp: started.to_rfc3339(),
            skill: skill.to_string(),
            version: version.to_string(),
            autonomy: autonomy.to_string(),
            inputs: redacted_inputs,
            dry_run,
            steps: Vec::new(),
            verification: None,
            verification_failed: None,
            success: false,
            total_duration_ms: 0,
            steps_completed: Vec::new(),
            steps_failed: Vec::new(),
            error: None,
        }
    }

    /// Write the log under `dir` as `<skill>_<YYYYmmdd_HHMMSS>.json`.
    pub fn write(&self, dir: &Path, started: DateTime<Local>) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let file = dir.join(format!(
            "{}_{}.json",
            self.skill,
            started.format("%Y%m%d_%H%M%S")
        ));
        fs::write(&file, serde_json::to_string_pretty(self)?)?;
        Ok(file)
    }
}

/// Truncate captured output to the persistence limit, on a character
/// boundary so multi-byte UTF-8 stays intact.
pub fn truncate_output(output: &str) -> String {
    if output.chars().count() <= OUTPUT_TRUNCATE_CHARS {
        output.to_string()
    } else {
        output.chars().take(OUTPUT_TRUNCATE_CHARS).collect()
    }
}
