// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! `PROJECT_CONTEXT.md` maintenance.
//!
//! After a workflow completes, an execution block is appended to the
//! project's context file so the next session (human or agent) sees what
//! ran. A missing or unwritable file is a warning, never a failure.

use chrono::Local;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::guard::Interpolator;
use crate::orchestrator::WorkflowResult;

const NEXT_STEPS_HEADING: &str = "## Next Steps";

/// Append a workflow execution block to `<project_path>/PROJECT_CONTEXT.md`.
///
/// The project path comes from the `target_dir` input, falling back to
/// `project_path`, then `.`; templates in the path are interpolated from
/// the inputs. The block lands just before a `## Next Steps` heading when
/// one exists, otherwise at the end of the file.
pub fn update_project_context(
    workflow_name: &str,
    inputs: &Map<String, Value>,
    result: &WorkflowResult,
    base: &Path,
    interpolator: &Interpolator,
) {
    let raw_path = inputs
        .get("target_dir")
        .or_else(|| inputs.get("project_path"))
        .and_then(|v| v.as_str())
        .unwrap_or(".")
        .to_string();

    let project_path = if raw_path.contains("{{") {
        match interpolator.render(&raw_path, inputs) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(error = %e, "Could not resolve project path template");
                return;
            }
        }
    } else {
        raw_path
    };

    let project_dir = if Path::new(&project_path).is_absolute() {
        Path::new(&project_path).to_path_buf()
    } else {
        base.join(&project_path)
    };
    let context_file = project_dir.join("PROJECT_CONTEXT.md");

    if !context_file.is_file() {
        warn!(file = %context_file.display(), "PROJECT_CONTEXT.md not found");
        return;
    }

    let timestamp = Local::now().format("%Y-%m-%d %H:%M");
    let status = if result.success { "SUCCESS" } else { "FAILED" };
    let join = |names: &[String]| {
        if names.is_empty() {
            "None".to_string()
        } else {
            names.join(", ")
        }
    };

    let block = format!(
        "\n---\n\n## Workflow Execution: {workflow_name} ({timestamp})\n\n\
         **Status:** {status}\n\
         **Phases Completed:** {}\n\
         **Phases Failed:** {}\n\
         **Duration:** {}ms\n",
        join(&result.phases_completed),
        join(&result.phases_failed),
        result.total_duration_ms,
    );

    let updated = match fs::read_to_string(&context_file) {
        Ok(content) if content.contains(NEXT_STEPS_HEADING) => content.replace(
            NEXT_STEPS_HEADING,
            &format!("{block}\n{NEXT_STEPS_HEADING}"),
        ),
        Ok(content) => content + &block,
        Err(e) => {
            warn!(file = %context_file.display(), error = %e, "Failed to read PROJECT_CONTEXT.md");
            return;
        }
    };

    match fs::write(&context_file, updated) {
        Ok(()) => info!(file = %context_file.display(), "Updated PROJECT_CONTEXT.md"),
        Err(e) => warn!(file = %context_file.display(), error = %e, "Failed to update PROJECT_CONTEXT.md"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WorkflowStatus;
    use serde_json::json;

    fn sample_result(success: bool) -> WorkflowResult {
        WorkflowResult {
            success,
            workflow_name: "release".to_string(),
            version: "1.0".to_string(),
            status: if success {
                WorkflowStatus::Completed
            } else {
                WorkflowStatus::Failed
            },
            phases_completed: vec!["build".to_string(), "deploy".to_string()],
            phases_failed: vec![],
            phases_skipped: vec![],
            current_phase: None,
            total_duration_ms: 1234,
            state_file: None,
            error: None,
        }
    }

    fn inputs(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_block_inserted_before_next_steps() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("PROJECT_CONTEXT.md");
        fs::write(&file, "# Project\n\nIntro.\n\n## Next Steps\n\n- finish\n").unwrap();

        update_project_context(
            "release",
            &inputs(&[("target_dir", json!("."))]),
            &sample_result(true),
            dir.path(),
            &Interpolator::new(),
        );

        let content = fs::read_to_string(&file).unwrap();
        let block_at = content.find("## Workflow Execution: release").unwrap();
        let next_at = content.find("## Next Steps").unwrap();
        assert!(block_at < next_at);
        assert!(content.contains("**Status:** SUCCESS"));
        assert!(content.contains("**Phases Completed:** build, deploy"));
    }

    #[test]
    fn test_block_appended_without_heading() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("PROJECT_CONTEXT.md");
        fs::write(&file, "# Project\n").unwrap();

        update_project_context(
            "release",
            &Map::new(),
            &sample_result(false),
            dir.path(),
            &Interpolator::new(),
        );

        let content = fs::read_to_string(&file).unwrap();
        assert!(content.ends_with("**Duration:** 1234ms\n"));
        assert!(content.contains("**Status:** FAILED"));
    }

    #[test]
    fn test_missing_file_is_a_warning_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        update_project_context(
            "release",
            &inputs(&[("target_dir", json!("nowhere"))]),
            &sample_result(true),
            dir.path(),
            &Interpolator::new(),
        );
        // Nothing was created.
        assert!(!dir.path().join("nowhere").exists());
    }

    #[test]
    fn test_templated_project_path() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("api");
        fs::create_dir(&project).unwrap();
        fs::write(project.join("PROJECT_CONTEXT.md"), "# API\n").unwrap();

        update_project_context(
            "release",
            &inputs(&[
                ("target_dir", json!("{{project_name}}")),
                ("project_name", json!("api")),
            ]),
            &sample_result(true),
            dir.path(),
            &Interpolator::new(),
        );

        let content = fs::read_to_string(project.join("PROJECT_CONTEXT.md")).unwrap();
        assert!(content.contains("## Workflow Execution: release"));
    }
}
