// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Prerequisite and verification probes.
//!
//! Probes are the declarative predicates a skill uses to gate execution
//! (`pre_requisites`) and to prove success afterwards (`verification`).
//! Prerequisite probes are environmental checks and never spawn a shell;
//! verification probes may run an interpolated shell command.
//!
//! An unknown tag evaluates false with a descriptive message: a spec that
//! asks for a check this engine cannot perform must not pass it.

use serde_json::{Map, Value};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::exec;
use crate::guard::Interpolator;
use crate::skill::Probe;

/// Timeout applied to `bash` verification probes.
const VERIFY_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of a single probe evaluation.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub passed: bool,
    pub detail: String,
}

impl ProbeReport {
    fn pass(detail: impl Into<String>) -> Self {
        Self { passed: true, detail: detail.into() }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self { passed: false, detail: detail.into() }
    }

    fn check(passed: bool, detail: impl Into<String>) -> Self {
        Self { passed, detail: detail.into() }
    }
}

/// Resolve an executable name against the search path without a shell.
fn command_on_path(name: &str) -> bool {
    if name.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(name).is_file();
    }

    let Some(paths) = env::var_os("PATH") else {
        return false;
    };

    for dir in env::split_paths(&paths) {
        if dir.join(name).is_file() {
            return true;
        }
        #[cfg(windows)]
        for ext in ["exe", "cmd", "bat"] {
            if dir.join(format!("{name}.{ext}")).is_file() {
                return true;
            }
        }
    }

    false
}

fn resolve(base: &Path, candidate: &str) -> PathBuf {
    let candidate = Path::new(candidate);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

/// Evaluate a prerequisite probe. Purely environmental; no subprocess.
pub fn check_prereq(probe: &Probe, base: &Path) -> ProbeReport {
    let arg = probe.args.first().map(String::as_str);

    match probe.check.as_str() {
        "command_exists" => match arg {
            Some(cmd) => ProbeReport::check(command_on_path(cmd), format!("Command '{cmd}' exists")),
            None => ProbeReport::fail("command_exists requires an argument"),
        },
        "file_exists" => match arg {
            Some(path) => ProbeReport::check(
                resolve(base, path).is_file(),
                format!("File '{path}' exists"),
            ),
            None => ProbeReport::fail("file_exists requires an argument"),
        },
        "dir_exists" => match arg {
            Some(path) => ProbeReport::check(
                resolve(base, path).is_dir(),
                format!("Directory '{path}' exists"),
            ),
            None => ProbeReport::fail("dir_exists requires an argument"),
        },
        "env_var_set" => match arg {
            Some(var) => ProbeReport::check(
                env::var_os(var).is_some(),
                format!("Env var '{var}' is set"),
            ),
            None => ProbeReport::fail("env_var_set requires an argument"),
        },
        other => ProbeReport::fail(format!("Unknown check type: {other}")),
    }
}

/// Evaluate a verification probe after all steps have succeeded.
pub async fn verify(
    probe: &Probe,
    inputs: &Map<String, Value>,
    base: &Path,
    interpolator: &Interpolator,
    cancel: &CancellationToken,
) -> ProbeReport {
    match probe.check.as_str() {
        "bash" => {
            let Some(template) = probe.cmd.as_deref() else {
                return ProbeReport::fail("bash verification requires a cmd");
            };
            let cmd = match interpolator.render(template, inputs) {
                Ok(cmd) => cmd,
                Err(e) => return ProbeReport::fail(format!("Missing input for verification: {e}")),
            };
            match exec::run_shell(
                &cmd,
                Some(base),
                &std::collections::HashMap::new(),
                VERIFY_TIMEOUT,
                cancel,
            )
            .await
            {
                Ok(out) => {
                    let code = out.exit_code.unwrap_or(-1);
                    ProbeReport::check(code == probe.expect_exit, format!("Exit code: {code}"))
                }
                Err(e) => ProbeReport::fail(format!("Verification command failed: {e}")),
            }
        }
        "file_exists" => match self::templated_path(probe, inputs, base, interpolator) {
            Ok(path) => ProbeReport::check(path.is_file(), format!("File exists: {}", path.display())),
            Err(detail) => ProbeReport::fail(detail),
        },
        "dir_exists" => match self::templated_path(probe, inputs, base, interpolator) {
            Ok(path) => {
                ProbeReport::check(path.is_dir(), format!("Directory exists: {}", path.display()))
            }
            Err(detail) => ProbeReport::fail(detail),
        },
        "json_valid" => match self::templated_path(probe, inputs, base, interpolator) {
            Ok(path) => match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<Value>(&content) {
                    Ok(_) => ProbeReport::pass(format!("Valid JSON: {}", path.display())),
                    Err(e) => ProbeReport::fail(format!("Invalid JSON: {e}")),
                },
                Err(e) => ProbeReport::fail(format!("Invalid JSON: {e}")),
            },
            Err(detail) => ProbeReport::fail(detail),
        },
        other => ProbeReport::fail(format!("Unknown verification type: {other}")),
    }
}

fn templated_path(
    probe: &Probe,
    inputs: &Map<String, Value>,
    base: &Path,
    interpolator: &Interpolator,
) -> std::result::Result<PathBuf, String> {
    let Some(template) = probe.path.as_deref() else {
        return Err(format!("{} verification requires a path", probe.check));
    };
    interpolator
        .render(template, inputs)
        .map(|rendered| resolve(base, &rendered))
        .map_err(|e| format!("Missing input for verification: {e}"))
}
