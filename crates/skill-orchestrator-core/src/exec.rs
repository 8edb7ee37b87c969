// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: Apache-2.0

//! Subprocess plumbing shared by steps, verification probes and rollback.
//!
//! Every scriptable unit of work runs in a child process with captured
//! stdout/stderr, a hard timeout and cancellation support. Children are
//! spawned with `kill_on_drop` so an abandoned wait (timeout or
//! cancellation) tears the process down rather than leaking it.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};

/// Captured output of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// True when the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[cfg(unix)]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(windows)]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(cmd);
    command
}

/// Run a shell command. The shell is deliberate: step authors rely on
/// pipes and redirects.
pub async fn run_shell(
    cmd: &str,
    cwd: Option<&Path>,
    env: &HashMap<String, String>,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput> {
    run_command(shell_command(cmd), cwd, env, limit, cancel).await
}

/// Run code under an interpreter (`<bin> -c <code>`), as a child process
/// with the same capture and timeout semantics as `run_shell`.
pub async fn run_interpreter(
    bin: &str,
    code: &str,
    cwd: Option<&Path>,
    env: &HashMap<String, String>,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput> {
    let mut command = Command::new(bin);
    command.arg("-c").arg(code);
    run_command(command, cwd, env, limit, cancel).await
}

async fn run_command(
    mut command: Command,
    cwd: Option<&Path>,
    env: &HashMap<String, String>,
    limit: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput> {
    command
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let child = command.spawn()?;

    tokio::select! {
        _ = cancel.cancelled() => Err(EngineError::Interrupted),
        waited = timeout(limit, child.wait_with_output()) => match waited {
            Err(_) => Err(EngineError::Timeout { duration: limit }),
            Ok(output) => {
                let output = output?;
                Ok(CommandOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[tokio::test]
    async fn test_run_shell_captures_stdout() {
        let cancel = CancellationToken::new();
        let out = run_shell("echo hello", None, &no_env(), Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_shell_nonzero_exit() {
        let cancel = CancellationToken::new();
        let out = run_shell(
            "echo oops >&2; exit 3",
            None,
            &no_env(),
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_run_shell_env_overlay() {
        let cancel = CancellationToken::new();
        let mut env = no_env();
        env.insert("DEPLOY_TARGET".to_string(), "stage".to_string());
        let out = run_shell(
            "echo $DEPLOY_TARGET",
            None,
            &env,
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(out.stdout.trim(), "stage");
    }

    #[tokio::test]
    async fn test_run_shell_timeout() {
        let cancel = CancellationToken::new();
        let result = run_shell("sleep 5", None, &no_env(), Duration::from_millis(200), &cancel).await;
        assert!(matches!(result, Err(EngineError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_run_shell_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_shell("sleep 5", None, &no_env(), Duration::from_secs(10), &cancel).await;
        assert!(matches!(result, Err(EngineError::Interrupted)));
    }

    #[tokio::test]
    async fn test_run_shell_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let out = run_shell("pwd", Some(dir.path()), &no_env(), Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        let reported = std::path::PathBuf::from(out.stdout.trim()).canonicalize().unwrap();
        assert_eq!(reported, dir.path().canonicalize().unwrap());
    }
}
