//! Step execution.
//!
//! Directory changes are resolved in the sandbox (`cd <target> && pwd -P`)
//! and the printed path becomes the working directory of record. Everything
//! else runs as-is in the current working directory.

use tracing::{debug, info, warn};

use super::intent::{contains_metacharacter, navigation_target};
use super::types::ExecutionResult;
use crate::sandbox::{quote, ExecOutput, SandboxExecutor};

#[derive(Clone, Copy)]
pub struct StepExecutor<'a> {
    sandbox: &'a dyn SandboxExecutor,
}

impl<'a> StepExecutor<'a> {
    pub fn new(sandbox: &'a dyn SandboxExecutor) -> Self {
        Self { sandbox }
    }

    pub async fn execute(&self, command: &str, working_directory: &str) -> ExecutionResult {
        match navigation_target(command) {
            Some(target) => self.change_directory(command, target, working_directory).await,
            None => self.run_command(command, working_directory).await,
        }
    }

    async fn change_directory(
        &self,
        command: &str,
        target: &str,
        working_directory: &str,
    ) -> ExecutionResult {
        if contains_metacharacter(target) {
            // Malformed navigation is a no-op, not a failure: the plan can
            // still re-navigate later.
            warn!("Rejected directory change with shell metacharacters: {command:?}");
            return ExecutionResult {
                success: true,
                new_working_directory: working_directory.to_string(),
                stdout: String::new(),
                stderr: format!("directory change ignored, unsafe target: {target}"),
                exit_code: 0,
                failed_command: None,
            };
        }

        let output = match navigation_script(target) {
            Some(script) => self.sandbox.run(&script, working_directory).await,
            None => ExecOutput::failed(1, format!("cannot quote directory target: {target:?}")),
        };

        let resolved = output.stdout.lines().last().map(str::trim).unwrap_or("");
        if output.succeeded() && !resolved.is_empty() {
            if resolved == working_directory {
                debug!("Directory unchanged: {working_directory}");
            } else {
                info!("Directory changed: {working_directory} → {resolved}");
            }
            return ExecutionResult {
                success: true,
                new_working_directory: resolved.to_string(),
                stdout: output.stdout.clone(),
                stderr: output.stderr,
                exit_code: 0,
                failed_command: None,
            };
        }

        let stderr = if output.stderr.is_empty() && output.succeeded() {
            "directory change did not report a resolved path".to_string()
        } else {
            output.stderr
        };
        warn!("Directory change failed: {command} ({stderr})");
        ExecutionResult {
            success: false,
            new_working_directory: working_directory.to_string(),
            stdout: output.stdout,
            stderr,
            exit_code: if output.exit_code == 0 { 1 } else { output.exit_code },
            failed_command: Some(command.to_string()),
        }
    }

    async fn run_command(&self, command: &str, working_directory: &str) -> ExecutionResult {
        let output = self.sandbox.run(command, working_directory).await;
        let success = output.succeeded();
        if success {
            if !output.stderr.is_empty() {
                debug!("Command succeeded with stderr output: {}", output.stderr);
            }
        } else {
            warn!("Command failed (exit {}): {command}", output.exit_code);
        }
        ExecutionResult {
            success,
            new_working_directory: working_directory.to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            failed_command: (!success).then(|| command.to_string()),
        }
    }
}

/// Script that changes to `target` and prints the resolved path.
///
/// `~` and `~/...` go through `$HOME`, since a quoted tilde is literal.
fn navigation_script(target: &str) -> Option<String> {
    let home_relative = match target {
        "" | "~" => return Some("cd && pwd -P".to_string()),
        _ => target.strip_prefix("~/"),
    };
    match home_relative {
        Some(rest) if rest.is_empty() => Some("cd && pwd -P".to_string()),
        Some(rest) => quote(&unquote(rest)).map(|r| format!("cd \"$HOME\"/{r} && pwd -P")),
        None => quote(&unquote(target)).map(|t| format!("cd {t} && pwd -P")),
    }
}

/// `"my dir"` → `my dir`; anything that is not exactly one shell word is
/// used verbatim.
fn unquote(target: &str) -> String {
    match shlex::split(target) {
        Some(words) if words.len() == 1 => words.into_iter().next().unwrap_or_default(),
        _ => target.to_string(),
    }
}
