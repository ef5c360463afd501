use std::fmt;

use crate::sandbox::SandboxState;

/// One natural-language unit of a plan. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step(String);

impl Step {
    /// Trims `description`; returns `None` when nothing is left.
    pub fn new(description: impl AsRef<str>) -> Option<Self> {
        let trimmed = description.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one attempted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub new_working_directory: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Set only on failure.
    pub failed_command: Option<String>,
}

impl ExecutionResult {
    /// stderr when present, otherwise stdout; errors sometimes land on stdout.
    pub fn error_message(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Why an entry was appended to the step log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Planned,
    Recovery,
    /// The original command, re-executed after a successful recovery.
    Retry,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Planned => write!(f, "planned"),
            StepKind::Recovery => write!(f, "recovery"),
            StepKind::Retry => write!(f, "retry"),
        }
    }
}

/// One successfully executed step, kept as context for later generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step: Step,
    pub command: String,
    pub kind: StepKind,
    /// Short human-readable outcome, e.g. "changed directory to /reports".
    pub outcome: String,
    /// Captured stdout, plus stderr warnings if any.
    pub output: String,
}

impl StepResult {
    pub fn from_execution(
        step: &Step,
        command: &str,
        kind: StepKind,
        result: &ExecutionResult,
        previous_directory: &str,
    ) -> Self {
        let outcome = if result.new_working_directory != previous_directory {
            format!("changed directory to {}", result.new_working_directory)
        } else if result.stdout.is_empty() && result.stderr.is_empty() {
            "succeeded (no output)".to_string()
        } else if result.stderr.is_empty() {
            "succeeded".to_string()
        } else {
            "succeeded with warnings".to_string()
        };

        let output = match (result.stdout.is_empty(), result.stderr.is_empty()) {
            (_, true) => result.stdout.clone(),
            (true, false) => format!("[stderr] {}", result.stderr),
            (false, false) => format!("{}\n[stderr] {}", result.stdout, result.stderr),
        };

        Self {
            step: step.clone(),
            command: command.to_string(),
            kind,
            outcome,
            output,
        }
    }

    /// One-line form used in prompts and the conversation history.
    pub fn describe(&self) -> String {
        format!("{}: `{}` → {}", self.step, self.command, self.outcome)
    }
}

/// Everything the recovery oracle needs to know about a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub failed_command: String,
    pub error_message: String,
    pub exit_code: i32,
    pub failed_step: Step,
    pub working_directory: String,
    pub sandbox_state: SandboxState,
}

impl ErrorInfo {
    pub fn from_failure(
        step: &Step,
        command: &str,
        result: &ExecutionResult,
        working_directory: &str,
        sandbox_state: SandboxState,
    ) -> Self {
        Self {
            failed_command: result
                .failed_command
                .clone()
                .unwrap_or_else(|| command.to_string()),
            error_message: result.error_message().to_string(),
            exit_code: result.exit_code,
            failed_step: step.clone(),
            working_directory: working_directory.to_string(),
            sandbox_state,
        }
    }
}

/// Mutable state of one plan execution, passed explicitly through the
/// runner and the recovery controller.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// The user request the plan was made for.
    pub request: String,
    /// Sandbox working directory as last confirmed by `pwd -P`.
    pub working_directory: String,
    pub log: Vec<StepResult>,
}

impl SessionContext {
    pub fn new(request: impl Into<String>, working_directory: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            working_directory: working_directory.into(),
            log: Vec::new(),
        }
    }

    /// Records a successful execution and adopts its working directory.
    pub fn record(&mut self, step: &Step, command: &str, kind: StepKind, result: &ExecutionResult) {
        let entry =
            StepResult::from_execution(step, command, kind, result, &self.working_directory);
        self.working_directory = result.new_working_directory.clone();
        self.log.push(entry);
    }
}
