//! Sandbox boundary.
//!
//! Every command reaches the sandbox as `cd <working directory> && <command>`
//! through a fresh shell; nothing persists between invocations except the
//! filesystem itself.

pub mod docker;
pub mod state;

use std::borrow::Cow;

use async_trait::async_trait;

pub use docker::DockerSandbox;
pub use state::{SandboxState, StateTracker};

/// Exit code reported when the command could not be run at all.
pub const TRANSPORT_FAILURE: i32 = -1;

/// Raw outcome of one sandbox invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Transport/runtime failure: the command never ran.
    pub fn transport_error(error: impl std::fmt::Display) -> Self {
        Self::failed(TRANSPORT_FAILURE, error.to_string())
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs one shell command inside the sandbox.
///
/// Implementations must not fail: anything that prevents the command from
/// running is reported as [`TRANSPORT_FAILURE`] with the error text in
/// `stderr`. No retries happen at this layer.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn run(&self, command: &str, working_directory: &str) -> ExecOutput;
}

/// Quotes a single shell word. Words containing a NUL byte cannot be
/// represented and are rejected.
pub fn quote(word: &str) -> Option<Cow<'_, str>> {
    shlex::try_quote(word).ok()
}

/// Builds the script sent to the sandbox shell for `command` run in
/// `working_directory`.
pub fn in_directory(command: &str, working_directory: &str) -> Option<String> {
    let dir = quote(working_directory)?;
    Some(format!("cd {dir} && {command}"))
}
