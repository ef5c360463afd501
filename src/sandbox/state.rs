//! Sandbox state snapshots.
//!
//! A snapshot is three independent, read-only listings run in the current
//! working directory. It is stale as soon as any mutating command runs, so
//! callers take a fresh one before every step.

use std::collections::BTreeSet;
use std::fmt::Write;

use tracing::{debug, warn};

use super::SandboxExecutor;

/// Default number of entries kept per listing.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 20;

const LIST_DIRECTORIES: &str = "find . -mindepth 1 -maxdepth 1 -type d -printf '%P\\n'";
const LIST_FILES: &str = "find . -mindepth 1 -maxdepth 1 -type f -printf '%P\\n'";
/// Exits cleanly with no output when dpkg is not installed.
const LIST_PACKAGES: &str =
    "command -v dpkg-query >/dev/null 2>&1 || exit 0; dpkg-query -W -f='${Package}\\n'";

/// What the sandbox looks like from the current working directory.
///
/// Each set is truncated to the tracker's limit: callers must not assume
/// completeness for large directories or images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxState {
    pub directories: BTreeSet<String>,
    pub files: BTreeSet<String>,
    pub packages: BTreeSet<String>,
}

impl SandboxState {
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty() && self.packages.is_empty()
    }

    /// Compact text form for prompts and the `/state` command.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Directories: {}", join_or_none(&self.directories));
        let _ = writeln!(out, "Files: {}", join_or_none(&self.files));
        let _ = write!(out, "Installed packages: {}", join_or_none(&self.packages));
        out
    }
}

fn join_or_none(set: &BTreeSet<String>) -> String {
    if set.is_empty() {
        "(none)".to_string()
    } else {
        set.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Captures [`SandboxState`] snapshots. Never fails.
#[derive(Clone, Copy)]
pub struct StateTracker<'a> {
    sandbox: &'a dyn SandboxExecutor,
    limit: usize,
}

impl<'a> StateTracker<'a> {
    pub fn new(sandbox: &'a dyn SandboxExecutor, limit: usize) -> Self {
        Self { sandbox, limit }
    }

    pub async fn snapshot(&self, working_directory: &str) -> SandboxState {
        let state = SandboxState {
            directories: self.list("directories", LIST_DIRECTORIES, working_directory).await,
            files: self.list("files", LIST_FILES, working_directory).await,
            packages: self.list("packages", LIST_PACKAGES, working_directory).await,
        };
        debug!(
            "Snapshot of '{working_directory}': {} dirs, {} files, {} packages",
            state.directories.len(),
            state.files.len(),
            state.packages.len()
        );
        state
    }

    /// Runs one listing; a failed listing yields an empty set.
    async fn list(&self, label: &str, command: &str, working_directory: &str) -> BTreeSet<String> {
        let output = self.sandbox.run(command, working_directory).await;
        if !output.succeeded() {
            warn!(
                "State listing '{label}' failed (exit {}): {}",
                output.exit_code, output.stderr
            );
            return BTreeSet::new();
        }
        output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .take(self.limit)
            .collect()
    }
}
