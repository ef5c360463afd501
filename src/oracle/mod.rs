//! Natural-language oracles.
//!
//! The control loop talks to three capability traits. Their output is
//! non-deterministic, so the loop only reacts to what they return; the
//! LLM-backed implementation lives in [`llm`].

pub mod llm;
mod prompts;

use anyhow::Result;
use async_trait::async_trait;

use crate::agent::types::{ErrorInfo, Step, StepResult};
use crate::llm::Message;
use crate::sandbox::SandboxState;

pub use llm::LlmOracle;

/// Input to [`Planner::plan`].
pub struct PlanRequest<'a> {
    pub user_request: &'a str,
    pub working_directory: &'a str,
    /// Earlier conversation turns, oldest first.
    pub history: &'a [Message],
    pub state: &'a SandboxState,
}

/// Input to [`CommandGenerator::generate`]: the whole plan plus the index of
/// the step to produce a command for.
pub struct GenerationContext<'a> {
    pub request: &'a str,
    pub plan: &'a [Step],
    pub step_index: usize,
    pub prior_results: &'a [StepResult],
    pub state: &'a SandboxState,
    pub working_directory: &'a str,
}

impl GenerationContext<'_> {
    pub fn step(&self) -> &Step {
        &self.plan[self.step_index]
    }
}

/// Turns a user request into ordered step descriptions.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Returns only well-formed, non-empty steps; anything else is an error.
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<Vec<Step>>;
}

/// Turns one step into a single shell command.
#[async_trait]
pub trait CommandGenerator: Send + Sync {
    async fn generate(&self, context: &GenerationContext<'_>) -> Result<String>;
}

/// Proposes steps that fix a failure.
#[async_trait]
pub trait RecoveryPlanner: Send + Sync {
    async fn recover(
        &self,
        error: &ErrorInfo,
        original_request: &str,
        prior_results: &[StepResult],
    ) -> Result<Vec<Step>>;
}
