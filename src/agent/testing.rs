//! Test doubles shared by the agent and sandbox tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::types::{ErrorInfo, Step, StepResult};
use crate::oracle::{CommandGenerator, GenerationContext, PlanRequest, Planner, RecoveryPlanner};
use crate::sandbox::{ExecOutput, SandboxExecutor};

struct Rule {
    needle: String,
    outputs: VecDeque<ExecOutput>,
}

/// Sandbox that answers from a script instead of running anything.
///
/// The first rule whose needle occurs in the command answers it. A rule
/// with several queued outputs hands them out in order and then keeps
/// repeating the last one. Unmatched commands succeed with no output.
#[derive(Default)]
pub struct FakeSandbox {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: &str, output: ExecOutput) -> Self {
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.needle == needle) {
                Some(rule) => rule.outputs.push_back(output),
                None => rules.push(Rule {
                    needle: needle.to_string(),
                    outputs: VecDeque::from([output]),
                }),
            }
        }
        self
    }

    /// Every `(command, working_directory)` received, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(cmd, _)| cmd.contains(needle))
            .count()
    }
}

#[async_trait]
impl SandboxExecutor for FakeSandbox {
    async fn run(&self, command: &str, working_directory: &str) -> ExecOutput {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), working_directory.to_string()));

        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|r| command.contains(&r.needle)) {
            Some(rule) if rule.outputs.len() > 1 => rule.outputs.pop_front().unwrap(),
            Some(rule) => rule.outputs.front().cloned().unwrap(),
            None => ExecOutput::ok(""),
        }
    }
}

/// Oracle with canned answers for all three capabilities.
#[derive(Default)]
pub struct ScriptedOracle {
    plan: Option<Vec<String>>,
    commands: HashMap<String, String>,
    recovery: Option<Vec<String>>,
    /// Step descriptions commands were requested for, in order.
    pub generated_for: Mutex<Vec<String>>,
    pub recover_calls: Mutex<Vec<ErrorInfo>>,
    /// `(request, history length)` per planning call.
    pub plan_calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(mut self, steps: &[&str]) -> Self {
        self.plan = Some(steps.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_command(mut self, step: &str, command: &str) -> Self {
        self.commands.insert(step.to_string(), command.to_string());
        self
    }

    pub fn with_recovery(mut self, steps: &[&str]) -> Self {
        self.recovery = Some(steps.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn generated(&self) -> Vec<String> {
        self.generated_for.lock().unwrap().clone()
    }
}

pub fn steps(descriptions: &[&str]) -> Vec<Step> {
    descriptions.iter().filter_map(Step::new).collect()
}

#[async_trait]
impl Planner for ScriptedOracle {
    async fn plan(&self, request: &PlanRequest<'_>) -> Result<Vec<Step>> {
        self.plan_calls
            .lock()
            .unwrap()
            .push((request.user_request.to_string(), request.history.len()));
        let plan = self.plan.as_ref().ok_or_else(|| anyhow!("planner unavailable"))?;
        Ok(plan.iter().filter_map(Step::new).collect())
    }
}

#[async_trait]
impl CommandGenerator for ScriptedOracle {
    async fn generate(&self, context: &GenerationContext<'_>) -> Result<String> {
        let step = context.step().as_str().to_string();
        self.generated_for.lock().unwrap().push(step.clone());
        self.commands
            .get(&step)
            .cloned()
            .ok_or_else(|| anyhow!("no command for '{step}'"))
    }
}

#[async_trait]
impl RecoveryPlanner for ScriptedOracle {
    async fn recover(
        &self,
        error: &ErrorInfo,
        _original_request: &str,
        _prior_results: &[StepResult],
    ) -> Result<Vec<Step>> {
        self.recover_calls.lock().unwrap().push(error.clone());
        let plan = self
            .recovery
            .as_ref()
            .ok_or_else(|| anyhow!("recovery oracle unavailable"))?;
        Ok(plan.iter().filter_map(Step::new).collect())
    }
}
