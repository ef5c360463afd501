//! Recovery pass.
//!
//! Entered only after a step failed: analyze the failure, ask for a
//! recovery plan, apply it once. A failing recovery step ends the attempt;
//! recovery steps are never themselves recovered.

use tracing::{info, warn};

use super::error::PlanError;
use super::step::StepExecutor;
use super::types::{ErrorInfo, ExecutionResult, SessionContext, Step, StepKind};
use crate::oracle::{CommandGenerator, GenerationContext, RecoveryPlanner};
use crate::sandbox::StateTracker;

pub struct RecoveryController<'a> {
    executor: StepExecutor<'a>,
    tracker: StateTracker<'a>,
    generator: &'a dyn CommandGenerator,
    planner: &'a dyn RecoveryPlanner,
    max_steps: usize,
}

impl<'a> RecoveryController<'a> {
    pub fn new(
        executor: StepExecutor<'a>,
        tracker: StateTracker<'a>,
        generator: &'a dyn CommandGenerator,
        planner: &'a dyn RecoveryPlanner,
        max_steps: usize,
    ) -> Self {
        Self {
            executor,
            tracker,
            generator,
            planner,
            max_steps,
        }
    }

    /// Runs one recovery pass for `step`, whose `command` produced `failed`.
    ///
    /// On success the caller retries the original command exactly once.
    /// Successful recovery steps are appended to `ctx.log` and may move
    /// `ctx.working_directory`.
    pub async fn recover(
        &self,
        ctx: &mut SessionContext,
        step: &Step,
        command: &str,
        failed: &ExecutionResult,
    ) -> Result<(), PlanError> {
        // ANALYZE
        let state = self.tracker.snapshot(&ctx.working_directory).await;
        let error = ErrorInfo::from_failure(step, command, failed, &ctx.working_directory, state);
        info!(
            "Analyzing failure of '{}' (exit {}): {}",
            error.failed_command, error.exit_code, error.error_message
        );

        // NO-PLAN
        let mut plan = match self.planner.recover(&error, &ctx.request, &ctx.log).await {
            Ok(plan) if !plan.is_empty() => plan,
            Ok(_) => {
                return Err(PlanError::RecoveryUnavailable {
                    step: step.to_string(),
                    reason: "recovery plan is empty".to_string(),
                })
            }
            Err(e) => {
                return Err(PlanError::RecoveryUnavailable {
                    step: step.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        if plan.len() > self.max_steps {
            warn!(
                "Recovery plan has {} steps, keeping the first {}",
                plan.len(),
                self.max_steps
            );
            plan.truncate(self.max_steps);
        }
        info!("Recovery plan: {} step(s)", plan.len());

        // APPLY
        for (index, recovery_step) in plan.iter().enumerate() {
            let state = self.tracker.snapshot(&ctx.working_directory).await;
            let generation = GenerationContext {
                request: &ctx.request,
                plan: &plan,
                step_index: index,
                prior_results: &ctx.log,
                state: &state,
                working_directory: &ctx.working_directory,
            };
            let recovery_command = self.generator.generate(&generation).await.map_err(|e| {
                PlanError::RecoveryStepFailure {
                    step: recovery_step.to_string(),
                    message: format!("no command generated: {e}"),
                }
            })?;

            info!("Recovery [{}/{}] {recovery_step}: {recovery_command}", index + 1, plan.len());
            let result = self
                .executor
                .execute(&recovery_command, &ctx.working_directory)
                .await;
            if !result.success {
                warn!("Recovery step '{recovery_step}' failed, giving up");
                return Err(PlanError::RecoveryStepFailure {
                    step: recovery_step.to_string(),
                    message: result.error_message().to_string(),
                });
            }
            ctx.record(recovery_step, &recovery_command, StepKind::Recovery, &result);
        }

        // DONE
        info!("Recovery for '{step}' completed");
        Ok(())
    }
}
