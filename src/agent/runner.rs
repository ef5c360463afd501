//! Plan execution.
//!
//! Steps run strictly in order, each against a fresh state snapshot. A
//! failing step gets one recovery pass and, if that succeeds, exactly one
//! retry of the same command string. Nothing is rolled back on abort.

use tracing::{error, info, warn};

use super::error::PlanError;
use super::recovery::RecoveryController;
use super::step::StepExecutor;
use super::types::{SessionContext, Step, StepKind};
use crate::oracle::{CommandGenerator, GenerationContext, RecoveryPlanner};
use crate::sandbox::{SandboxExecutor, StateTracker};

/// Result of running one plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    pub success: bool,
    pub working_directory: String,
    /// Why the plan stopped early, if it did.
    pub abort: Option<PlanError>,
}

pub struct PlanRunner<'a> {
    executor: StepExecutor<'a>,
    tracker: StateTracker<'a>,
    generator: &'a dyn CommandGenerator,
    recovery: RecoveryController<'a>,
}

impl<'a> PlanRunner<'a> {
    pub fn new(
        sandbox: &'a dyn SandboxExecutor,
        generator: &'a dyn CommandGenerator,
        recovery_planner: &'a dyn RecoveryPlanner,
        snapshot_limit: usize,
        max_recovery_steps: usize,
    ) -> Self {
        let executor = StepExecutor::new(sandbox);
        let tracker = StateTracker::new(sandbox, snapshot_limit);
        Self {
            executor,
            tracker,
            generator,
            recovery: RecoveryController::new(
                executor,
                tracker,
                generator,
                recovery_planner,
                max_recovery_steps,
            ),
        }
    }

    /// Runs `plan` to completion or to the first abort.
    pub async fn run(&self, ctx: &mut SessionContext, plan: &[Step]) -> PlanOutcome {
        let abort = match self.run_steps(ctx, plan).await {
            Ok(()) => {
                info!("All {} planned step(s) succeeded", plan.len());
                None
            }
            Err(e) => {
                error!("Plan aborted: {e}");
                Some(e)
            }
        };
        PlanOutcome {
            success: abort.is_none(),
            working_directory: ctx.working_directory.clone(),
            abort,
        }
    }

    async fn run_steps(&self, ctx: &mut SessionContext, plan: &[Step]) -> Result<(), PlanError> {
        for (index, step) in plan.iter().enumerate() {
            info!("Step [{}/{}]: {step}", index + 1, plan.len());

            let state = self.tracker.snapshot(&ctx.working_directory).await;
            let generation = GenerationContext {
                request: &ctx.request,
                plan,
                step_index: index,
                prior_results: &ctx.log,
                state: &state,
                working_directory: &ctx.working_directory,
            };
            let command = self
                .generator
                .generate(&generation)
                .await
                .map_err(|e| PlanError::Generation {
                    step: step.to_string(),
                    reason: e.to_string(),
                })?;
            info!("Command: {command} (in {})", ctx.working_directory);

            let result = self.executor.execute(&command, &ctx.working_directory).await;
            if result.success {
                ctx.record(step, &command, StepKind::Planned, &result);
                continue;
            }

            warn!(
                "Step '{step}' failed (exit {}): {}",
                result.exit_code,
                result.error_message()
            );
            self.recovery.recover(ctx, step, &command, &result).await?;

            // Same command string, not a fresh one
            info!("Retrying '{step}': {command}");
            let retry = self.executor.execute(&command, &ctx.working_directory).await;
            if !retry.success {
                return Err(PlanError::RetryFailure {
                    step: step.to_string(),
                    command,
                    message: retry.error_message().to_string(),
                });
            }
            ctx.record(step, &command, StepKind::Retry, &retry);
        }
        Ok(())
    }
}
