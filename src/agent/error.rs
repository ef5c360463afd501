use thiserror::Error;

/// Why a plan was aborted. Every variant is local to the current request;
/// the session keeps running.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The planner returned nothing usable; no sandbox action was taken.
    #[error("planning failed: {0}")]
    Planning(String),

    /// No command could be produced for a planned step.
    #[error("no command generated for step '{step}': {reason}")]
    Generation { step: String, reason: String },

    /// A step failed and the recovery oracle produced no plan.
    #[error("step '{step}' failed and no recovery plan is available: {reason}")]
    RecoveryUnavailable { step: String, reason: String },

    /// A recovery action itself failed. Recovery is never recursive.
    #[error("recovery step '{step}' failed: {message}")]
    RecoveryStepFailure { step: String, message: String },

    /// The original step still failed after a successful recovery.
    #[error("step '{step}' failed again after recovery (`{command}`): {message}")]
    RetryFailure {
        step: String,
        command: String,
        message: String,
    },
}
