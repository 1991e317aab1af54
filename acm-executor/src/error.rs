//! Errors surfaced by the executor's own operations (`start`/`cancel`),
//! distinct from `acm_contracts::AcmError` which flows through generation
//! and evaluation task outcomes.

use acm_contracts::RunStatus;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("run config has no generator plan entries")]
    EmptyGeneratorPlan,

    #[error("generator '{0}' failed its health check")]
    HealthCheckFailed(String),

    #[error("illegal run state transition from {from:?} to {to:?}")]
    IllegalTransition { from: RunStatus, to: RunStatus },

    #[error("run already reached a terminal state: {0:?}")]
    AlreadyTerminal(RunStatus),
}
