//! Coordination errors.

use crate::engine::EngineError;
use crate::notify::NotifyError;
use crate::selector::Decision;
use crate::state::Phase;
use crate::store::StoreError;
use keystone_core::{ProgramId, SchemaError};
use keystone_graph::PipelineError;

/// Coordination result type
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinationError {
    /// Program failed boundary validation
    #[error("Invalid program: {0}")]
    InvalidProgram(#[from] SchemaError),

    /// Step dependencies form a cycle
    #[error("Program {program_id} has a dependency cycle among: {}", .blocked.join(", "))]
    CycleDetected {
        /// Program
        program_id: ProgramId,
        /// Steps that could not be ordered
        blocked: Vec<String>,
    },

    /// Budget ceilings are not positive
    #[error("Invalid budget: maxParallelism={max_parallelism}, maxRuntimeMinutes={max_runtime_minutes}")]
    InvalidBudget {
        /// Requested parallelism
        max_parallelism: i64,
        /// Requested runtime ceiling
        max_runtime_minutes: i64,
    },

    /// Critical constraints stopped the attempt before planning
    #[error("Attempt {decision} by critical constraints: {}", .constraints.join(", "))]
    ConstraintBlocked {
        /// Critical constraint ids
        constraints: Vec<String>,
        /// Decision written to the audit record
        decision: Decision,
    },

    /// Nothing to select from
    #[error("No candidates to select from")]
    NoCandidates,

    /// State machine refused a phase change
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current phase
        from: Phase,
        /// Requested phase
        to: Phase,
    },

    /// Policy engine failed
    #[error("Policy engine failed: {0}")]
    PolicyEngine(#[source] EngineError),

    /// Risk engine failed
    #[error("Risk engine failed: {0}")]
    RiskEngine(#[source] EngineError),

    /// Record could not be saved
    #[error("Persistence failed: {0}")]
    Persistence(#[source] StoreError),

    /// Report could not be announced
    #[error("Notification failed: {0}")]
    Notification(#[source] NotifyError),

    /// Assessment pipeline failed
    #[error("Assessment pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
}

impl CoordinationError {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidProgram(_) => "coordination-invalid-program",
            Self::CycleDetected { .. } => "coordination-cycle-detected",
            Self::InvalidBudget { .. } => "coordination-invalid-budget",
            Self::ConstraintBlocked { .. } => "coordination-constraint-blocked",
            Self::NoCandidates => "coordination-no-candidates",
            Self::InvalidTransition { .. } => "coordination-invalid-transition",
            Self::PolicyEngine(_) => "coordination-policy-engine",
            Self::RiskEngine(_) => "coordination-risk-engine",
            Self::Persistence(_) => "coordination-persistence",
            Self::Notification(_) => "coordination-notification",
            Self::Pipeline(_) => "coordination-pipeline",
        }
    }
}

impl From<CoordinationError> for keystone_core::CoreError {
    fn from(err: CoordinationError) -> Self {
        keystone_core::CoreError::Internal {
            message: format!("{}: {}", err.code(), err),
        }
    }
}
