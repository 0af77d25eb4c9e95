//! KEYSTONE Core Types
//!
//! Ids, errors, time, and the recovery program data model shared by every
//! planner crate. Pure types and logic with no I/O beyond logging setup.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod logging;
pub mod model;
pub mod schema;
pub mod time;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{
    CandidateId, ConstraintId, CorrelationId, ProgramId, RecordId, RunId, StepId, TenantId,
};
pub use logging::{init_tracing, LoggingConfig};
pub use model::{
    Constraint, ConstraintKind, Criticality, ExternalBudget, PlanBudget, Program, ProgramPhase,
    RiskClassification, Signal, Step,
};
pub use schema::{decode, parse_program, validate_program, SchemaError};
pub use time::{parse_bound, Clock, FixedClock, SystemClock, TimeWindow};
