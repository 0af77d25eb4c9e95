//! KEYSTONE Constraint Gate
//!
//! Checks a plan candidate against a policy profile. Every check reports
//! independently; failures are data, not errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gate;
pub mod profile;

pub use gate::{
    assess_candidate_constraints, summarize_constraint_failures, ContingencyWindow, GateCandidate,
    GateCheck, ValidationSummary,
};
pub use profile::{GateError, GateState, PolicyProfile};
