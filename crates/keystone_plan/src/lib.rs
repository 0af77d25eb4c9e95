//! KEYSTONE Candidate Generator
//!
//! Turns an execution graph and a budget into ordered plan candidates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod candidate;
pub mod generator;

pub use candidate::{CandidateMetadata, CandidateStrategy, PlanCandidate};
pub use generator::{CandidateGenerator, GenerateError, GenerateResult, GeneratorConfig};
