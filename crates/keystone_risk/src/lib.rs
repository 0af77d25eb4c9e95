//! KEYSTONE Risk Scorer
//!
//! Scores a plan candidate across four fixed-weight dimensions and
//! classifies the result into a risk band.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod merge;
pub mod scorer;

pub use merge::merge_risk_summaries;
pub use scorer::{
    evaluate_candidate_risk, RiskAssessment, RiskDimensions, RiskInput, RiskProfile, RiskWeights,
    RISK_WEIGHTS,
};
