//! KEYSTONE Coordinator
//!
//! Drives one coordination attempt from a submitted program to a recorded
//! selection: graph, candidates, per-candidate risk and gate assessment,
//! external policy and risk decisions, selection, persistence and
//! announcement.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assess;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod notify;
pub mod selector;
pub mod state;
pub mod store;

pub use assess::{assess_candidate, AssessmentContext, CandidateAssessment, GateStage, RiskStage};
pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::{AttemptPlan, AttemptRequest, CoordinationAttemptReport, Coordinator};
pub use engine::{
    parse_policy_decision, parse_risk_decision, EngineError, EvaluationRequest, GatePolicyEngine,
    PolicyBlock, PolicyCompliance, PolicyDecisionDetail, PolicyEngine, PolicyEngineDecision,
    RiskEngine, RiskEngineDecision, ThresholdRiskEngine,
};
pub use error::{CoordinationError, CoordinationResult};
pub use notify::{AttemptNotifier, ChannelNotifier, NotifyError, TracingNotifier};
pub use selector::{
    aggregate_score, derive_decision, rank_candidates, select_candidate, Decision,
    DecisionOutcome, ScoredCandidate, SelectionResult,
};
pub use state::{CoordinationState, Phase, PhaseTransition};
pub use store::{CoordinationRecord, CoordinationStore, InMemoryStore, StoreError};
