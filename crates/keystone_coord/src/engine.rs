//! External policy and risk engine seams.
//!
//! The coordinator asks both engines about the same [`EvaluationRequest`]
//! and needs both answers before it selects. Payloads arriving as raw JSON
//! go through [`parse_policy_decision`] and [`parse_risk_decision`].

use crate::assess::CandidateAssessment;
use async_trait::async_trait;
use indexmap::IndexSet;
use keystone_core::{decode, ProgramId, RiskClassification, SchemaError, TenantId};
use keystone_gate::{summarize_constraint_failures, ValidationSummary};
use keystone_plan::PlanCandidate;
use keystone_risk::RiskProfile;
use serde::{Deserialize, Serialize};

/// Engine call failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Engine could not be reached or gave up
    #[error("{engine} engine unavailable: {reason}")]
    Unavailable {
        /// Which engine
        engine: String,
        /// Why
        reason: String,
    },

    /// Engine answered with an unusable payload
    #[error("Invalid engine payload: {0}")]
    InvalidPayload(#[from] SchemaError),
}

/// One blocking policy finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBlock {
    /// Policy that fired
    pub policy_id: String,
    /// Why it fired
    pub reason: String,
}

/// Policy findings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecisionDetail {
    /// Blocking findings
    #[serde(default)]
    pub blocking: Vec<PolicyBlock>,
    /// Suggested mitigations
    #[serde(default)]
    pub mitigations: Vec<String>,
}

/// Compliance verdict
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyCompliance {
    /// Whether policy forbids the attempt
    pub blocked: bool,
    /// Findings
    #[serde(default)]
    pub decision: PolicyDecisionDetail,
    /// Escalations needed to proceed
    #[serde(default)]
    pub required_escalations: Vec<String>,
}

/// Policy engine answer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyEngineDecision {
    /// Compliance verdict
    pub compliance: PolicyCompliance,
}

/// Risk engine answer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskEngineDecision {
    /// Hold the attempt
    pub should_defer: bool,
    /// Advice
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Everything the engines are shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    /// Program
    pub program_id: ProgramId,
    /// Tenant
    pub tenant: TenantId,
    /// Candidates in generation order
    pub candidates: Vec<PlanCandidate>,
    /// Per-candidate risk and gate results, same order
    pub assessments: Vec<CandidateAssessment>,
    /// Merged risk across candidates
    pub merged_risk: RiskProfile,
}

/// Policy engine seam
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Judge the request
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot answer
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<PolicyEngineDecision, EngineError>;
}

/// Risk engine seam
#[async_trait]
pub trait RiskEngine: Send + Sync {
    /// Judge the request
    ///
    /// # Errors
    ///
    /// Returns error if the engine cannot answer
    async fn assess(&self, request: &EvaluationRequest) -> Result<RiskEngineDecision, EngineError>;
}

/// Parse a policy engine payload
///
/// # Errors
///
/// Returns error if the payload is malformed or incomplete
pub fn parse_policy_decision(raw: &str) -> Result<PolicyEngineDecision, SchemaError> {
    decode(raw)
}

/// Parse a risk engine payload
///
/// # Errors
///
/// Returns error if the payload is malformed or incomplete
pub fn parse_risk_decision(raw: &str) -> Result<RiskEngineDecision, SchemaError> {
    decode(raw)
}

/// Blocks when the leading candidate fails any gate check
#[derive(Debug, Clone, Copy, Default)]
pub struct GatePolicyEngine;

#[async_trait]
impl PolicyEngine for GatePolicyEngine {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<PolicyEngineDecision, EngineError> {
        let Some(leading) = request.assessments.first() else {
            return Ok(PolicyEngineDecision::default());
        };

        let failed: Vec<&ValidationSummary> = leading.gate.iter().filter(|s| !s.passed).collect();
        let blocking = failed
            .iter()
            .flat_map(|s| {
                s.blocked_reasons.iter().map(move |reason| PolicyBlock {
                    policy_id: format!("gate.{}", s.check),
                    reason: reason.clone(),
                })
            })
            .collect();

        let mitigations = if failed.is_empty() {
            Vec::new()
        } else {
            leading.risk.hints.clone()
        };

        Ok(PolicyEngineDecision {
            compliance: PolicyCompliance {
                blocked: !failed.is_empty(),
                decision: PolicyDecisionDetail {
                    blocking,
                    mitigations,
                },
                required_escalations: summarize_constraint_failures(&leading.gate),
            },
        })
    }
}

/// Defers once the merged risk reaches a band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdRiskEngine {
    defer_at: RiskClassification,
}

impl Default for ThresholdRiskEngine {
    fn default() -> Self {
        Self::new(RiskClassification::Danger)
    }
}

impl ThresholdRiskEngine {
    /// Defer at or above `defer_at`
    #[must_use]
    pub fn new(defer_at: RiskClassification) -> Self {
        Self { defer_at }
    }
}

#[async_trait]
impl RiskEngine for ThresholdRiskEngine {
    async fn assess(&self, request: &EvaluationRequest) -> Result<RiskEngineDecision, EngineError> {
        let band = request.merged_risk.classification;
        let should_defer = band >= self.defer_at;

        let mut recommendations: IndexSet<String> = request
            .assessments
            .iter()
            .flat_map(|a| a.risk.hints.iter().cloned())
            .collect();
        if should_defer {
            recommendations.insert(format!("defer: merged risk is {}", band));
        }

        Ok(RiskEngineDecision {
            should_defer,
            recommendations: recommendations.into_iter().collect(),
        })
    }
}
