//! Candidate ranking and decision derivation.

use crate::engine::{PolicyEngineDecision, RiskEngineDecision};
use crate::error::{CoordinationError, CoordinationResult};
use chrono::{DateTime, Utc};
use keystone_core::{CandidateId, Constraint};
use keystone_plan::PlanCandidate;
use serde::{Deserialize, Serialize};
use std::fmt;

const HEAVY_CONSTRAINT_WEIGHT: f64 = 0.6;
const CONSTRAINT_PENALTY: f64 = 30.0;

/// Final verdict of an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Cleared to run
    Approved,
    /// Hold until risk drops
    Deferred,
    /// Policy forbids it
    Blocked,
}

impl Decision {
    /// Stable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Deferred => "deferred",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate's selection score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    /// Candidate ID
    pub candidate_id: CandidateId,
    /// Position in the input list
    pub index: usize,
    /// Aggregate before penalties
    pub base_score: f64,
    /// (constraint, step) pairs penalized
    pub penalties: u32,
    /// Final score
    pub score: f64,
}

/// Decision plus its justification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    /// Verdict
    pub decision: Decision,
    /// Escalations the policy engine requires
    pub blocked_constraints: Vec<String>,
    /// Policy violations then risk recommendations
    pub reasons: Vec<String>,
}

/// Terminal artifact of one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    /// Winner
    pub chosen: PlanCandidate,
    /// Runners-up, best first
    pub alternatives: Vec<PlanCandidate>,
    /// Every score, best first
    pub scores: Vec<ScoredCandidate>,
    /// Verdict
    pub decision: Decision,
    /// Escalations the policy engine requires
    pub blocked_constraints: Vec<String>,
    /// Justification
    pub reasons: Vec<String>,
    /// Selection time
    pub selected_at: DateTime<Utc>,
}

/// Score from composition risk and resilience, 0..100
#[must_use]
pub fn aggregate_score(candidate: &PlanCandidate) -> f64 {
    let meta = &candidate.metadata;
    ((1.0 - meta.risk_index) * 0.6 + meta.resilience_score * 0.4) * 100.0
}

fn penalty_count(candidate: &PlanCandidate, constraints: &[Constraint]) -> u32 {
    constraints
        .iter()
        .filter(|c| c.weight > HEAVY_CONSTRAINT_WEIGHT)
        .map(|c| {
            let mut steps: Vec<_> = c.affected_step_ids.iter().collect();
            steps.sort();
            steps.dedup();
            steps.into_iter().filter(|s| candidate.contains(s)).count() as u32
        })
        .sum()
}

/// Score and sort candidates, best first
///
/// The sort is stable, so equal scores keep their input order.
#[must_use]
pub fn rank_candidates(candidates: &[PlanCandidate], constraints: &[Constraint]) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let base_score = aggregate_score(candidate);
            let penalties = penalty_count(candidate, constraints);
            ScoredCandidate {
                candidate_id: candidate.id.clone(),
                index,
                base_score,
                penalties,
                score: base_score - CONSTRAINT_PENALTY * f64::from(penalties),
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

/// Combine the two engine verdicts
///
/// Blocked beats deferred beats approved.
#[must_use]
pub fn derive_decision(policy: &PolicyEngineDecision, risk: &RiskEngineDecision) -> DecisionOutcome {
    let compliance = &policy.compliance;
    let decision = if compliance.blocked {
        Decision::Blocked
    } else if risk.should_defer {
        Decision::Deferred
    } else {
        Decision::Approved
    };

    let reasons = compliance
        .decision
        .blocking
        .iter()
        .map(|b| format!("{}: {}", b.policy_id, b.reason))
        .chain(risk.recommendations.iter().cloned())
        .collect();

    DecisionOutcome {
        decision,
        blocked_constraints: compliance.required_escalations.clone(),
        reasons,
    }
}

/// Pick the best candidate and attach the decision
///
/// # Errors
///
/// Returns error if `candidates` is empty
pub fn select_candidate(
    candidates: &[PlanCandidate],
    constraints: &[Constraint],
    policy: &PolicyEngineDecision,
    risk: &RiskEngineDecision,
    selected_at: DateTime<Utc>,
) -> CoordinationResult<SelectionResult> {
    let scores = rank_candidates(candidates, constraints);
    let mut ranked = scores.iter().map(|s| candidates[s.index].clone());
    let chosen = ranked.next().ok_or(CoordinationError::NoCandidates)?;
    let alternatives: Vec<PlanCandidate> = ranked.collect();
    let outcome = derive_decision(policy, risk);

    tracing::info!(
        candidate_id = %chosen.id,
        decision = %outcome.decision,
        alternatives = alternatives.len(),
        "selected candidate"
    );

    Ok(SelectionResult {
        chosen,
        alternatives,
        scores,
        decision: outcome.decision,
        blocked_constraints: outcome.blocked_constraints,
        reasons: outcome.reasons,
        selected_at,
    })
}
