//! Candidate checks against a policy profile.
//!
//! Six checks always run, in a fixed order, and never short-circuit each
//! other. A candidate whose risk sits at most ten points below the ceiling gets
//! a contingency window attached to every summary.

use crate::profile::{GateState, PolicyProfile};
use keystone_core::{CandidateId, ExternalBudget, PlanBudget, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const CONTINGENCY_MARGIN: f64 = 10.0;
const CONTINGENCY_WIDEN_MINUTES: i64 = 5;
const CONTINGENCY_CONFIDENCE_DROP: f64 = 7.0;
const CONTINGENCY_RISK_BUMP: f64 = 5.0;
const CONTINGENCY_DENSITY_FACTOR: f64 = 0.85;

/// What the gate sees of a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateCandidate {
    /// Candidate ID
    pub candidate_id: CandidateId,
    /// Window the candidate occupies
    pub window: TimeWindow,
    /// Budget the candidate asks for
    pub budget: PlanBudget,
    /// Distinct signals observed
    pub signal_count: usize,
    /// Confidence, 0..100
    pub confidence: f64,
    /// Risk score, 0..100
    pub risk_score: f64,
    /// Signals per step
    pub signal_density: f64,
}

/// Check identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateCheck {
    /// Enough signals observed
    SignalCoverage,
    /// Confidence above the floor
    Confidence,
    /// Window length within bounds
    Window,
    /// Budget sanity
    Budget,
    /// Risk under the ceiling
    Risk,
    /// No disabled feature flags
    FeatureFlags,
}

impl GateCheck {
    /// Every check in run order
    pub const ALL: [GateCheck; 6] = [
        GateCheck::SignalCoverage,
        GateCheck::Confidence,
        GateCheck::Window,
        GateCheck::Budget,
        GateCheck::Risk,
        GateCheck::FeatureFlags,
    ];

    /// Stable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignalCoverage => "signal-coverage",
            Self::Confidence => "confidence",
            Self::Window => "window",
            Self::Budget => "budget",
            Self::Risk => "risk",
            Self::FeatureFlags => "feature-flags",
        }
    }
}

impl std::fmt::Display for GateCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate re-projected with safety margins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContingencyWindow {
    /// Window widened on both sides
    pub window: TimeWindow,
    /// Reduced confidence
    pub confidence: f64,
    /// Raised risk, capped at the ceiling
    pub risk_score: f64,
    /// Reduced signal density
    pub signal_density: f64,
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    /// Candidate checked
    pub candidate_id: CandidateId,
    /// Which check
    pub check: GateCheck,
    /// Whether it passed
    pub passed: bool,
    /// Failure reason codes
    pub blocked_reasons: Vec<String>,
    /// Non-blocking observations
    pub warnings: Vec<String>,
    /// Present when risk is close to the ceiling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contingency: Option<ContingencyWindow>,
}

impl ValidationSummary {
    fn new(candidate_id: &CandidateId, check: GateCheck) -> Self {
        Self {
            candidate_id: candidate_id.clone(),
            check,
            passed: true,
            blocked_reasons: Vec::new(),
            warnings: Vec::new(),
            contingency: None,
        }
    }

    fn block(mut self, reason: impl Into<String>) -> Self {
        self.passed = false;
        self.blocked_reasons.push(reason.into());
        self
    }

    fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

fn check_signals(c: &GateCandidate, profile: &PolicyProfile) -> ValidationSummary {
    let summary = ValidationSummary::new(&c.candidate_id, GateCheck::SignalCoverage);
    if c.signal_count < profile.min_signals {
        summary.block("insufficient_signal_coverage")
    } else {
        summary
    }
}

fn check_confidence(c: &GateCandidate, profile: &PolicyProfile) -> ValidationSummary {
    let summary = ValidationSummary::new(&c.candidate_id, GateCheck::Confidence);
    if c.confidence < profile.min_confidence {
        summary.block("low_confidence")
    } else if c.confidence <= 80.0 {
        summary.warn("moderate_confidence")
    } else {
        summary
    }
}

fn check_window(c: &GateCandidate, profile: &PolicyProfile) -> ValidationSummary {
    let summary = ValidationSummary::new(&c.candidate_id, GateCheck::Window);
    let length = c.window.length_minutes();
    if length < profile.min_window_minutes {
        return summary.block("window_too_short");
    }
    match profile.max_window_minutes {
        Some(max) if length > max => summary.block("window_too_long"),
        _ => summary,
    }
}

fn budget_violation(budget: &PlanBudget, external: &ExternalBudget) -> Option<&'static str> {
    if budget.max_parallelism <= 0 {
        Some("invalid_parallelism")
    } else if budget.risk_tolerance < 0.0 {
        Some("invalid_risk_tolerance")
    } else if budget.budget_minutes < external.budget_minutes / 4.0 {
        Some("budget_too_small")
    } else if budget.budget_cost_units > external.budget_cost_units * 2.0 {
        Some("excessive_cost")
    } else {
        None
    }
}

fn check_budget(c: &GateCandidate, external: &ExternalBudget) -> ValidationSummary {
    let summary = ValidationSummary::new(&c.candidate_id, GateCheck::Budget);
    match budget_violation(&c.budget, external) {
        Some(reason) => summary.block(reason),
        None => summary,
    }
}

fn check_risk(c: &GateCandidate, profile: &PolicyProfile) -> ValidationSummary {
    let summary = ValidationSummary::new(&c.candidate_id, GateCheck::Risk);
    if c.risk_score > profile.max_risk_score {
        summary.block("risk_score_exceeded")
    } else if c.risk_score >= 80.0 {
        summary.warn("high_risk")
    } else {
        summary
    }
}

fn check_flags(c: &GateCandidate, state: &GateState) -> ValidationSummary {
    state
        .disabled
        .iter()
        .fold(ValidationSummary::new(&c.candidate_id, GateCheck::FeatureFlags), |s, flag| {
            s.block(format!("disabled:{}", flag))
        })
}

fn contingency(c: &GateCandidate, profile: &PolicyProfile) -> Option<ContingencyWindow> {
    let headroom = profile.max_risk_score - c.risk_score;
    if !(0.0..=CONTINGENCY_MARGIN).contains(&headroom) {
        return None;
    }
    Some(ContingencyWindow {
        window: c.window.widened(CONTINGENCY_WIDEN_MINUTES),
        confidence: (c.confidence - CONTINGENCY_CONFIDENCE_DROP).max(0.0),
        risk_score: (c.risk_score + CONTINGENCY_RISK_BUMP).min(profile.max_risk_score),
        signal_density: c.signal_density * CONTINGENCY_DENSITY_FACTOR,
    })
}

/// Run every check against one candidate
///
/// Returns one summary per [`GateCheck`], in [`GateCheck::ALL`] order.
#[must_use]
pub fn assess_candidate_constraints(
    candidate: &GateCandidate,
    external: &ExternalBudget,
    profile: &PolicyProfile,
    state: &GateState,
) -> Vec<ValidationSummary> {
    let mut summaries = vec![
        check_signals(candidate, profile),
        check_confidence(candidate, profile),
        check_window(candidate, profile),
        check_budget(candidate, external),
        check_risk(candidate, profile),
        check_flags(candidate, state),
    ];

    if let Some(buffer) = contingency(candidate, profile) {
        for summary in &mut summaries {
            summary.contingency = Some(buffer.clone());
        }
    }

    let failed = summaries.iter().filter(|s| !s.passed).count();
    tracing::debug!(
        candidate_id = %candidate.candidate_id,
        failed,
        "gate checks complete"
    );
    summaries
}

/// Sorted, de-duplicated failure codes across summaries
#[must_use]
pub fn summarize_constraint_failures(assessments: &[ValidationSummary]) -> Vec<String> {
    assessments
        .iter()
        .filter(|s| !s.passed)
        .flat_map(|s| s.blocked_reasons.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
