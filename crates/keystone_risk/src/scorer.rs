//! Per-candidate risk scoring.
//!
//! Weights are fixed constants, so a score means the same thing in every
//! run.

use keystone_core::{CandidateId, PlanBudget, RiskClassification, Signal, TimeWindow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Weight of each dimension, summing to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskWeights {
    /// External signal magnitude
    pub signal: f64,
    /// Window length against budget
    pub budget: f64,
    /// Tolerance, density and duration
    pub window: f64,
    /// Template signal coverage
    pub coverage: f64,
}

impl RiskWeights {
    /// Equal weights, used for the neutral merged profile
    #[must_use]
    pub const fn uniform() -> Self {
        Self {
            signal: 0.25,
            budget: 0.25,
            window: 0.25,
            coverage: 0.25,
        }
    }
}

/// Fixed scoring weights: 34 / 22 / 26 / 18 percent
pub const RISK_WEIGHTS: RiskWeights = RiskWeights {
    signal: 0.34,
    budget: 0.22,
    window: 0.26,
    coverage: 0.18,
};

/// Dimension scores, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskDimensions {
    /// Mean absolute signal magnitude
    pub signal: f64,
    /// Window length relative to budget
    pub budget: f64,
    /// Tolerance, density and short-duration pressure
    pub window: f64,
    /// Observed over required signal names
    pub coverage: f64,
}

impl RiskDimensions {
    /// Weighted sum, rounded and clamped to 0..=100
    #[must_use]
    pub fn weighted(&self, weights: &RiskWeights) -> u8 {
        let total = weights.signal * self.signal
            + weights.budget * self.budget
            + weights.window * self.window
            + weights.coverage * self.coverage;
        bounded(total.round(), 0.0, 100.0) as u8
    }

    /// Unweighted mean
    #[must_use]
    pub fn mean(&self) -> f64 {
        (self.signal + self.budget + self.window + self.coverage) / 4.0
    }
}

/// What the scorer needs to know about one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskInput {
    /// Candidate being scored
    pub candidate_id: CandidateId,
    /// Window the candidate would occupy
    pub window: TimeWindow,
    /// Budget the candidate runs under
    pub budget: PlanBudget,
    /// External signals
    #[serde(default)]
    pub signals: Vec<Signal>,
    /// Signal names the program template expects
    #[serde(default)]
    pub required_signals: Vec<String>,
    /// Signals per step
    #[serde(default)]
    pub signal_density: f64,
    /// Expected duration in minutes
    #[serde(default)]
    pub duration_minutes: f64,
}

/// Full scoring result for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    /// Scored candidate
    pub candidate_id: CandidateId,
    /// Weighted score 0..=100
    pub score: u8,
    /// Unweighted mean of the dimensions
    pub baseline: f64,
    /// Band for `score`
    pub classification: RiskClassification,
    /// Dimension scores
    pub dimensions: RiskDimensions,
    /// Weights applied
    pub weights: RiskWeights,
    /// Human-readable scoring trail
    pub rationale: Vec<String>,
    /// Suggested mitigations
    pub hints: Vec<String>,
}

impl RiskAssessment {
    /// Summary view without per-dimension detail
    #[must_use]
    pub fn profile(&self) -> RiskProfile {
        RiskProfile {
            weights: self.weights,
            score: self.score,
            baseline: self.baseline,
            classification: self.classification,
            rationale: self.rationale.clone(),
        }
    }
}

/// Aggregate risk view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskProfile {
    /// Dimension weights
    pub weights: RiskWeights,
    /// Aggregate score 0..=100
    pub score: u8,
    /// Unweighted mean of the dimensions
    pub baseline: f64,
    /// Band for `score`
    pub classification: RiskClassification,
    /// Scoring trail
    pub rationale: Vec<String>,
}

/// Clamp that maps NaN to the lower bound
pub(crate) fn bounded(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        lo
    } else {
        value.clamp(lo, hi)
    }
}

fn signal_score(signals: &[Signal]) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }
    let total: f64 = signals.iter().map(|s| s.magnitude.abs()).sum();
    bounded(total / signals.len() as f64, 0.0, 100.0)
}

fn budget_score(window: &TimeWindow, budget: &PlanBudget) -> f64 {
    let capacity = budget.budget_minutes + budget.budget_cost_units + 1.0;
    bounded(window.length_minutes() / capacity * 100.0, 10.0, 100.0)
}

fn window_score(input: &RiskInput) -> f64 {
    let raw = input.budget.risk_tolerance * 12.0
        + input.signal_density * 4.0
        + (120.0 - input.duration_minutes).max(0.0);
    bounded(raw, 0.0, 100.0)
}

fn coverage_score(signals: &[Signal], required: &[String]) -> f64 {
    let required: BTreeSet<&str> = required.iter().map(String::as_str).collect();
    if required.is_empty() {
        return 0.0;
    }
    let observed: BTreeSet<&str> = signals.iter().map(|s| s.name.as_str()).collect();
    bounded(observed.len() as f64 / required.len() as f64 * 120.0, 0.0, 100.0)
}

/// Score one candidate
///
/// `max_window_minutes` only drives the `shrink-window` hint.
#[must_use]
pub fn evaluate_candidate_risk(input: &RiskInput, max_window_minutes: f64) -> RiskAssessment {
    let dimensions = RiskDimensions {
        signal: signal_score(&input.signals),
        budget: budget_score(&input.window, &input.budget),
        window: window_score(input),
        coverage: coverage_score(&input.signals, &input.required_signals),
    };
    let score = dimensions.weighted(&RISK_WEIGHTS);
    let classification = RiskClassification::from_score(score);

    let rationale = vec![
        format!("signal={:.0}", dimensions.signal),
        format!("budget={:.0}", dimensions.budget),
        format!("window={:.0}", dimensions.window),
        format!("coverage={:.0}", dimensions.coverage),
        format!("band={}", classification),
    ];

    let mut hints = Vec::new();
    if input.window.length_minutes() > max_window_minutes {
        hints.push("shrink-window".to_string());
    }
    if !input.required_signals.is_empty() && dimensions.coverage < 100.0 {
        hints.push("collect-more-signals".to_string());
    }
    if dimensions.budget >= 80.0 {
        hints.push("increase-budget".to_string());
    }
    if input.signals.is_empty() {
        hints.push("no-signals".to_string());
    }

    tracing::debug!(
        candidate_id = %input.candidate_id,
        score,
        classification = %classification,
        "scored candidate risk"
    );

    RiskAssessment {
        candidate_id: input.candidate_id.clone(),
        score,
        baseline: dimensions.mean(),
        classification,
        dimensions,
        weights: RISK_WEIGHTS,
        rationale,
        hints,
    }
}
