//! Recovery program data model.
//!
//! A [`Program`] arrives from the caller and is read-only for the whole
//! coordination attempt. Everything the planner derives from it (graph,
//! candidates, scores) is recomputed per attempt.

use crate::id::{ConstraintId, ProgramId, StepId, TenantId};
use crate::time::TimeWindow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How much damage a step can do if it goes wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// Routine step
    Low,
    /// Default
    #[default]
    Medium,
    /// Touches shared infrastructure
    High,
    /// Irreversible or customer-facing
    Critical,
}

impl Criticality {
    /// Weight used by the candidate risk index
    #[must_use]
    pub const fn weight(self) -> f64 {
        match self {
            Self::Low => 0.1,
            Self::Medium => 0.3,
            Self::High => 0.6,
            Self::Critical => 1.0,
        }
    }
}

/// Four-level risk band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskClassification {
    /// Score below 41
    Safe,
    /// Score 41 to 62
    Caution,
    /// Score 63 to 81
    Danger,
    /// Score 82 and above
    Critical,
}

impl RiskClassification {
    /// Band for a 0..100 score; lower bounds are inclusive
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=40 => Self::Safe,
            41..=62 => Self::Caution,
            63..=81 => Self::Danger,
            _ => Self::Critical,
        }
    }

    /// Stable lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Danger => "danger",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of recovery work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step ID
    pub id: StepId,
    /// Human-readable title
    #[serde(default)]
    pub title: String,
    /// Command an operator or worker would run
    #[serde(default)]
    pub command: String,
    /// Steps that must finish before this one starts
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    /// Estimated duration in minutes
    #[serde(default)]
    pub duration_minutes: f64,
    /// Criticality tag
    #[serde(default)]
    pub criticality: Criticality,
    /// Number of approvals already collected
    #[serde(default)]
    pub approvals: u32,
}

impl Step {
    /// Create a step with no dependencies
    #[must_use]
    pub fn new(id: impl Into<StepId>) -> Self {
        let id = id.into();
        Self {
            title: id.to_string(),
            id,
            command: String::new(),
            depends_on: Vec::new(),
            duration_minutes: 0.0,
            criticality: Criticality::default(),
            approvals: 0,
        }
    }

    /// Add a prerequisite
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<StepId>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    /// Set estimated duration
    #[must_use]
    pub fn with_duration(mut self, minutes: f64) -> Self {
        self.duration_minutes = minutes;
        self
    }

    /// Set criticality
    #[must_use]
    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = criticality;
        self
    }

    /// Set approval count
    #[must_use]
    pub fn with_approvals(mut self, approvals: u32) -> Self {
        self.approvals = approvals;
        self
    }
}

/// Kind of limit a constraint expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    /// Ordering between steps
    Ordering,
    /// Concurrency or resource capacity
    #[default]
    Capacity,
    /// Human approval requirement
    Approval,
    /// Change-window restriction
    Window,
    /// Regulatory or contractual rule
    Compliance,
}

/// A policy-defined limit supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    /// Constraint ID
    pub id: ConstraintId,
    /// Kind of limit
    #[serde(default)]
    pub kind: ConstraintKind,
    /// Importance in [0, 1]
    #[serde(default)]
    pub weight: f64,
    /// Free-form scope label
    #[serde(default)]
    pub scope: String,
    /// Steps this constraint applies to
    #[serde(default)]
    pub affected_step_ids: Vec<StepId>,
    /// Soft limit, if any
    #[serde(default)]
    pub soft_limit: Option<f64>,
    /// Hard limit, if any
    #[serde(default)]
    pub hard_limit: Option<f64>,
    /// Pre-computed classification from an upstream assessor
    #[serde(default)]
    pub classification: Option<RiskClassification>,
}

impl Constraint {
    /// Create a constraint
    #[must_use]
    pub fn new(id: impl Into<ConstraintId>, kind: ConstraintKind, weight: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            weight,
            scope: String::new(),
            affected_step_ids: Vec::new(),
            soft_limit: None,
            hard_limit: None,
            classification: None,
        }
    }

    /// Attach an affected step
    #[must_use]
    pub fn affecting(mut self, step: impl Into<StepId>) -> Self {
        self.affected_step_ids.push(step.into());
        self
    }

    /// Set the pre-computed classification
    #[must_use]
    pub fn classified(mut self, classification: RiskClassification) -> Self {
        self.classification = Some(classification);
        self
    }

    /// Set the hard limit
    #[must_use]
    pub fn with_hard_limit(mut self, limit: f64) -> Self {
        self.hard_limit = Some(limit);
        self
    }

    /// Whether the constraint was pre-classified critical
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.classification == Some(RiskClassification::Critical)
    }
}

/// Where in the incident lifecycle the program sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramPhase {
    /// Impact still being assessed
    Triage,
    /// Bleeding being stopped
    Mitigation,
    /// Service being restored
    #[default]
    Recovery,
    /// Post-incident hardening
    Review,
}

/// An external observation feeding the risk scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    /// Signal name
    pub name: String,
    /// Magnitude, any sign
    pub magnitude: f64,
}

impl Signal {
    /// Create a signal
    #[must_use]
    pub fn new(name: impl Into<String>, magnitude: f64) -> Self {
        Self {
            name: name.into(),
            magnitude,
        }
    }
}

/// A recovery program submitted for coordination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Program {
    /// Program ID
    pub id: ProgramId,
    /// Owning tenant
    pub tenant: TenantId,
    /// Steps
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Constraints
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Window the program is allowed to run in
    pub run_window: TimeWindow,
    /// Lifecycle phase
    #[serde(default)]
    pub phase: ProgramPhase,
    /// Observed signals
    #[serde(default)]
    pub signals: Vec<Signal>,
    /// Signal names the program template expects
    #[serde(default)]
    pub required_signals: Vec<String>,
}

impl Program {
    /// Create an empty program
    #[must_use]
    pub fn new(id: impl Into<ProgramId>, tenant: impl Into<TenantId>, run_window: TimeWindow) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
            steps: Vec::new(),
            constraints: Vec::new(),
            run_window,
            phase: ProgramPhase::default(),
            signals: Vec::new(),
            required_signals: Vec::new(),
        }
    }

    /// Add a step
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Add a constraint
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Add a signal
    #[must_use]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signals.push(signal);
        self
    }

    /// Get step by ID
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Distinct observed signal names
    #[must_use]
    pub fn observed_signal_names(&self) -> BTreeSet<&str> {
        self.signals.iter().map(|s| s.name.as_str()).collect()
    }

    /// Constraints pre-classified critical
    pub fn critical_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.is_critical())
    }
}

/// Resource and time budget for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanBudget {
    /// Maximum steps running at once
    pub max_parallelism: i64,
    /// Hard runtime ceiling in minutes
    pub max_runtime_minutes: i64,
    /// Operator minutes allotted
    #[serde(default)]
    pub budget_minutes: f64,
    /// Cost units allotted
    #[serde(default)]
    pub budget_cost_units: f64,
    /// Appetite for risk; negative values are invalid
    #[serde(default)]
    pub risk_tolerance: f64,
}

impl PlanBudget {
    /// Budget with the given ceilings; operator minutes default to the runtime
    #[must_use]
    pub fn new(max_parallelism: i64, max_runtime_minutes: i64) -> Self {
        Self {
            max_parallelism,
            max_runtime_minutes,
            budget_minutes: max_runtime_minutes as f64,
            budget_cost_units: 0.0,
            risk_tolerance: 1.0,
        }
    }

    /// Set operator minutes
    #[must_use]
    pub fn with_budget_minutes(mut self, minutes: f64) -> Self {
        self.budget_minutes = minutes;
        self
    }

    /// Set cost units
    #[must_use]
    pub fn with_cost_units(mut self, units: f64) -> Self {
        self.budget_cost_units = units;
        self
    }

    /// Set risk tolerance
    #[must_use]
    pub fn with_risk_tolerance(mut self, tolerance: f64) -> Self {
        self.risk_tolerance = tolerance;
        self
    }

    /// Whether the hard ceilings are positive
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.max_parallelism > 0 && self.max_runtime_minutes > 0
    }
}

/// Reference budget a candidate's own budget is checked against
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalBudget {
    /// Operator minutes
    pub budget_minutes: f64,
    /// Cost units
    pub budget_cost_units: f64,
}

impl ExternalBudget {
    /// Create a reference budget
    #[must_use]
    pub fn new(budget_minutes: f64, budget_cost_units: f64) -> Self {
        Self {
            budget_minutes,
            budget_cost_units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_classification_bands() {
        assert_eq!(RiskClassification::from_score(0), RiskClassification::Safe);
        assert_eq!(RiskClassification::from_score(40), RiskClassification::Safe);
        assert_eq!(RiskClassification::from_score(41), RiskClassification::Caution);
        assert_eq!(RiskClassification::from_score(62), RiskClassification::Caution);
        assert_eq!(RiskClassification::from_score(63), RiskClassification::Danger);
        assert_eq!(RiskClassification::from_score(81), RiskClassification::Danger);
        assert_eq!(RiskClassification::from_score(82), RiskClassification::Critical);
        assert_eq!(RiskClassification::from_score(100), RiskClassification::Critical);
    }

    #[test]
    fn test_classification_ordering() {
        assert!(RiskClassification::Safe < RiskClassification::Caution);
        assert!(RiskClassification::Danger < RiskClassification::Critical);
    }

    #[test]
    fn test_program_builder() {
        let program = Program::new("prog-1", "acme", window())
            .with_step(Step::new("a"))
            .with_step(Step::new("b").depends_on("a"))
            .with_constraint(
                Constraint::new("c1", ConstraintKind::Approval, 0.9)
                    .affecting("b")
                    .classified(RiskClassification::Critical),
            );

        assert_eq!(program.steps.len(), 2);
        assert_eq!(program.step(&StepId::new("b")).unwrap().depends_on.len(), 1);
        assert_eq!(program.critical_constraints().count(), 1);
    }

    #[test]
    fn test_observed_signal_names_are_distinct() {
        let program = Program::new("prog-1", "acme", window())
            .with_signal(Signal::new("latency", 40.0))
            .with_signal(Signal::new("latency", 60.0))
            .with_signal(Signal::new("errors", -10.0));

        let names: Vec<&str> = program.observed_signal_names().into_iter().collect();
        assert_eq!(names, vec!["errors", "latency"]);
    }

    #[test]
    fn test_budget_positive() {
        assert!(PlanBudget::new(2, 60).is_positive());
        assert!(!PlanBudget::new(0, 60).is_positive());
        assert!(!PlanBudget::new(2, -1).is_positive());
    }

    #[test]
    fn test_program_deserializes_camel_case() {
        let json = r#"{
            "id": "prog-1",
            "tenant": "acme",
            "steps": [
                {"id": "a", "durationMinutes": 10},
                {"id": "b", "dependsOn": ["a"], "criticality": "high"}
            ],
            "constraints": [
                {"id": "c1", "kind": "approval", "weight": 0.9, "affectedStepIds": ["b"]}
            ],
            "runWindow": {"start": "2026-03-01T10:00:00Z", "end": "2026-03-01T12:00:00Z"}
        }"#;

        let program: Program = serde_json::from_str(json).unwrap();
        assert_eq!(program.steps[0].duration_minutes, 10.0);
        assert_eq!(program.steps[1].criticality, Criticality::High);
        assert_eq!(program.constraints[0].affected_step_ids, vec![StepId::new("b")]);
        assert_eq!(program.phase, ProgramPhase::Recovery);
        assert!(program.signals.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn prop_classification_is_monotonic(a in 0u8..=100, b in 0u8..=100) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            proptest::prop_assert!(
                RiskClassification::from_score(lo) <= RiskClassification::from_score(hi)
            );
        }
    }
}
