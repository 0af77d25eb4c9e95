//! Per-candidate assessment stages.
//!
//! Each candidate runs through a two-stage pipeline: `risk` scores it, then
//! `gate` checks it against the policy profile using that score.
//!
//! Gate confidence is `(1 - risk_index) * 100`. It reflects step criticality
//! and approvals only, so plan depth never lowers it.

use keystone_core::{ExternalBudget, PlanBudget, Program, TimeWindow};
use keystone_gate::{
    assess_candidate_constraints, GateCandidate, GateState, PolicyProfile, ValidationSummary,
};
use keystone_graph::{PipelineError, PipelineResult, Stage, StageError, StagePipeline};
use keystone_plan::PlanCandidate;
use keystone_risk::{evaluate_candidate_risk, RiskAssessment, RiskInput};
use serde::{Deserialize, Serialize};

/// Risk and gate results for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAssessment {
    /// Risk score
    pub risk: RiskAssessment,
    /// Gate summaries, one per check
    pub gate: Vec<ValidationSummary>,
}

impl CandidateAssessment {
    /// Whether every gate check passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.gate.iter().all(|s| s.passed)
    }
}

/// Shared state the stages read and fill in
#[derive(Debug)]
pub struct AssessmentContext<'a> {
    /// Program being planned
    pub program: &'a Program,
    /// Candidate being assessed
    pub candidate: &'a PlanCandidate,
    /// Attempt budget
    pub budget: &'a PlanBudget,
    /// Reference budget
    pub external: &'a ExternalBudget,
    /// Thresholds
    pub profile: &'a PolicyProfile,
    /// Feature flags
    pub state: &'a GateState,
    /// Filled in by the risk stage
    pub risk: Option<RiskAssessment>,
    /// Filled in by the gate stage
    pub gate: Vec<ValidationSummary>,
}

impl<'a> AssessmentContext<'a> {
    /// Window the candidate would occupy from the program's start
    #[must_use]
    pub fn window(&self) -> TimeWindow {
        TimeWindow::starting_at(
            self.program.run_window.start,
            self.candidate.metadata.expected_completion_minutes,
        )
    }

    /// Signals per scheduled step
    #[must_use]
    pub fn signal_density(&self) -> f64 {
        self.program.signals.len() as f64 / self.candidate.sequence.len().max(1) as f64
    }
}

/// Scores the candidate
#[derive(Debug, Default)]
pub struct RiskStage;

impl<'a> Stage<AssessmentContext<'a>> for RiskStage {
    fn name(&self) -> &str {
        "risk"
    }

    fn execute(&mut self, ctx: &mut AssessmentContext<'a>) -> Result<(), StageError> {
        let input = RiskInput {
            candidate_id: ctx.candidate.id.clone(),
            window: ctx.window(),
            budget: *ctx.budget,
            signals: ctx.program.signals.clone(),
            required_signals: ctx.program.required_signals.clone(),
            signal_density: ctx.signal_density(),
            duration_minutes: ctx.candidate.metadata.expected_completion_minutes,
        };
        let max_window = ctx
            .profile
            .max_window_minutes
            .unwrap_or_else(|| ctx.program.run_window.length_minutes());
        ctx.risk = Some(evaluate_candidate_risk(&input, max_window));
        Ok(())
    }
}

/// Checks the candidate against the profile
#[derive(Debug, Default)]
pub struct GateStage;

impl<'a> Stage<AssessmentContext<'a>> for GateStage {
    fn name(&self) -> &str {
        "gate"
    }

    fn depends_on(&self) -> Vec<String> {
        vec!["risk".to_string()]
    }

    fn execute(&mut self, ctx: &mut AssessmentContext<'a>) -> Result<(), StageError> {
        let risk = ctx
            .risk
            .as_ref()
            .ok_or_else(|| StageError::new("risk score missing"))?;

        let candidate = GateCandidate {
            candidate_id: ctx.candidate.id.clone(),
            window: ctx.window(),
            budget: *ctx.budget,
            signal_count: ctx.program.observed_signal_names().len(),
            confidence: ((1.0 - ctx.candidate.metadata.risk_index) * 100.0).round(),
            risk_score: f64::from(risk.score),
            signal_density: ctx.signal_density(),
        };
        ctx.gate = assess_candidate_constraints(&candidate, ctx.external, ctx.profile, ctx.state);
        Ok(())
    }
}

/// Run the risk and gate stages for one candidate
///
/// # Errors
///
/// Returns error if a stage fails
pub fn assess_candidate(
    program: &Program,
    candidate: &PlanCandidate,
    budget: &PlanBudget,
    external: &ExternalBudget,
    profile: &PolicyProfile,
    state: &GateState,
) -> PipelineResult<CandidateAssessment> {
    let mut ctx = AssessmentContext {
        program,
        candidate,
        budget,
        external,
        profile,
        state,
        risk: None,
        gate: Vec::new(),
    };

    StagePipeline::new()
        .with_stage(GateStage)
        .with_stage(RiskStage)
        .run(&mut ctx)?;

    let risk = ctx.risk.ok_or_else(|| PipelineError::StageFailed {
        stage: "risk".to_string(),
        hook: "execute",
        source: StageError::new("risk score missing"),
    })?;
    Ok(CandidateAssessment { risk, gate: ctx.gate })
}
