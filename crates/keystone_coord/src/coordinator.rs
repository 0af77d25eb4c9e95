//! Coordination attempt pipeline.
//!
//! [`Coordinator::run_attempt`] drives one program from submission to a
//! recorded selection: build the graph, generate and assess candidates,
//! consult the policy and risk engines, select, persist and announce. The
//! attempt's [`CoordinationState`] records every phase it passes through.

use crate::assess::{assess_candidate, CandidateAssessment};
use crate::config::CoordinatorConfig;
use crate::engine::{EvaluationRequest, GatePolicyEngine, PolicyEngine, RiskEngine, ThresholdRiskEngine};
use crate::error::{CoordinationError, CoordinationResult};
use crate::notify::{AttemptNotifier, TracingNotifier};
use crate::selector::{select_candidate, Decision, SelectionResult};
use crate::state::{CoordinationState, Phase};
use crate::store::{CoordinationRecord, CoordinationStore, InMemoryStore};
use keystone_core::{
    validate_program, Clock, Constraint, CorrelationId, ExternalBudget, PlanBudget, Program,
    RecordId, RunId, StepId, SystemClock, TenantId, TimeWindow,
};
use keystone_gate::{GateState, PolicyProfile};
use keystone_graph::build_graph;
use keystone_plan::{CandidateGenerator, GenerateError, PlanCandidate};
use keystone_risk::{merge_risk_summaries, RiskAssessment, RiskProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input to one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRequest {
    /// Program to plan
    pub program: Program,
    /// Attempt budget
    pub budget: PlanBudget,
    /// Reference budget for the gate's budget check
    pub external_budget: ExternalBudget,
    /// Thresholds; the configured default when absent
    pub profile: Option<PolicyProfile>,
    /// Feature flags
    pub gate_state: GateState,
    /// Caller-supplied correlation ID; generated when absent
    pub correlation_id: Option<CorrelationId>,
}

impl AttemptRequest {
    /// Request with the budget as its own reference
    #[must_use]
    pub fn new(program: Program, budget: PlanBudget) -> Self {
        Self {
            program,
            external_budget: ExternalBudget::new(budget.budget_minutes, budget.budget_cost_units),
            budget,
            profile: None,
            gate_state: GateState::default(),
            correlation_id: None,
        }
    }

    /// Set the reference budget
    #[must_use]
    pub fn with_external_budget(mut self, external: ExternalBudget) -> Self {
        self.external_budget = external;
        self
    }

    /// Set the thresholds
    #[must_use]
    pub fn with_profile(mut self, profile: PolicyProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the feature flags
    #[must_use]
    pub fn with_gate_state(mut self, state: GateState) -> Self {
        self.gate_state = state;
        self
    }

    /// Set the correlation ID
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Planning output of an attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptPlan {
    /// Budget the attempt ran under
    pub budget: PlanBudget,
    /// Nodes in the execution graph
    pub topology_nodes: usize,
    /// Candidates in generation order
    pub candidates: Vec<PlanCandidate>,
    /// Per-candidate assessments, same order
    pub assessments: Vec<CandidateAssessment>,
    /// Merged risk across candidates
    pub merged_risk: RiskProfile,
}

/// Outcome of a completed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationAttemptReport {
    /// Attempt run ID
    pub run_id: RunId,
    /// Correlation ID
    pub correlation_id: CorrelationId,
    /// Tenant
    pub tenant: TenantId,
    /// Whether the decision was `approved`
    pub accepted: bool,
    /// Planning output
    pub plan: AttemptPlan,
    /// Selection outcome
    pub selection: SelectionResult,
    /// Final state
    pub state: CoordinationState,
}

/// Runs coordination attempts against external collaborators
pub struct Coordinator {
    config: Arc<CoordinatorConfig>,
    policy: Arc<dyn PolicyEngine>,
    risk: Arc<dyn RiskEngine>,
    store: Arc<dyn CoordinationStore>,
    notifier: Arc<dyn AttemptNotifier>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator on the wall clock
    #[must_use]
    pub fn new(
        config: Arc<CoordinatorConfig>,
        policy: Arc<dyn PolicyEngine>,
        risk: Arc<dyn RiskEngine>,
        store: Arc<dyn CoordinationStore>,
        notifier: Arc<dyn AttemptNotifier>,
    ) -> Self {
        Self {
            config,
            policy,
            risk,
            store,
            notifier,
            clock: Arc::new(SystemClock),
        }
    }

    /// Coordinator wired to the bundled engines, an in-memory store and a
    /// logging notifier
    #[must_use]
    pub fn bundled(config: Arc<CoordinatorConfig>) -> Self {
        let risk = ThresholdRiskEngine::new(config.risk_defer_at);
        Self::new(
            config,
            Arc::new(GatePolicyEngine),
            Arc::new(risk),
            Arc::new(InMemoryStore::new()),
            Arc::new(TracingNotifier),
        )
    }

    /// Use a different clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get configuration
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run one attempt end to end
    ///
    /// # Errors
    ///
    /// Returns error if the program is invalid or cyclic, the budget is not
    /// positive, a critical constraint forces an abort, an engine fails, or
    /// the record cannot be saved or announced
    #[tracing::instrument(
        skip_all,
        fields(program_id = %request.program.id, tenant = %request.program.tenant)
    )]
    pub async fn run_attempt(
        &self,
        request: AttemptRequest,
    ) -> CoordinationResult<CoordinationAttemptReport> {
        let run_id = RunId::generate();
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(CorrelationId::generate);
        let mut state = CoordinationState::new(run_id.clone(), self.clock.now());

        let result = self.attempt(request, correlation_id, &mut state).await;
        match &result {
            Ok(report) => tracing::info!(
                run_id = %run_id,
                decision = %report.selection.decision,
                accepted = report.accepted,
                "coordination attempt complete"
            ),
            Err(err) => tracing::warn!(
                run_id = %run_id,
                phase = %state.phase,
                code = err.code(),
                error = %err,
                "coordination attempt failed"
            ),
        }
        result
    }

    async fn attempt(
        &self,
        request: AttemptRequest,
        correlation_id: CorrelationId,
        state: &mut CoordinationState,
    ) -> CoordinationResult<CoordinationAttemptReport> {
        let AttemptRequest {
            program,
            budget,
            external_budget,
            profile,
            gate_state,
            ..
        } = request;

        // Discovery
        state.transition(Phase::Discovery, self.clock.now())?;
        if self.config.validate_programs {
            validate_program(&program)?;
        }

        let graph = build_graph(&program.steps);
        if !program.steps.is_empty() && graph.detect_cycle() {
            return Err(CoordinationError::CycleDetected {
                program_id: program.id.clone(),
                blocked: graph
                    .blocked_nodes()
                    .into_iter()
                    .map(StepId::into_inner)
                    .collect(),
            });
        }
        if !budget.is_positive() {
            return Err(CoordinationError::InvalidBudget {
                max_parallelism: budget.max_parallelism,
                max_runtime_minutes: budget.max_runtime_minutes,
            });
        }

        let critical: Vec<&Constraint> = program.critical_constraints().collect();
        if !critical.is_empty() {
            return Err(self.abort(&program, &critical, state).await);
        }

        // Planning
        state.transition(Phase::Planning, self.clock.now())?;
        let generator = CandidateGenerator::new(
            self.config
                .generator
                .clone()
                .with_created_by(self.config.created_by.clone()),
        )
        .with_clock(Arc::clone(&self.clock));
        let candidates = generator
            .generate(&program, &graph, &budget)
            .map_err(|err| match err {
                GenerateError::CyclicGraph { blocked } => CoordinationError::CycleDetected {
                    program_id: program.id.clone(),
                    blocked,
                },
            })?;
        if candidates.is_empty() {
            return Err(CoordinationError::NoCandidates);
        }

        let profile = profile.unwrap_or_else(|| self.config.default_profile.clone());
        let assessments = candidates
            .iter()
            .map(|candidate| {
                assess_candidate(
                    &program,
                    candidate,
                    &budget,
                    &external_budget,
                    &profile,
                    &gate_state,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let risks: Vec<RiskAssessment> = assessments.iter().map(|a| a.risk.clone()).collect();
        let merged_risk = merge_risk_summaries(&risks);
        tracing::debug!(
            candidates = candidates.len(),
            merged_score = merged_risk.score,
            "candidates assessed"
        );

        // Selection
        state.transition(Phase::Selection, self.clock.now())?;
        let evaluation = EvaluationRequest {
            program_id: program.id.clone(),
            tenant: program.tenant.clone(),
            candidates,
            assessments,
            merged_risk,
        };
        let (policy, risk) = futures::try_join!(
            async {
                self.policy
                    .evaluate(&evaluation)
                    .await
                    .map_err(CoordinationError::PolicyEngine)
            },
            async {
                self.risk
                    .assess(&evaluation)
                    .await
                    .map_err(CoordinationError::RiskEngine)
            },
        )?;
        let selection = select_candidate(
            &evaluation.candidates,
            &program.constraints,
            &policy,
            &risk,
            self.clock.now(),
        )?;

        // Delivery
        state.transition(Phase::Delivery, self.clock.now())?;
        let tenant = program.tenant.clone();
        let record = CoordinationRecord {
            record_id: RecordId::generate(),
            tenant: tenant.clone(),
            run_id: state.run_id.clone(),
            window: TimeWindow::starting_at(
                program.run_window.start,
                selection.chosen.metadata.expected_completion_minutes,
            ),
            candidate: selection.chosen.clone(),
            program,
            selection: selection.clone(),
            archived: false,
            created_at: self.clock.now(),
            tags: self.config.record_tags.clone(),
        };
        self.store
            .save(&record)
            .await
            .map_err(CoordinationError::Persistence)?;

        let EvaluationRequest {
            candidates,
            assessments,
            merged_risk,
            ..
        } = evaluation;
        let mut report = CoordinationAttemptReport {
            run_id: state.run_id.clone(),
            correlation_id,
            tenant,
            accepted: selection.decision == Decision::Approved,
            plan: AttemptPlan {
                budget,
                topology_nodes: graph.node_count(),
                candidates,
                assessments,
                merged_risk,
            },
            selection,
            state: state.clone(),
        };
        self.notifier
            .announce(&report)
            .await
            .map_err(CoordinationError::Notification)?;

        state.transition(Phase::Complete, self.clock.now())?;
        report.state = state.clone();
        Ok(report)
    }

    /// Move to abort and persist an audit stub; returns the error the
    /// attempt fails with
    async fn abort(
        &self,
        program: &Program,
        critical: &[&Constraint],
        state: &mut CoordinationState,
    ) -> CoordinationError {
        let now = self.clock.now();
        if let Err(err) = state.transition(Phase::Abort, now) {
            return err;
        }

        let decision = if critical.iter().any(|c| c.hard_limit.is_some()) {
            Decision::Blocked
        } else {
            Decision::Deferred
        };
        let constraints: Vec<String> = critical.iter().map(|c| c.id.to_string()).collect();
        let stub = PlanCandidate::empty(&program.id, now, &self.config.created_by);
        let record = CoordinationRecord {
            record_id: RecordId::generate(),
            tenant: program.tenant.clone(),
            run_id: state.run_id.clone(),
            program: program.clone(),
            selection: SelectionResult {
                chosen: stub.clone(),
                alternatives: Vec::new(),
                scores: Vec::new(),
                decision,
                blocked_constraints: constraints.clone(),
                reasons: constraints
                    .iter()
                    .map(|id| format!("constraint {id} classified critical"))
                    .collect(),
                selected_at: now,
            },
            window: program.run_window,
            candidate: stub,
            archived: false,
            created_at: now,
            tags: self.config.record_tags.clone(),
        };

        tracing::warn!(
            run_id = %state.run_id,
            decision = %decision,
            constraints = ?constraints,
            "aborting on critical constraints"
        );
        match self.store.save(&record).await {
            Ok(()) => CoordinationError::ConstraintBlocked {
                constraints,
                decision,
            },
            Err(err) => CoordinationError::Persistence(err),
        }
    }
}
