//! End-to-end coordination attempts.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use keystone_coord::{
    AttemptRequest, ChannelNotifier, CoordinationError, CoordinationRecord, CoordinationStore,
    Coordinator, CoordinatorConfig, Decision, EngineError, EvaluationRequest, GatePolicyEngine,
    InMemoryStore, Phase, PolicyEngine, PolicyEngineDecision, StoreError, ThresholdRiskEngine,
};
use keystone_core::{
    Constraint, ConstraintKind, FixedClock, PlanBudget, Program, RecordId, RiskClassification,
    Signal, Step, StepId, TenantId, TimeWindow,
};
use keystone_gate::PolicyProfile;
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
}

fn chain() -> Program {
    Program::new(
        "restore-db",
        "acme",
        TimeWindow::new(start(), start() + Duration::hours(4)),
    )
    .with_step(Step::new("a").with_duration(10.0))
    .with_step(Step::new("b").depends_on("a").with_duration(10.0))
    .with_step(Step::new("c").depends_on("b").with_duration(10.0))
    .with_signal(Signal::new("error-rate", 10.0))
}

fn budget() -> PlanBudget {
    PlanBudget::new(2, 60)
}

fn request(program: Program) -> AttemptRequest {
    AttemptRequest::new(program, budget()).with_profile(PolicyProfile::permissive())
}

fn ids(steps: &[StepId]) -> Vec<&str> {
    steps.iter().map(StepId::as_str).collect()
}

struct Harness {
    coordinator: Coordinator,
    store: Arc<InMemoryStore>,
    reports: tokio::sync::mpsc::UnboundedReceiver<keystone_coord::CoordinationAttemptReport>,
}

fn harness() -> Harness {
    harness_with(Arc::new(GatePolicyEngine), ThresholdRiskEngine::default())
}

fn harness_with(policy: Arc<dyn PolicyEngine>, risk: ThresholdRiskEngine) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let (notifier, reports) = ChannelNotifier::channel();
    let coordinator = Coordinator::new(
        Arc::new(CoordinatorConfig::default().with_record_tag("drill")),
        policy,
        Arc::new(risk),
        store.clone(),
        Arc::new(notifier),
    )
    .with_clock(Arc::new(FixedClock::new(start())));
    Harness {
        coordinator,
        store,
        reports,
    }
}

#[tokio::test]
async fn test_linear_chain_is_approved() {
    let mut h = harness();
    let report = h
        .coordinator
        .run_attempt(request(chain()).with_correlation_id("corr-1"))
        .await
        .unwrap();

    assert!(report.accepted);
    assert_eq!(report.correlation_id.as_str(), "corr-1");
    assert_eq!(report.tenant.as_str(), "acme");
    assert_eq!(report.selection.decision, Decision::Approved);
    assert!(report.selection.blocked_constraints.is_empty());

    let plan = &report.plan;
    assert_eq!(plan.topology_nodes, 3);
    assert_eq!(plan.candidates.len(), 2);
    assert_eq!(ids(&plan.candidates[0].sequence), vec!["a", "b", "c"]);
    assert_eq!(ids(&plan.candidates[1].sequence), vec!["c", "b", "a"]);
    assert!(plan.assessments.iter().all(|a| a.passed()));
    assert_eq!(plan.merged_risk.classification, RiskClassification::Safe);
    assert_eq!(plan.candidates[0].created_by, "keystone-coordinator");

    assert_eq!(report.selection.chosen.id.as_str(), "restore-db:default");
    assert_eq!(report.selection.alternatives.len(), 1);

    assert_eq!(report.state.phase, Phase::Complete);
    assert_eq!(report.state.progress_percent, 100);
    assert_eq!(report.state.history.len(), 5);
    assert_eq!(report.state.completed_at, Some(start()));

    let records = h.store.list(&TenantId::new("acme")).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].run_id, report.run_id);
    assert_eq!(records[0].candidate.id, report.selection.chosen.id);
    assert_eq!(records[0].tags, vec!["drill"]);
    assert_eq!(records[0].window.length_minutes(), 18.0);

    let announced = h.reports.recv().await.unwrap();
    assert_eq!(announced.run_id, report.run_id);
    assert_eq!(announced.state.phase, Phase::Delivery);
}

#[tokio::test]
async fn test_generated_correlation_id() {
    let h = harness();
    let report = h.coordinator.run_attempt(request(chain())).await.unwrap();
    assert!(!report.correlation_id.is_empty());
    assert_ne!(report.correlation_id.as_str(), report.run_id.as_str());
}

#[tokio::test]
async fn test_cycle_fails_before_planning() {
    let h = harness();
    let program = Program::new(
        "loop",
        "acme",
        TimeWindow::new(start(), start() + Duration::hours(1)),
    )
    .with_step(Step::new("a").depends_on("b"))
    .with_step(Step::new("b").depends_on("a"));

    let err = h.coordinator.run_attempt(request(program)).await.unwrap_err();
    assert_eq!(err.code(), "coordination-cycle-detected");
    assert!(matches!(err, CoordinationError::CycleDetected { ref blocked, .. }
        if blocked == &vec!["a".to_string(), "b".to_string()]));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_non_positive_budget() {
    let h = harness();
    let req = AttemptRequest::new(chain(), PlanBudget::new(0, 60));
    let err = h.coordinator.run_attempt(req).await.unwrap_err();
    assert_eq!(
        err,
        CoordinationError::InvalidBudget {
            max_parallelism: 0,
            max_runtime_minutes: 60
        }
    );

    let req = AttemptRequest::new(chain(), PlanBudget::new(2, -5));
    let err = h.coordinator.run_attempt(req).await.unwrap_err();
    assert_eq!(err.code(), "coordination-invalid-budget");
}

#[tokio::test]
async fn test_invalid_program_rejected() {
    let h = harness();
    let program = Program::new(
        "restore-db",
        "",
        TimeWindow::new(start(), start() + Duration::hours(1)),
    );
    let err = h.coordinator.run_attempt(request(program)).await.unwrap_err();
    assert_eq!(err.code(), "coordination-invalid-program");
}

#[tokio::test]
async fn test_heavy_constraint_tie_keeps_default() {
    let h = harness();
    let program = chain().with_constraint(
        Constraint::new("db-capacity", ConstraintKind::Capacity, 0.9).affecting("b"),
    );

    let report = h.coordinator.run_attempt(request(program)).await.unwrap();
    let scores = &report.selection.scores;
    assert_eq!(scores[0].penalties, 1);
    assert_eq!(scores[1].penalties, 1);
    assert_eq!(scores[0].score, scores[1].score);
    assert_eq!(report.selection.chosen.id.as_str(), "restore-db:default");
}

#[tokio::test]
async fn test_critical_constraint_aborts_with_blocked_stub() {
    let h = harness();
    let program = chain().with_constraint(
        Constraint::new("change-freeze", ConstraintKind::Window, 0.5)
            .classified(RiskClassification::Critical)
            .with_hard_limit(0.0),
    );

    let err = h.coordinator.run_attempt(request(program)).await.unwrap_err();
    assert_eq!(
        err,
        CoordinationError::ConstraintBlocked {
            constraints: vec!["change-freeze".to_string()],
            decision: Decision::Blocked,
        }
    );

    let records = h.store.list(&TenantId::new("acme")).await.unwrap();
    assert_eq!(records.len(), 1);
    let stub = &records[0];
    assert!(stub.candidate.sequence.is_empty());
    assert_eq!(stub.selection.decision, Decision::Blocked);
    assert_eq!(stub.selection.blocked_constraints, vec!["change-freeze"]);
    assert_eq!(stub.window, stub.program.run_window);
}

#[tokio::test]
async fn test_critical_constraint_without_hard_limit_defers() {
    let h = harness();
    let program = chain().with_constraint(
        Constraint::new("cab-review", ConstraintKind::Approval, 0.5)
            .classified(RiskClassification::Critical),
    );

    let err = h.coordinator.run_attempt(request(program)).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinationError::ConstraintBlocked {
            decision: Decision::Deferred,
            ..
        }
    ));
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn test_gate_failure_blocks_but_completes() {
    let h = harness();
    let req = AttemptRequest::new(chain(), budget())
        .with_profile(PolicyProfile::default().with_min_signals(2));

    let report = h.coordinator.run_attempt(req).await.unwrap();
    assert!(!report.accepted);
    assert_eq!(report.selection.decision, Decision::Blocked);
    assert!(report
        .selection
        .blocked_constraints
        .contains(&"insufficient_signal_coverage".to_string()));
    assert!(report
        .selection
        .reasons
        .contains(&"gate.signal-coverage: insufficient_signal_coverage".to_string()));
    assert_eq!(report.state.phase, Phase::Complete);
}

#[tokio::test]
async fn test_default_profile_approves_linear_chain() {
    let h = harness();
    let report = h
        .coordinator
        .run_attempt(AttemptRequest::new(chain(), budget()))
        .await
        .unwrap();

    assert!(report.accepted);
    assert_eq!(report.selection.decision, Decision::Approved);
    assert!(report.selection.blocked_constraints.is_empty());
    assert!(report.plan.assessments.iter().all(|a| a.passed()));
}

#[tokio::test]
async fn test_oversized_duration_saturates_window() {
    let h = harness();
    let program = Program::new(
        "restore-archive",
        "acme",
        TimeWindow::new(start(), start() + Duration::hours(4)),
    )
    .with_step(Step::new("a").with_duration(1.0e12))
    .with_step(Step::new("b").depends_on("a").with_duration(10.0))
    .with_signal(Signal::new("error-rate", 10.0));

    let report = h.coordinator.run_attempt(request(program)).await.unwrap();
    assert_eq!(report.state.phase, Phase::Complete);

    let records = h.store.list(&TenantId::new("acme")).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].window.start, start());
    assert_eq!(records[0].window.end, DateTime::<Utc>::MAX_UTC);
}

#[tokio::test]
async fn test_risk_engine_defers() {
    let h = harness_with(
        Arc::new(GatePolicyEngine),
        ThresholdRiskEngine::new(RiskClassification::Safe),
    );
    let report = h.coordinator.run_attempt(request(chain())).await.unwrap();
    assert_eq!(report.selection.decision, Decision::Deferred);
    assert!(!report.accepted);
    assert!(report
        .selection
        .reasons
        .iter()
        .any(|r| r.starts_with("defer:")));
}

struct DownPolicy;

#[async_trait]
impl PolicyEngine for DownPolicy {
    async fn evaluate(&self, _: &EvaluationRequest) -> Result<PolicyEngineDecision, EngineError> {
        Err(EngineError::Unavailable {
            engine: "policy".into(),
            reason: "connection refused".into(),
        })
    }
}

#[tokio::test]
async fn test_policy_engine_failure_propagates() {
    let h = harness_with(Arc::new(DownPolicy), ThresholdRiskEngine::default());
    let err = h.coordinator.run_attempt(request(chain())).await.unwrap_err();
    assert_eq!(
        err,
        CoordinationError::PolicyEngine(EngineError::Unavailable {
            engine: "policy".into(),
            reason: "connection refused".into(),
        })
    );
    assert!(h.store.is_empty().await);
}

struct DownStore;

#[async_trait]
impl CoordinationStore for DownStore {
    async fn save(&self, _: &CoordinationRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable {
            reason: "disk full".into(),
        })
    }

    async fn get(&self, _: &RecordId) -> Result<Option<CoordinationRecord>, StoreError> {
        Ok(None)
    }

    async fn list(&self, _: &TenantId) -> Result<Vec<CoordinationRecord>, StoreError> {
        Ok(Vec::new())
    }
}

fn with_down_store() -> (Coordinator, tokio::sync::mpsc::UnboundedReceiver<keystone_coord::CoordinationAttemptReport>) {
    let (notifier, rx) = ChannelNotifier::channel();
    let coordinator = Coordinator::new(
        Arc::new(CoordinatorConfig::default()),
        Arc::new(GatePolicyEngine),
        Arc::new(ThresholdRiskEngine::default()),
        Arc::new(DownStore),
        Arc::new(notifier),
    );
    (coordinator, rx)
}

#[tokio::test]
async fn test_persistence_failure_fails_attempt() {
    let (coordinator, mut rx) = with_down_store();
    let err = coordinator.run_attempt(request(chain())).await.unwrap_err();
    assert_eq!(err.code(), "coordination-persistence");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_abort_stub_persistence_failure() {
    let (coordinator, _rx) = with_down_store();
    let program = chain().with_constraint(
        Constraint::new("freeze", ConstraintKind::Window, 0.5)
            .classified(RiskClassification::Critical),
    );
    let err = coordinator.run_attempt(request(program)).await.unwrap_err();
    assert_eq!(err.code(), "coordination-persistence");
}

#[tokio::test]
async fn test_notification_failure_fails_attempt() {
    let store = Arc::new(InMemoryStore::new());
    let (notifier, rx) = ChannelNotifier::channel();
    drop(rx);
    let coordinator = Coordinator::new(
        Arc::new(CoordinatorConfig::default()),
        Arc::new(GatePolicyEngine),
        Arc::new(ThresholdRiskEngine::default()),
        store.clone(),
        Arc::new(notifier),
    );

    let err = coordinator.run_attempt(request(chain())).await.unwrap_err();
    assert_eq!(err.code(), "coordination-notification");
    // the record was saved before delivery failed
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_bundled_coordinator() {
    let config = CoordinatorConfig::default().with_default_profile(PolicyProfile::permissive());
    let coordinator =
        Coordinator::bundled(Arc::new(config)).with_clock(Arc::new(FixedClock::new(start())));
    let report = coordinator
        .run_attempt(AttemptRequest::new(chain(), budget()))
        .await
        .unwrap();
    assert!(report.accepted);
}
