//! Metric snapshots and trends.

use chrono::{DateTime, Utc};
use keystone_coord::{CoordinationAttemptReport, Decision};
use keystone_core::{parse_bound, Clock, Program, RunId, SystemClock, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Metrics result type
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Ingest failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    /// A required identifier is empty
    #[error("Cannot ingest snapshot: {field} is empty")]
    MissingIdentifier {
        /// Which identifier
        field: &'static str,
    },
}

/// What one attempt looked like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    /// Attempt run ID
    pub run_id: RunId,
    /// Tenant
    pub tenant: TenantId,
    /// Capture time
    pub captured_at: DateTime<Utc>,
    /// Nodes in the execution graph
    pub topology_nodes: usize,
    /// Expected minutes of the chosen candidate
    pub candidate_completion_minutes: f64,
    /// Decision reached
    pub selected_decision: Decision,
    /// Graph nodes per submitted step
    pub throughput: f64,
    /// Chosen parallelism over the budget ceiling
    pub utilization: f64,
}

/// Averages over a set of snapshots
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTrend {
    /// Runs included, oldest first
    pub run_ids: Vec<RunId>,
    /// Mean throughput
    pub average_throughput: f64,
    /// Mean utilization
    pub utilization: f64,
    /// `average_throughput * utilization`
    pub health_score: f64,
}

/// Inclusive RFC 3339 bounds; a missing or unparsable bound is open
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrendWindow {
    /// Earliest capture time
    pub from: Option<String>,
    /// Latest capture time
    pub to: Option<String>,
}

impl TrendWindow {
    /// Window with both bounds set
    #[must_use]
    pub fn between(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }

    fn admits(&self, at: DateTime<Utc>) -> bool {
        let from = self.from.as_deref().and_then(parse_bound);
        let to = self.to.as_deref().and_then(parse_bound);
        from.is_none_or(|f| at >= f) && to.is_none_or(|t| at <= t)
    }
}

/// Collects snapshots for one process
pub struct MetricsCollector {
    snapshots: VecDeque<MetricSnapshot>,
    retention: Option<usize>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("snapshots", &self.snapshots.len())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Unbounded collector on the wall clock
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshots: VecDeque::new(),
            retention: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Keep at most `limit` snapshots, evicting the oldest
    ///
    /// A limit of 0 is raised to 1 so the latest snapshot is always held.
    #[must_use]
    pub fn with_retention(mut self, limit: usize) -> Self {
        self.retention = Some(limit.max(1));
        self
    }

    /// Use a different clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Snapshots held, oldest first
    pub fn snapshots(&self) -> impl Iterator<Item = &MetricSnapshot> {
        self.snapshots.iter()
    }

    /// Number of snapshots held
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if nothing was ingested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Record one attempt
    ///
    /// # Errors
    ///
    /// Returns error if the program ID or run ID is empty
    pub fn ingest(
        &mut self,
        program: &Program,
        report: &CoordinationAttemptReport,
    ) -> MetricsResult<&MetricSnapshot> {
        if program.id.as_str().is_empty() {
            return Err(MetricsError::MissingIdentifier { field: "program.id" });
        }
        if report.run_id.as_str().is_empty() {
            return Err(MetricsError::MissingIdentifier { field: "report.runId" });
        }

        let chosen = &report.selection.chosen.metadata;
        let ceiling = report.plan.budget.max_parallelism.max(1) as f64;
        let snapshot = MetricSnapshot {
            run_id: report.run_id.clone(),
            tenant: report.tenant.clone(),
            captured_at: self.clock.now(),
            topology_nodes: report.plan.topology_nodes,
            candidate_completion_minutes: chosen.expected_completion_minutes,
            selected_decision: report.selection.decision,
            throughput: report.plan.topology_nodes as f64 / program.steps.len().max(1) as f64,
            utilization: f64::from(chosen.parallelism) / ceiling,
        };
        tracing::debug!(
            run_id = %snapshot.run_id,
            tenant = %snapshot.tenant,
            decision = %snapshot.selected_decision,
            "captured metric snapshot"
        );

        if let Some(limit) = self.retention {
            while self.snapshots.len() >= limit {
                self.snapshots.pop_front();
            }
        }
        self.snapshots.push_back(snapshot);
        Ok(&self.snapshots[self.snapshots.len() - 1])
    }

    /// Summarize snapshots captured inside `window`
    #[must_use]
    pub fn trend(&self, window: &TrendWindow) -> MetricTrend {
        let matching: Vec<&MetricSnapshot> = self
            .snapshots
            .iter()
            .filter(|s| window.admits(s.captured_at))
            .collect();
        if matching.is_empty() {
            return MetricTrend::default();
        }

        let count = matching.len() as f64;
        let average_throughput = matching.iter().map(|s| s.throughput).sum::<f64>() / count;
        let utilization = matching.iter().map(|s| s.utilization).sum::<f64>() / count;
        MetricTrend {
            run_ids: matching.iter().map(|s| s.run_id.clone()).collect(),
            average_throughput,
            utilization,
            health_score: average_throughput * utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use keystone_coord::{AttemptRequest, Coordinator, CoordinatorConfig};
    use keystone_core::{FixedClock, PlanBudget, ProgramId, Step, TimeWindow};
    use keystone_gate::PolicyProfile;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    fn program(id: &str) -> Program {
        Program::new(id, "acme", TimeWindow::new(start(), start() + Duration::hours(4)))
            .with_step(Step::new("a").with_duration(10.0))
            .with_step(Step::new("b").depends_on("a").with_duration(10.0))
            .with_step(Step::new("c").depends_on("a").with_duration(10.0))
    }

    async fn report(program: &Program, max_parallelism: i64) -> CoordinationAttemptReport {
        let config = CoordinatorConfig::default().with_default_profile(PolicyProfile::permissive());
        Coordinator::bundled(Arc::new(config))
            .with_clock(Arc::new(FixedClock::new(start())))
            .run_attempt(AttemptRequest::new(
                program.clone(),
                PlanBudget::new(max_parallelism, 60),
            ))
            .await
            .unwrap()
    }

    fn collector(clock: &Arc<FixedClock>) -> MetricsCollector {
        MetricsCollector::new().with_clock(clock.clone())
    }

    #[tokio::test]
    async fn test_ingest_snapshot() {
        let clock = Arc::new(FixedClock::new(start()));
        let mut metrics = collector(&clock);
        let program = program("restore-db");
        let report = report(&program, 4).await;

        let snapshot = metrics.ingest(&program, &report).unwrap().clone();
        assert_eq!(snapshot.run_id, report.run_id);
        assert_eq!(snapshot.captured_at, start());
        assert_eq!(snapshot.topology_nodes, 3);
        assert_eq!(snapshot.throughput, 1.0);
        // depth 2 caps parallelism below the ceiling of 4
        assert_eq!(snapshot.utilization, 0.5);
        assert_eq!(snapshot.selected_decision, Decision::Approved);
        assert_eq!(metrics.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_rejects_empty_program_id() {
        let clock = Arc::new(FixedClock::new(start()));
        let mut metrics = collector(&clock);
        let program = program("restore-db");
        let report = report(&program, 2).await;

        let anonymous = Program::new("", "acme", program.run_window);
        let err = metrics.ingest(&anonymous, &report).unwrap_err();
        assert_eq!(err, MetricsError::MissingIdentifier { field: "program.id" });

        let mut orphan = report.clone();
        orphan.run_id = RunId::new("");
        assert!(metrics.ingest(&program, &orphan).is_err());
        assert!(metrics.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_keeps_whitespace_ids() {
        let clock = Arc::new(FixedClock::new(start()));
        let mut metrics = collector(&clock);
        let mut program = program("restore-db");
        let mut report = report(&program, 2).await;
        program.id = ProgramId::new(" ");
        report.run_id = RunId::new("\t");

        let snapshot = metrics.ingest(&program, &report).unwrap();
        assert_eq!(snapshot.run_id.as_str(), "\t");
        assert_eq!(metrics.len(), 1);
    }

    #[test]
    fn test_empty_trend_is_zero() {
        let metrics = MetricsCollector::new();
        let trend = metrics.trend(&TrendWindow::default());
        assert!(trend.run_ids.is_empty());
        assert_eq!(trend.average_throughput, 0.0);
        assert_eq!(trend.utilization, 0.0);
        assert_eq!(trend.health_score, 0.0);
    }

    #[tokio::test]
    async fn test_trend_window_bounds() {
        let clock = Arc::new(FixedClock::new(start()));
        let mut metrics = collector(&clock);
        let program = program("restore-db");

        let first = report(&program, 2).await;
        metrics.ingest(&program, &first).unwrap();
        clock.advance(Duration::hours(1));
        let second = report(&program, 4).await;
        metrics.ingest(&program, &second).unwrap();

        let all = metrics.trend(&TrendWindow::default());
        assert_eq!(all.run_ids, vec![first.run_id.clone(), second.run_id.clone()]);
        assert!((all.utilization - 0.75).abs() < 1e-9);
        assert!((all.health_score - 0.75).abs() < 1e-9);

        let late = metrics.trend(&TrendWindow {
            from: Some("2026-03-01T10:30:00Z".into()),
            to: None,
        });
        assert_eq!(late.run_ids, vec![second.run_id.clone()]);

        // unparsable bound is treated as open
        let open = metrics.trend(&TrendWindow::between("yesterday", "2026-03-01T10:00:00Z"));
        assert_eq!(open.run_ids, vec![first.run_id.clone()]);

        let none = metrics.trend(&TrendWindow::between(
            "2026-03-02T00:00:00Z",
            "2026-03-03T00:00:00Z",
        ));
        assert_eq!(none, MetricTrend::default());
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest() {
        let clock = Arc::new(FixedClock::new(start()));
        let mut metrics = collector(&clock).with_retention(2);
        let program = program("restore-db");

        let mut run_ids = Vec::new();
        for _ in 0..3 {
            let report = report(&program, 2).await;
            metrics.ingest(&program, &report).unwrap();
            run_ids.push(report.run_id);
        }

        let held: Vec<RunId> = metrics.snapshots().map(|s| s.run_id.clone()).collect();
        assert_eq!(held, run_ids[1..].to_vec());
    }

    #[tokio::test]
    async fn test_zero_retention_holds_latest() {
        let clock = Arc::new(FixedClock::new(start()));
        let mut metrics = collector(&clock).with_retention(0);
        assert_eq!(format!("{metrics:?}"), "MetricsCollector { snapshots: 0, retention: Some(1), .. }");
        let program = program("restore-db");

        let first = report(&program, 2).await;
        metrics.ingest(&program, &first).unwrap();
        let second = report(&program, 2).await;
        metrics.ingest(&program, &second).unwrap();

        let held: Vec<RunId> = metrics.snapshots().map(|s| s.run_id.clone()).collect();
        assert_eq!(held, vec![second.run_id]);
    }
}
