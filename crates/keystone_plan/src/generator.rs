//! Candidate generation.
//!
//! Every attempt yields at least two candidates over the same step set: the
//! graph's forward order and its reverse. Figures are derived only from the
//! program and graph, so identical inputs give identical candidates apart
//! from the creation timestamp.

use crate::candidate::{CandidateMetadata, CandidateStrategy, PlanCandidate};
use keystone_core::{CandidateId, Clock, PlanBudget, Program, Step, StepId, SystemClock};
use keystone_graph::ExecutionGraph;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

const FALLBACK_PENALTY: f64 = 1.2;
const APPROVAL_CREDIT: f64 = 0.02;

/// Generation result type
pub type GenerateResult<T> = Result<T, GenerateError>;

/// Generation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    /// Graph has a cycle, so no valid order exists
    #[error("Cannot order a cyclic graph; blocked steps: {}", .blocked.join(", "))]
    CyclicGraph {
        /// Steps batching could not emit
        blocked: Vec<String>,
    },
}

/// Generator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorConfig {
    /// Principal stamped on every candidate
    pub created_by: String,
    /// Also emit a critical-first candidate
    pub include_critical_first: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            created_by: "keystone-planner".to_string(),
            include_critical_first: false,
        }
    }
}

impl GeneratorConfig {
    /// Set the principal
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Toggle the critical-first candidate
    #[must_use]
    pub fn with_critical_first(mut self, enabled: bool) -> Self {
        self.include_critical_first = enabled;
        self
    }
}

/// Produces plan candidates from a graph and budget
pub struct CandidateGenerator {
    config: GeneratorConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CandidateGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CandidateGenerator {
    /// Create a generator on the wall clock
    #[must_use]
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get configuration
    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate candidates, default first
    ///
    /// # Errors
    ///
    /// Returns error if the graph has a cycle
    pub fn generate(
        &self,
        program: &Program,
        graph: &ExecutionGraph,
        budget: &PlanBudget,
    ) -> GenerateResult<Vec<PlanCandidate>> {
        if graph.detect_cycle() {
            return Err(GenerateError::CyclicGraph {
                blocked: graph.blocked_nodes().into_iter().map(StepId::into_inner).collect(),
            });
        }

        let steps: HashMap<&StepId, &Step> = program.steps.iter().map(|s| (&s.id, s)).collect();
        let batches = graph.topological_batches();
        let forward: Vec<StepId> = batches.iter().flatten().cloned().collect();
        let mut reverse = forward.clone();
        reverse.reverse();

        let parallelism = parallelism(budget, batches.len(), forward.len());
        let base_minutes = expected_minutes(&forward, &steps, parallelism);
        let risk_index = risk_index(&forward, &steps);
        let resilience = resilience(batches.len(), graph.node_count());

        let metadata = |expected: f64| CandidateMetadata {
            parallelism,
            expected_completion_minutes: expected,
            risk_index,
            resilience_score: resilience,
        };

        let mut candidates = vec![
            self.candidate(program, CandidateStrategy::Default, forward, metadata(base_minutes)),
            self.candidate(
                program,
                CandidateStrategy::Fallback,
                reverse,
                metadata(base_minutes * FALLBACK_PENALTY),
            ),
        ];

        if self.config.include_critical_first {
            let sequence = critical_first(&batches, &steps);
            candidates.push(self.candidate(
                program,
                CandidateStrategy::CriticalFirst,
                sequence,
                metadata(base_minutes),
            ));
        }

        tracing::debug!(
            program_id = %program.id,
            candidates = candidates.len(),
            parallelism,
            expected_minutes = base_minutes,
            "generated plan candidates"
        );
        Ok(candidates)
    }

    fn candidate(
        &self,
        program: &Program,
        strategy: CandidateStrategy,
        sequence: Vec<StepId>,
        metadata: CandidateMetadata,
    ) -> PlanCandidate {
        PlanCandidate {
            id: CandidateId::new(format!("{}:{}", program.id, strategy)),
            program_id: program.id.clone(),
            strategy,
            sequence,
            metadata,
            created_at: self.clock.now(),
            created_by: self.config.created_by.clone(),
        }
    }
}

fn parallelism(budget: &PlanBudget, depth: usize, len: usize) -> u32 {
    let width = if depth > 0 { depth } else { len };
    let cap = budget.max_parallelism.max(1) as u64;
    (width as u64).min(cap).max(1) as u32
}

fn expected_minutes(sequence: &[StepId], steps: &HashMap<&StepId, &Step>, parallelism: u32) -> f64 {
    let total: f64 = sequence
        .iter()
        .filter_map(|id| steps.get(id))
        .map(|s| s.duration_minutes)
        .sum();
    (total / f64::from(parallelism)).ceil() + sequence.len() as f64
}

fn risk_index(sequence: &[StepId], steps: &HashMap<&StepId, &Step>) -> f64 {
    let scheduled: Vec<&Step> = sequence.iter().filter_map(|id| steps.get(id).copied()).collect();
    if scheduled.is_empty() {
        return 0.0;
    }
    let count = scheduled.len() as f64;
    let weight = scheduled.iter().map(|s| s.criticality.weight()).sum::<f64>() / count;
    let approvals = scheduled.iter().map(|s| f64::from(s.approvals)).sum::<f64>() / count;
    (weight - APPROVAL_CREDIT * approvals).clamp(0.0, 1.0)
}

fn resilience(depth: usize, nodes: usize) -> f64 {
    if nodes == 0 {
        return 1.0;
    }
    (1.0 - (depth.saturating_sub(1)) as f64 / nodes as f64).clamp(0.0, 1.0)
}

fn critical_first(batches: &[Vec<StepId>], steps: &HashMap<&StepId, &Step>) -> Vec<StepId> {
    batches
        .iter()
        .flat_map(|batch| {
            let mut batch = batch.clone();
            batch.sort_by_key(|id| {
                let criticality = steps.get(id).map(|s| s.criticality).unwrap_or_default();
                (Reverse(criticality), id.clone())
            });
            batch
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use keystone_core::{Criticality, FixedClock, TimeWindow};
    use keystone_graph::build_graph;
    use proptest::prelude::*;

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        )
    }

    fn chain_program() -> Program {
        Program::new("prog", "acme", window())
            .with_step(Step::new("a").with_duration(10.0))
            .with_step(Step::new("b").depends_on("a").with_duration(10.0))
            .with_step(Step::new("c").depends_on("b").with_duration(10.0))
    }

    fn generator() -> CandidateGenerator {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        CandidateGenerator::new(GeneratorConfig::default()).with_clock(Arc::new(clock))
    }

    fn ids(raw: &[&str]) -> Vec<StepId> {
        raw.iter().map(|s| StepId::new(*s)).collect()
    }

    #[test]
    fn test_chain_candidates() {
        let program = chain_program();
        let graph = build_graph(&program.steps);
        let candidates = generator()
            .generate(&program, &graph, &PlanBudget::new(2, 60))
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id.as_str(), "prog:default");
        assert_eq!(candidates[0].sequence, ids(&["a", "b", "c"]));
        assert_eq!(candidates[1].id.as_str(), "prog:fallback");
        assert_eq!(candidates[1].sequence, ids(&["c", "b", "a"]));
    }

    #[test]
    fn test_chain_metadata() {
        let program = chain_program();
        let graph = build_graph(&program.steps);
        let candidates = generator()
            .generate(&program, &graph, &PlanBudget::new(2, 60))
            .unwrap();

        let meta = candidates[0].metadata;
        // depth 3 capped by max parallelism 2
        assert_eq!(meta.parallelism, 2);
        // ceil(30 / 2) + 3
        assert_eq!(meta.expected_completion_minutes, 18.0);
        assert!((meta.risk_index - 0.3).abs() < 1e-9);
        // 1 - 2/3
        assert!((meta.resilience_score - 1.0 / 3.0).abs() < 1e-9);

        let fallback = candidates[1].metadata;
        assert!((fallback.expected_completion_minutes - 21.6).abs() < 1e-9);
        assert!(fallback.expected_completion_minutes > meta.expected_completion_minutes);
    }

    #[test]
    fn test_candidates_stamped() {
        let program = chain_program();
        let graph = build_graph(&program.steps);
        let candidates = generator()
            .generate(&program, &graph, &PlanBudget::new(2, 60))
            .unwrap();
        assert_eq!(
            candidates[0].created_at,
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
        );
        assert_eq!(candidates[0].created_by, "keystone-planner");
    }

    #[test]
    fn test_cyclic_graph_refused() {
        let program = Program::new("prog", "acme", window())
            .with_step(Step::new("a").depends_on("b"))
            .with_step(Step::new("b").depends_on("a"));
        let graph = build_graph(&program.steps);
        let err = generator()
            .generate(&program, &graph, &PlanBudget::new(2, 60))
            .unwrap_err();
        assert_eq!(
            err,
            GenerateError::CyclicGraph {
                blocked: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn test_empty_program() {
        let program = Program::new("prog", "acme", window());
        let graph = build_graph(&program.steps);
        let candidates = generator()
            .generate(&program, &graph, &PlanBudget::new(2, 60))
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].sequence.is_empty());
        assert_eq!(candidates[0].metadata.parallelism, 1);
        assert_eq!(candidates[0].metadata.risk_index, 0.0);
        assert_eq!(candidates[0].metadata.resilience_score, 1.0);
    }

    #[test]
    fn test_approvals_lower_risk_index() {
        let program = Program::new("prog", "acme", window())
            .with_step(Step::new("a").with_criticality(Criticality::High).with_approvals(5));
        let graph = build_graph(&program.steps);
        let candidates = generator()
            .generate(&program, &graph, &PlanBudget::new(2, 60))
            .unwrap();
        // 0.6 - 0.02 * 5
        assert!((candidates[0].metadata.risk_index - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_critical_first_candidate() {
        let program = Program::new("prog", "acme", window())
            .with_step(Step::new("a"))
            .with_step(Step::new("b").with_criticality(Criticality::Critical))
            .with_step(Step::new("c").depends_on("a"));
        let graph = build_graph(&program.steps);
        let generator = CandidateGenerator::new(GeneratorConfig::default().with_critical_first(true));
        let candidates = generator
            .generate(&program, &graph, &PlanBudget::new(4, 60))
            .unwrap();

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[2].id.as_str(), "prog:critical-first");
        assert_eq!(candidates[2].sequence, ids(&["b", "a", "c"]));
        assert_eq!(candidates[0].sequence, ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_candidate_serializes_camel_case() {
        let program = chain_program();
        let graph = build_graph(&program.steps);
        let candidates = generator()
            .generate(&program, &graph, &PlanBudget::new(2, 60))
            .unwrap();
        let json = serde_json::to_value(&candidates[1]).unwrap();
        assert_eq!(json["strategy"], "fallback");
        assert!(json["metadata"]["expectedCompletionMinutes"].is_number());
    }

    fn acyclic_program() -> impl Strategy<Value = Program> {
        prop::collection::vec(
            (prop::collection::vec(any::<prop::sample::Index>(), 0..3), 1.0f64..30.0),
            1..10,
        )
        .prop_map(|specs| {
            let n = specs.len();
            let name = |i: usize| format!("step-{:02}", n - i);
            specs.iter().enumerate().fold(
                Program::new("prog", "acme", window()),
                |program, (i, (deps, minutes))| {
                    let mut step = Step::new(name(i)).with_duration(*minutes);
                    if i > 0 {
                        for pick in deps {
                            step = step.depends_on(name(pick.index(i)));
                        }
                    }
                    program.with_step(step)
                },
            )
        })
    }

    proptest! {
        #[test]
        fn prop_default_and_fallback_share_steps(program in acyclic_program(), max_par in 1i64..6) {
            let graph = build_graph(&program.steps);
            let candidates = generator()
                .generate(&program, &graph, &PlanBudget::new(max_par, 60))
                .unwrap();

            prop_assert!(candidates.len() >= 2);
            prop_assert_eq!(candidates[0].step_set(), candidates[1].step_set());
            prop_assert_eq!(candidates[0].sequence.len(), program.steps.len());
            let mut reversed = candidates[1].sequence.clone();
            reversed.reverse();
            prop_assert_eq!(&candidates[0].sequence, &reversed);
            prop_assert!(
                candidates[1].metadata.expected_completion_minutes
                    > candidates[0].metadata.expected_completion_minutes
            );
            prop_assert!(candidates[0].metadata.parallelism as i64 <= max_par);
        }
    }
}
