//! Plan candidate types.

use chrono::{DateTime, Utc};
use keystone_core::{CandidateId, ProgramId, StepId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a candidate's sequence was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateStrategy {
    /// Forward topological order
    Default,
    /// Reverse of the forward order
    Fallback,
    /// Forward batches, most critical step first within each batch
    CriticalFirst,
}

impl CandidateStrategy {
    /// Stable name, also the candidate id suffix
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Fallback => "fallback",
            Self::CriticalFirst => "critical-first",
        }
    }
}

impl std::fmt::Display for CandidateStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived planning figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMetadata {
    /// Steps run at once
    pub parallelism: u32,
    /// Estimated minutes to finish
    pub expected_completion_minutes: f64,
    /// Composition risk, 0..1
    pub risk_index: f64,
    /// Topology resilience, 0..1
    pub resilience_score: f64,
}

/// One fully ordered execution plan
///
/// Generated once per attempt and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCandidate {
    /// Candidate ID
    pub id: CandidateId,
    /// Program the candidate plans
    pub program_id: ProgramId,
    /// Derivation
    pub strategy: CandidateStrategy,
    /// Step order
    pub sequence: Vec<StepId>,
    /// Planning figures
    pub metadata: CandidateMetadata,
    /// Generation time
    pub created_at: DateTime<Utc>,
    /// Generating principal
    pub created_by: String,
}

impl PlanCandidate {
    /// Distinct steps in the sequence
    #[must_use]
    pub fn step_set(&self) -> BTreeSet<&StepId> {
        self.sequence.iter().collect()
    }

    /// Whether `step` is scheduled
    #[must_use]
    pub fn contains(&self, step: &StepId) -> bool {
        self.sequence.contains(step)
    }

    /// Placeholder with an empty sequence, used for audit records of
    /// attempts that never reached planning
    #[must_use]
    pub fn empty(program_id: &ProgramId, created_at: DateTime<Utc>, created_by: &str) -> Self {
        Self {
            id: CandidateId::new(format!("{}:{}", program_id, CandidateStrategy::Default)),
            program_id: program_id.clone(),
            strategy: CandidateStrategy::Default,
            sequence: Vec::new(),
            metadata: CandidateMetadata {
                parallelism: 0,
                expected_completion_minutes: 0.0,
                risk_index: 0.0,
                resilience_score: 0.0,
            },
            created_at,
            created_by: created_by.to_string(),
        }
    }
}
