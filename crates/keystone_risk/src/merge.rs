//! Folding per-candidate assessments into one profile.

use crate::scorer::{bounded, RiskAssessment, RiskProfile, RiskWeights, RISK_WEIGHTS};
use indexmap::IndexSet;
use keystone_core::RiskClassification;

const MAX_RATIONALE: usize = 12;

/// Average a set of assessments
///
/// Scores and baselines are averaged, the band is recomputed from the
/// rounded mean score, and rationale is unioned in first-seen order with
/// duplicates dropped, keeping at most twelve entries.
#[must_use]
pub fn merge_risk_summaries(assessments: &[RiskAssessment]) -> RiskProfile {
    if assessments.is_empty() {
        return RiskProfile {
            weights: RiskWeights::uniform(),
            score: 0,
            baseline: 0.0,
            classification: RiskClassification::Safe,
            rationale: vec!["no-candidates".to_string()],
        };
    }

    let count = assessments.len() as f64;
    let mean_score = assessments.iter().map(|a| f64::from(a.score)).sum::<f64>() / count;
    let baseline = assessments.iter().map(|a| a.baseline).sum::<f64>() / count;
    let score = bounded(mean_score.round(), 0.0, 100.0) as u8;

    let rationale: IndexSet<&str> = assessments
        .iter()
        .flat_map(|a| a.rationale.iter().map(String::as_str))
        .collect();

    RiskProfile {
        weights: RISK_WEIGHTS,
        score,
        baseline,
        classification: RiskClassification::from_score(score),
        rationale: rationale
            .into_iter()
            .take(MAX_RATIONALE)
            .map(str::to_string)
            .collect(),
    }
}
