//! Policy profiles and feature-flag state.

use serde::{Deserialize, Serialize};

/// Gate configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Profile thresholds contradict each other
    #[error("Invalid policy profile: {reason}")]
    InvalidProfile {
        /// What is wrong
        reason: String,
    },
}

/// Thresholds a candidate must meet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyProfile {
    /// Minimum distinct signals observed
    pub min_signals: usize,
    /// Minimum confidence, 0..100
    pub min_confidence: f64,
    /// Maximum risk score, 0..100
    pub max_risk_score: f64,
    /// Shortest acceptable window
    pub min_window_minutes: f64,
    /// Longest acceptable window; `None` is unbounded
    pub max_window_minutes: Option<f64>,
}

impl Default for PolicyProfile {
    fn default() -> Self {
        Self {
            min_signals: 1,
            min_confidence: 50.0,
            max_risk_score: 75.0,
            min_window_minutes: 5.0,
            max_window_minutes: Some(480.0),
        }
    }
}

impl PolicyProfile {
    /// Profile every well-formed candidate passes
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            min_signals: 0,
            min_confidence: 0.0,
            max_risk_score: 100.0,
            min_window_minutes: 0.0,
            max_window_minutes: None,
        }
    }

    /// Set minimum signals
    #[must_use]
    pub fn with_min_signals(mut self, count: usize) -> Self {
        self.min_signals = count;
        self
    }

    /// Set minimum confidence
    #[must_use]
    pub fn with_min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = confidence;
        self
    }

    /// Set risk ceiling
    #[must_use]
    pub fn with_max_risk_score(mut self, score: f64) -> Self {
        self.max_risk_score = score;
        self
    }

    /// Set window bounds
    #[must_use]
    pub fn with_window_bounds(mut self, min_minutes: f64, max_minutes: Option<f64>) -> Self {
        self.min_window_minutes = min_minutes;
        self.max_window_minutes = max_minutes;
        self
    }

    /// Check the thresholds are coherent
    ///
    /// # Errors
    ///
    /// Returns error if a bound is negative, out of range or inverted
    pub fn validate(&self) -> Result<(), GateError> {
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return invalid(format!("minConfidence {} is outside [0, 100]", self.min_confidence));
        }
        if !(0.0..=100.0).contains(&self.max_risk_score) {
            return invalid(format!("maxRiskScore {} is outside [0, 100]", self.max_risk_score));
        }
        if !self.min_window_minutes.is_finite() || self.min_window_minutes < 0.0 {
            return invalid(format!(
                "minWindowMinutes {} must be non-negative",
                self.min_window_minutes
            ));
        }
        if let Some(max) = self.max_window_minutes {
            if max < self.min_window_minutes {
                return invalid(format!(
                    "maxWindowMinutes {} is below minWindowMinutes {}",
                    max, self.min_window_minutes
                ));
            }
        }
        Ok(())
    }
}

fn invalid(reason: String) -> Result<(), GateError> {
    Err(GateError::InvalidProfile { reason })
}

/// Feature-flag state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateState {
    /// Flags currently switched off
    pub disabled: Vec<String>,
}

impl GateState {
    /// State with the given flags disabled
    #[must_use]
    pub fn disabled<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disabled: flags.into_iter().map(Into::into).collect(),
        }
    }
}
