//! Coordination state machine.

use crate::error::{CoordinationError, CoordinationResult};
use chrono::{DateTime, Utc};
use keystone_core::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attempt phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Created, nothing done yet
    Draft,
    /// Graph built, constraints inspected
    Discovery,
    /// Candidates generated and assessed
    Planning,
    /// Engines consulted, winner picked
    Selection,
    /// Record being persisted and announced
    Delivery,
    /// Finished
    Complete,
    /// Stopped before planning
    Abort,
}

impl Phase {
    /// Informational progress; never drives control flow
    #[must_use]
    pub const fn progress_percent(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Discovery => 5,
            Self::Planning => 25,
            Self::Selection => 60,
            Self::Delivery => 90,
            Self::Complete | Self::Abort => 100,
        }
    }

    /// Check if this is a terminal phase
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Abort)
    }

    /// Whether `next` is a legal successor
    #[must_use]
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Discovery)
                | (Self::Discovery, Self::Planning)
                | (Self::Discovery, Self::Abort)
                | (Self::Planning, Self::Selection)
                | (Self::Selection, Self::Delivery)
                | (Self::Delivery, Self::Complete)
        )
    }

    /// Stable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Discovery => "discovery",
            Self::Planning => "planning",
            Self::Selection => "selection",
            Self::Delivery => "delivery",
            Self::Complete => "complete",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "discovery" => Ok(Self::Discovery),
            "planning" => Ok(Self::Planning),
            "selection" => Ok(Self::Selection),
            "delivery" => Ok(Self::Delivery),
            "complete" => Ok(Self::Complete),
            "abort" => Ok(Self::Abort),
            _ => Err(format!("Invalid coordination phase: {s}")),
        }
    }
}

/// One recorded phase change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTransition {
    /// Phase left
    pub from: Phase,
    /// Phase entered
    pub to: Phase,
    /// When
    pub at: DateTime<Utc>,
}

/// Progress of one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationState {
    /// Attempt run ID
    pub run_id: RunId,
    /// Current phase
    pub phase: Phase,
    /// Progress of the current phase
    pub progress_percent: u8,
    /// Creation time
    pub started_at: DateTime<Utc>,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
    /// Set on entering a terminal phase
    pub completed_at: Option<DateTime<Utc>>,
    /// Every transition so far
    pub history: Vec<PhaseTransition>,
}

impl CoordinationState {
    /// Fresh state in `draft`
    #[must_use]
    pub fn new(run_id: RunId, at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            phase: Phase::Draft,
            progress_percent: Phase::Draft.progress_percent(),
            started_at: at,
            updated_at: at,
            completed_at: None,
            history: Vec::new(),
        }
    }

    /// Move to `next`
    ///
    /// # Errors
    ///
    /// Returns error if `next` is not a legal successor of the current phase
    pub fn transition(&mut self, next: Phase, at: DateTime<Utc>) -> CoordinationResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(CoordinationError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }

        tracing::debug!(run_id = %self.run_id, from = %self.phase, to = %next, "phase transition");
        self.history.push(PhaseTransition {
            from: self.phase,
            to: next,
            at,
        });
        self.phase = next;
        self.progress_percent = next.progress_percent();
        self.updated_at = at;
        if next.is_terminal() {
            self.completed_at = Some(at);
        }
        Ok(())
    }

    /// Check if the attempt has finished
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}
