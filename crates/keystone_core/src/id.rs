//! Identifiers for KEYSTONE entities.
//!
//! Every kind of id is its own newtype over a string so a `StepId` can never
//! be passed where a `CandidateId` is expected. Ids order lexicographically,
//! which is what the planner relies on for deterministic tie-breaking.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Create a fresh random identifier
            #[must_use]
            pub fn generate() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::new_v4()))
            }

            /// Get as string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is blank
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Take the inner string
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Step identifier - one unit of recovery work inside a program
    StepId,
    "step"
);

string_id!(
    /// Program identifier - one recovery program submitted for coordination
    ProgramId,
    "prog"
);

string_id!(
    /// Tenant identifier - owner of a program
    TenantId,
    "tenant"
);

string_id!(
    /// Constraint identifier - one externally supplied policy limit
    ConstraintId,
    "cons"
);

string_id!(
    /// Candidate identifier - one ordered execution plan
    CandidateId,
    "cand"
);

string_id!(
    /// Run identifier - one coordination attempt
    RunId,
    "run"
);

string_id!(
    /// Record identifier - one persisted coordination record
    RecordId,
    "rec"
);

string_id!(
    /// Correlation identifier - ties an attempt to the caller's request
    CorrelationId,
    "corr"
);
