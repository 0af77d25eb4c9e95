//! Boundary validation for payloads entering the planner.
//!
//! Raw JSON is decoded into typed structs and then checked against the rules
//! the planner assumes. Failures come back as [`SchemaError`] values, never
//! panics, so the caller can report exactly which field was wrong.

use crate::model::Program;
use serde::de::DeserializeOwned;
use std::collections::HashSet;

/// Typed parse/validation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Not JSON at all
    #[error("Malformed JSON at line {line}, column {column}: {reason}")]
    MalformedJson {
        /// Line of the first syntax error
        line: usize,
        /// Column of the first syntax error
        column: usize,
        /// Decoder message
        reason: String,
    },

    /// Required field absent
    #[error("Missing field: {field}")]
    MissingField {
        /// Field name
        field: String,
    },

    /// Field present but unacceptable
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field path
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Two steps share an id
    #[error("Duplicate step id: {id}")]
    DuplicateStep {
        /// Repeated id
        id: String,
    },
}

impl SchemaError {
    /// Classify a serde_json failure
    #[must_use]
    pub fn from_json(err: &serde_json::Error) -> Self {
        let message = err.to_string();
        if err.is_syntax() || err.is_eof() {
            return Self::MalformedJson {
                line: err.line(),
                column: err.column(),
                reason: message,
            };
        }

        if let Some(rest) = message.strip_prefix("missing field `") {
            if let Some(end) = rest.find('`') {
                return Self::MissingField {
                    field: rest[..end].to_string(),
                };
            }
        }

        Self::InvalidValue {
            field: "payload".to_string(),
            reason: message,
        }
    }

    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<SchemaError> for crate::CoreError {
    fn from(err: SchemaError) -> Self {
        crate::CoreError::Validation {
            field: "schema".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Decode any payload type with typed failures
///
/// # Errors
///
/// Returns error if the payload is not valid JSON or does not match `T`
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, SchemaError> {
    serde_json::from_str(raw).map_err(|e| SchemaError::from_json(&e))
}

/// Decode and validate a program payload
///
/// # Errors
///
/// Returns error if decoding or validation fails
pub fn parse_program(raw: &str) -> Result<Program, SchemaError> {
    let program: Program = decode(raw)?;
    validate_program(&program)?;
    Ok(program)
}

/// Check the structural rules the planner relies on
///
/// Dangling dependency ids are deliberately accepted here; graph
/// construction drops them.
///
/// # Errors
///
/// Returns the first rule violation found
pub fn validate_program(program: &Program) -> Result<(), SchemaError> {
    if program.id.is_empty() {
        return Err(SchemaError::invalid("id", "must not be empty"));
    }
    if program.tenant.is_empty() {
        return Err(SchemaError::invalid("tenant", "must not be empty"));
    }
    if program.run_window.end < program.run_window.start {
        return Err(SchemaError::invalid("runWindow", "end precedes start"));
    }

    let mut seen = HashSet::new();
    for (idx, step) in program.steps.iter().enumerate() {
        if step.id.is_empty() {
            return Err(SchemaError::invalid(format!("steps[{}].id", idx), "must not be empty"));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(SchemaError::DuplicateStep {
                id: step.id.to_string(),
            });
        }
        if !step.duration_minutes.is_finite() || step.duration_minutes < 0.0 {
            return Err(SchemaError::invalid(
                format!("steps[{}].durationMinutes", idx),
                "must be a finite, non-negative number",
            ));
        }
    }

    for (idx, constraint) in program.constraints.iter().enumerate() {
        if constraint.id.is_empty() {
            return Err(SchemaError::invalid(
                format!("constraints[{}].id", idx),
                "must not be empty",
            ));
        }
        if !(0.0..=1.0).contains(&constraint.weight) {
            return Err(SchemaError::invalid(
                format!("constraints[{}].weight", idx),
                format!("{} is outside [0, 1]", constraint.weight),
            ));
        }
    }

    for (idx, signal) in program.signals.iter().enumerate() {
        if !signal.magnitude.is_finite() {
            return Err(SchemaError::invalid(
                format!("signals[{}].magnitude", idx),
                "must be finite",
            ));
        }
    }

    Ok(())
}
