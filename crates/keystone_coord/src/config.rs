//! Coordinator configuration.
//!
//! Built once by the host process, usually from a JSON file, and handed to
//! the [`Coordinator`](crate::Coordinator) behind an `Arc`.

use keystone_core::{LoggingConfig, RiskClassification};
use keystone_gate::{GateError, PolicyProfile};
use keystone_plan::GeneratorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid JSON for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: String,
        /// What is wrong
        reason: String,
    },

    /// Default profile is inconsistent
    #[error(transparent)]
    Profile(#[from] GateError),
}

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinatorConfig {
    /// Principal stamped on candidates and records
    pub created_by: String,
    /// Profile used when a request carries none
    pub default_profile: PolicyProfile,
    /// Candidate generation options
    pub generator: GeneratorConfig,
    /// Logging setup for the host process
    pub logging: LoggingConfig,
    /// Tags attached to every record
    pub record_tags: Vec<String>,
    /// Band at which the bundled risk engine defers
    pub risk_defer_at: RiskClassification,
    /// Run boundary validation on submitted programs
    pub validate_programs: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            created_by: "keystone-coordinator".to_string(),
            default_profile: PolicyProfile::default(),
            generator: GeneratorConfig::default(),
            logging: LoggingConfig::default(),
            record_tags: Vec::new(),
            risk_defer_at: RiskClassification::Danger,
            validate_programs: true,
        }
    }
}

impl CoordinatorConfig {
    /// Parse from a JSON string and validate
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or a value is out of range
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&content)
    }

    /// Check values
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.created_by.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "createdBy".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(tag) = self.record_tags.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "recordTags".to_string(),
                reason: format!("blank tag {tag:?}"),
            });
        }
        self.default_profile.validate()?;
        Ok(())
    }

    /// Set the principal
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Set the fallback profile
    #[must_use]
    pub fn with_default_profile(mut self, profile: PolicyProfile) -> Self {
        self.default_profile = profile;
        self
    }

    /// Set generator options
    #[must_use]
    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    /// Add a record tag
    #[must_use]
    pub fn with_record_tag(mut self, tag: impl Into<String>) -> Self {
        self.record_tags.push(tag.into());
        self
    }

    /// Set the defer band
    #[must_use]
    pub fn with_risk_defer_at(mut self, band: RiskClassification) -> Self {
        self.risk_defer_at = band;
        self
    }

    /// Toggle boundary validation
    #[must_use]
    pub fn with_program_validation(mut self, enabled: bool) -> Self {
        self.validate_programs = enabled;
        self
    }
}
