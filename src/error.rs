//! Error types for the governance core.
//!
//! Configuration problems surface at load/update time; detector problems
//! surface from `evaluate` and are subject to the configured failure policy.

use thiserror::Error;

use crate::domain::Criterion;

/// Unified error type for governance operations.
#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Invalid custom rule for {criterion}: '{rule}': {source}")]
    InvalidRule {
        criterion: Criterion,
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Detector {criterion} failed: {message}")]
    Detector { criterion: Criterion, message: String },

    #[error("Detector {criterion} panicked")]
    DetectorPanicked { criterion: Criterion },

    #[error("Detector {criterion} timed out after {timeout_ms}ms")]
    DetectorTimeout { criterion: Criterion, timeout_ms: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GovernanceError {
    /// The criterion whose detector caused this error, if any.
    pub fn criterion(&self) -> Option<Criterion> {
        match self {
            GovernanceError::Detector { criterion, .. }
            | GovernanceError::DetectorPanicked { criterion }
            | GovernanceError::DetectorTimeout { criterion, .. }
            | GovernanceError::InvalidRule { criterion, .. } => Some(*criterion),
            _ => None,
        }
    }

    /// Whether this error came from running a detector (as opposed to config).
    pub fn is_detector_failure(&self) -> bool {
        matches!(
            self,
            GovernanceError::Detector { .. }
                | GovernanceError::DetectorPanicked { .. }
                | GovernanceError::DetectorTimeout { .. }
        )
    }
}

/// Error a detector implementation may return from `detect`.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DetectorError(pub String);

impl DetectorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type alias for governance operations.
pub type GovernanceResult<T> = Result<T, GovernanceError>;
