//! Scenario error types.

use thiserror::Error;

use crate::memory::MemoryError;
use crate::transaction::{Categorized, ConfigError, ConfigurationError};

/// Errors loading or preparing a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid scenario syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid scenario config: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    #[error("invalid scenario: {0}")]
    Invalid(String),
}

/// Business errors raised by scenario steps.
#[derive(Debug, Error)]
pub enum StepError {
    /// The step was scripted to fail.
    #[error("step '{step}' failed ({category})")]
    Failed { step: String, category: String },

    /// The step's writes were refused by the backend.
    #[error("step '{step}' could not write: {source}")]
    Write {
        step: String,
        #[source]
        source: MemoryError,
    },
}

impl Categorized for StepError {
    fn in_category(&self, category: &str) -> bool {
        match self {
            StepError::Failed { category: own, .. } => own == category,
            StepError::Write { .. } => category == "write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_categories() {
        let failed = StepError::Failed {
            step: "audit".to_string(),
            category: "audit".to_string(),
        };
        assert!(failed.in_category("audit"));
        assert!(!failed.in_category("write"));

        let write = StepError::Write {
            step: "report".to_string(),
            source: MemoryError::ReadOnly { tx_id: 1 },
        };
        assert!(write.in_category("write"));
        assert!(write.to_string().contains("read-only"));
    }
}
