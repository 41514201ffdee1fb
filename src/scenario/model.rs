//! Scenario document model.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use super::error::ScenarioError;
use crate::transaction::{Propagation, TransactionConfig, TransactionalAttributes};

fn default_handlers() -> Vec<String> {
    vec!["memory".to_string()]
}

/// A scripted scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Optional title, printed in reports.
    #[serde(default)]
    pub name: Option<String>,
    /// Manager configuration.
    #[serde(default)]
    pub config: TransactionConfig,
    /// In-memory handlers to register, by name.
    #[serde(default = "default_handlers")]
    pub handlers: Vec<String>,
    /// Exception handlers: name to the categories they handle.
    #[serde(default)]
    pub exception_handlers: BTreeMap<String, Vec<String>>,
    /// Top-level steps, run one after another from an empty context.
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse a scenario from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = toml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Load a scenario from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.config.validate()?;
        if self.handlers.is_empty() {
            return Err(ScenarioError::Invalid("at least one handler is required".into()));
        }
        if self.steps.is_empty() {
            return Err(ScenarioError::Invalid("at least one step is required".into()));
        }
        self.steps.iter().try_for_each(Step::validate)
    }
}

/// One transactional step; children run inside its body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Step {
    pub name: String,
    pub propagation: Option<Propagation>,
    pub handler: Option<String>,
    pub resource: Option<String>,
    pub exception_handler: Option<String>,
    pub read_only: Option<bool>,
    pub rollback_on: Option<Vec<String>>,
    pub no_rollback_for: Option<Vec<String>>,
    /// Values written to the step's resource before children run.
    pub writes: BTreeMap<String, Value>,
    /// Fail with this category after children ran.
    pub fail: Option<String>,
    /// Keep going when a child fails.
    pub recover: bool,
    pub steps: Vec<Step>,
}

impl Step {
    fn validate(&self) -> Result<(), ScenarioError> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::Invalid("every step needs a name".into()));
        }
        self.steps.iter().try_for_each(Step::validate)
    }

    /// The step's declared transactional attributes.
    pub fn attributes(&self) -> TransactionalAttributes {
        TransactionalAttributes {
            propagation: self.propagation,
            handler: self.handler.clone(),
            exception_handler: self.exception_handler.clone(),
            resource: self.resource.clone(),
            read_only: self.read_only,
            rollback_on: self.rollback_on.clone(),
            no_rollback_for: self.no_rollback_for.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_steps() {
        let scenario = Scenario::from_toml_str(
            r#"
            name = "orders"

            [config]
            default_resource = "main"

            [[steps]]
            name = "outer"
            writes = { order = 1 }

            [[steps.steps]]
            name = "inner"
            propagation = "REQUIRES_NEW"
            fail = "audit"
            "#,
        )
        .unwrap();

        assert_eq!(scenario.handlers, vec!["memory"]);
        assert_eq!(scenario.config.default_resource.as_deref(), Some("main"));
        let inner = &scenario.steps[0].steps[0];
        assert_eq!(inner.propagation, Some(Propagation::RequiresNew));
        assert_eq!(inner.fail.as_deref(), Some("audit"));
        assert_eq!(inner.attributes().propagation, Some(Propagation::RequiresNew));
    }

    #[test]
    fn test_rejects_empty_scenario() {
        let err = Scenario::from_toml_str("name = \"nothing\"").unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unnamed_step() {
        let err = Scenario::from_toml_str("[[steps]]\nwrites = { a = 1 }").unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid(_)));
    }
}
