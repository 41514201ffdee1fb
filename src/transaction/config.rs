//! Transaction manager configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transaction::metadata::TransactionMetadata;
use crate::transaction::propagation::Propagation;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Defaults applied to every boundary before declared attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Handler used when metadata names none.
    pub default_handler: Option<String>,
    /// Resource used when metadata names none.
    pub default_resource: Option<String>,
    /// Exception handler used when metadata names none.
    pub default_exception_handler: Option<String>,
    /// Propagation used when metadata declares none.
    pub default_propagation: Propagation,
    /// Whether transactions are read-only unless declared otherwise.
    pub default_read_only: bool,
    /// Attach new transactions to the platform's global transaction.
    pub join_global: bool,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_handler: None,
            default_resource: None,
            default_exception_handler: None,
            default_propagation: Propagation::Required,
            default_read_only: false,
            join_global: false,
        }
    }
}

impl TransactionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_handler(mut self, name: impl Into<String>) -> Self {
        self.default_handler = Some(name.into());
        self
    }

    pub fn default_resource(mut self, name: impl Into<String>) -> Self {
        self.default_resource = Some(name.into());
        self
    }

    pub fn default_exception_handler(mut self, name: impl Into<String>) -> Self {
        self.default_exception_handler = Some(name.into());
        self
    }

    pub fn default_propagation(mut self, propagation: Propagation) -> Self {
        self.default_propagation = propagation;
        self
    }

    pub fn default_read_only(mut self, value: bool) -> Self {
        self.default_read_only = value;
        self
    }

    pub fn join_global(mut self, value: bool) -> Self {
        self.join_global = value;
        self
    }

    /// Parse a configuration from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("default_handler", &self.default_handler),
            ("default_resource", &self.default_resource),
            ("default_exception_handler", &self.default_exception_handler),
        ];
        for (field, value) in names {
            if let Some(value) = value {
                if value.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!("{} must not be blank", field)));
                }
            }
        }
        Ok(())
    }

    /// Metadata every resolution starts from.
    pub fn default_metadata(&self) -> TransactionMetadata {
        TransactionMetadata {
            handler: self.default_handler.clone(),
            propagation: self.default_propagation,
            exception_handler: self.default_exception_handler.clone(),
            resource: self.default_resource.clone(),
            read_only: self.default_read_only,
            rollback_on: Vec::new(),
            no_rollback_for: Vec::new(),
        }
    }
}
