//! Per-call transaction metadata.

use std::fmt;

use crate::transaction::error::Categorized;
use crate::transaction::propagation::Propagation;

/// Effective transaction configuration of one intercepted call.
///
/// Produced fresh for every call by a resolver, then only read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionMetadata {
    /// Name of the transaction handler to drive.
    pub handler: Option<String>,
    /// Propagation policy.
    pub propagation: Propagation,
    /// Name of the exception handler consulted on failure.
    pub exception_handler: Option<String>,
    /// Resource the transaction is bound to (datasource, graph, ...).
    pub resource: Option<String>,
    /// Read-only transactions always end in rollback.
    pub read_only: bool,
    /// Categories that cause rollback. Empty means every error does.
    pub rollback_on: Vec<String>,
    /// Categories that never cause rollback. Wins over `rollback_on`.
    pub no_rollback_for: Vec<String>,
}

impl TransactionMetadata {
    /// Create metadata with the given propagation and defaults elsewhere.
    pub fn new(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Default::default()
        }
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn with_exception_handler(mut self, name: impl Into<String>) -> Self {
        self.exception_handler = Some(name.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn rollback_on(mut self, category: impl Into<String>) -> Self {
        self.rollback_on.push(category.into());
        self
    }

    pub fn no_rollback_for(mut self, category: impl Into<String>) -> Self {
        self.no_rollback_for.push(category.into());
        self
    }

    /// Decide whether `error` must roll the transaction back.
    pub fn rollback_required(&self, error: &dyn Categorized) -> bool {
        if self
            .no_rollback_for
            .iter()
            .any(|category| error.in_category(category))
        {
            return false;
        }
        self.rollback_on.is_empty()
            || self
                .rollback_on
                .iter()
                .any(|category| error.in_category(category))
    }
}

impl fmt::Display for TransactionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} handler={} resource={}",
            self.propagation,
            self.handler.as_deref().unwrap_or("-"),
            self.resource.as_deref().unwrap_or("-"),
        )?;
        if self.read_only {
            write!(f, " read-only")?;
        }
        if let Some(name) = &self.exception_handler {
            write!(f, " exception-handler={}", name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct Tagged(&'static str);

    impl Categorized for Tagged {
        fn in_category(&self, category: &str) -> bool {
            self.0 == category || category == "any"
        }
    }

    #[test]
    fn test_rollback_on_everything_by_default() {
        let metadata = TransactionMetadata::default();
        assert!(metadata.rollback_required(&Tagged("validation")));
    }

    #[test]
    fn test_no_rollback_for_wins() {
        let metadata = TransactionMetadata::default()
            .rollback_on("any")
            .no_rollback_for("validation");
        assert!(!metadata.rollback_required(&Tagged("validation")));
        assert!(metadata.rollback_required(&Tagged("io")));
    }

    #[test]
    fn test_rollback_on_restricts() {
        let metadata = TransactionMetadata::default().rollback_on("io");
        assert!(metadata.rollback_required(&Tagged("io")));
        assert!(!metadata.rollback_required(&Tagged("validation")));
    }

    #[test]
    fn test_display() {
        let metadata = TransactionMetadata::new(Propagation::RequiresNew)
            .with_handler("jdbc")
            .with_resource("main")
            .read_only(true);
        assert_eq!(
            metadata.to_string(),
            "REQUIRES_NEW handler=jdbc resource=main read-only"
        );
    }
}
