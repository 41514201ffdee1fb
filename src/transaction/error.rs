//! Transaction error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Boxed error raised by a transaction handler's backend client.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for transactional boundaries.
pub type TransactionResult<T, E> = Result<T, TransactionError<E>>;

/// Structured code carried by every configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// MANDATORY propagation with no ambient transaction.
    NoTransactionForMandatory,
    /// NEVER propagation with an ambient transaction.
    ExistingTransactionForNever,
    /// No handler named and more than one (or none) registered.
    NoHandlerSpecified,
    /// The named handler is not registered.
    HandlerNotFound,
    /// The named exception handler is not registered.
    ExceptionHandlerNotFound,
    /// The transaction was rolled back because a participant failed.
    UnexpectedRollback,
    /// The configuration itself is inconsistent.
    InvalidConfig,
}

impl ErrorCode {
    /// The code as printed in messages and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoTransactionForMandatory => "NO_TRANSACTION_FOR_MANDATORY",
            ErrorCode::ExistingTransactionForNever => "EXISTING_TRANSACTION_FOR_NEVER",
            ErrorCode::NoHandlerSpecified => "NO_HANDLER_SPECIFIED",
            ErrorCode::HandlerNotFound => "HANDLER_NOT_FOUND",
            ErrorCode::ExceptionHandlerNotFound => "EXCEPTION_HANDLER_NOT_FOUND",
            ErrorCode::UnexpectedRollback => "UNEXPECTED_ROLLBACK",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The handler lifecycle step during which something happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerOperation {
    Initialize,
    Create,
    JoinGlobal,
    Begin,
    Commit,
    MarkRollbackOnly,
    Rollback,
    Release,
    Cleanup,
}

impl fmt::Display for HandlerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandlerOperation::Initialize => "initialize",
            HandlerOperation::Create => "create",
            HandlerOperation::JoinGlobal => "join-global",
            HandlerOperation::Begin => "begin",
            HandlerOperation::Commit => "commit",
            HandlerOperation::MarkRollbackOnly => "mark-rollback-only",
            HandlerOperation::Rollback => "rollback",
            HandlerOperation::Release => "release",
            HandlerOperation::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// A fatal, non-recoverable configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ConfigurationError {
    /// Structured error code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl ConfigurationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// An unrecognized propagation name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown propagation: {0}")]
pub struct ParsePropagationError(pub String);

/// Errors surfaced by a transactional boundary.
///
/// Business errors from the body travel in `Body` untouched. Errors that are
/// already `TransactionError`s pass through nested boundaries as-is, so an
/// error is never wrapped twice.
#[derive(Debug, Error)]
pub enum TransactionError<E> {
    /// Misconfiguration or a propagation rule violation.
    #[error("transaction configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The backend failed during a lifecycle step.
    #[error("transaction handler failed during {operation}: {source}")]
    Handler {
        operation: HandlerOperation,
        #[source]
        source: HandlerError,
    },

    /// Error returned by the transactional body.
    #[error("{0}")]
    Body(E),
}

impl<E> TransactionError<E> {
    /// Create a configuration error.
    pub fn configuration(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::new(code, message))
    }

    /// Wrap a backend failure.
    pub fn handler(operation: HandlerOperation, source: HandlerError) -> Self {
        Self::Handler { operation, source }
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TransactionError::Configuration(_))
    }

    /// The configuration error code, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            TransactionError::Configuration(e) => Some(e.code),
            _ => None,
        }
    }

    /// Borrow the body error, if this is one.
    pub fn body(&self) -> Option<&E> {
        match self {
            TransactionError::Body(e) => Some(e),
            _ => None,
        }
    }

    /// Take the body error, if this is one.
    pub fn into_body(self) -> Option<E> {
        match self {
            TransactionError::Body(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors that can be matched against rollback rules and exception handlers.
///
/// A category is a free-form name such as `"validation"` or `"io"`. An error
/// may belong to several; rollback rules and exception handlers only ever ask
/// whether it belongs to a given one.
pub trait Categorized: std::error::Error {
    /// Check if this error belongs to `category`.
    fn in_category(&self, _category: &str) -> bool {
        false
    }
}

impl<E: Categorized> Categorized for TransactionError<E> {
    fn in_category(&self, category: &str) -> bool {
        match self {
            TransactionError::Configuration(e) => {
                category == "configuration" || category == e.code.as_str()
            }
            TransactionError::Handler { .. } => category == "handler",
            TransactionError::Body(e) => e.in_category(category),
        }
    }
}

impl Categorized for std::io::Error {
    fn in_category(&self, category: &str) -> bool {
        category == "io"
    }
}

impl Categorized for std::convert::Infallible {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    impl Categorized for Boom {
        fn in_category(&self, category: &str) -> bool {
            category == "boom"
        }
    }

    #[test]
    fn test_error_code_display() {
        let err: TransactionError<Boom> =
            TransactionError::configuration(ErrorCode::NoTransactionForMandatory, "no tx");
        assert_eq!(err.code(), Some(ErrorCode::NoTransactionForMandatory));
        assert!(err.is_configuration());
        assert!(err.to_string().contains("NO_TRANSACTION_FOR_MANDATORY"));
    }

    #[test]
    fn test_categories_follow_body() {
        let body: TransactionError<Boom> = TransactionError::Body(Boom);
        assert!(body.in_category("boom"));
        assert!(!body.in_category("configuration"));

        let handler: TransactionError<Boom> =
            TransactionError::handler(HandlerOperation::Commit, "disk full".into());
        assert!(handler.in_category("handler"));
        assert!(handler.to_string().contains("commit"));
    }

    #[test]
    fn test_parse_propagation_error_display() {
        let err = ParsePropagationError("NESTED".to_string());
        assert_eq!(err.to_string(), "unknown propagation: NESTED");
    }

    #[test]
    fn test_into_body() {
        let body: TransactionError<Boom> = TransactionError::Body(Boom);
        assert!(body.body().is_some());
        assert!(body.into_body().is_some());

        let config: TransactionError<Boom> =
            TransactionError::configuration(ErrorCode::InvalidConfig, "bad");
        assert!(config.into_body().is_none());
    }
}
