//! Registry of the handlers a manager can drive.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::transaction::error::{ConfigurationError, ErrorCode};
use crate::transaction::exception::ExceptionHandler;
use crate::transaction::handler::TransactionHandler;

/// Transaction handlers and exception handlers, by name.
///
/// The handler type is fixed at compile time. Several backends share one
/// registry through an enum that implements [`TransactionHandler`].
pub struct HandlerRegistry<H: TransactionHandler> {
    handlers: BTreeMap<String, Arc<H>>,
    exception_handlers: BTreeMap<String, Arc<dyn ExceptionHandler<H::Transaction>>>,
}

impl<H: TransactionHandler> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
            exception_handlers: BTreeMap::new(),
        }
    }
}

impl<H: TransactionHandler> HandlerRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own name, replacing any previous one.
    pub fn register(&mut self, handler: H) -> Option<Arc<H>> {
        let name = handler.name().to_string();
        self.handlers.insert(name, Arc::new(handler))
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_handler(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    /// Register an exception handler under `name`.
    pub fn register_exception_handler(
        &mut self,
        name: impl Into<String>,
        handler: impl ExceptionHandler<H::Transaction> + 'static,
    ) {
        self.exception_handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn with_exception_handler(
        mut self,
        name: impl Into<String>,
        handler: impl ExceptionHandler<H::Transaction> + 'static,
    ) -> Self {
        self.register_exception_handler(name, handler);
        self
    }

    /// Get a handler by name.
    pub fn get(&self, name: &str) -> Option<&Arc<H>> {
        self.handlers.get(name)
    }

    /// List registered handler names.
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Resolve the handler for a boundary.
    ///
    /// An explicit name must be registered. Without one, the registry must
    /// hold exactly one handler.
    pub fn resolve(&self, name: Option<&str>) -> Result<(&str, &Arc<H>), ConfigurationError> {
        match name {
            Some(name) => self
                .handlers
                .get_key_value(name)
                .map(|(k, h)| (k.as_str(), h))
                .ok_or_else(|| {
                    ConfigurationError::new(
                        ErrorCode::HandlerNotFound,
                        format!("no transaction handler named '{}'", name),
                    )
                }),
            None => {
                let mut iter = self.handlers.iter();
                match (iter.next(), iter.next()) {
                    (Some((k, h)), None) => Ok((k.as_str(), h)),
                    (None, _) => Err(ConfigurationError::new(
                        ErrorCode::NoHandlerSpecified,
                        "no transaction handler registered",
                    )),
                    (Some(_), Some(_)) => Err(ConfigurationError::new(
                        ErrorCode::NoHandlerSpecified,
                        format!(
                            "several transaction handlers registered ({}), none specified",
                            self.names().join(", ")
                        ),
                    )),
                }
            }
        }
    }

    /// Resolve an exception handler; `None` means the boundary has none.
    pub fn resolve_exception_handler(
        &self,
        name: Option<&str>,
    ) -> Result<Option<&Arc<dyn ExceptionHandler<H::Transaction>>>, ConfigurationError> {
        match name {
            None => Ok(None),
            Some(name) => self.exception_handlers.get(name).map(Some).ok_or_else(|| {
                ConfigurationError::new(
                    ErrorCode::ExceptionHandlerNotFound,
                    format!("no exception handler named '{}'", name),
                )
            }),
        }
    }
}

impl<H: TransactionHandler> std::fmt::Debug for HandlerRegistry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field(
                "exception_handlers",
                &self.exception_handlers.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryHandler, MemoryTransaction};
    use crate::transaction::error::HandlerError;
    use crate::transaction::exception::CategoryExceptionHandler;
    use crate::transaction::metadata::TransactionMetadata;

    /// Two backends behind one registry.
    #[derive(Debug)]
    enum Backend {
        Primary(MemoryHandler),
        Audit(MemoryHandler),
    }

    impl Backend {
        fn inner(&self) -> &MemoryHandler {
            match self {
                Backend::Primary(h) | Backend::Audit(h) => h,
            }
        }
    }

    impl TransactionHandler for Backend {
        type Transaction = MemoryTransaction;

        fn name(&self) -> &str {
            match self {
                Backend::Primary(_) => "primary",
                Backend::Audit(_) => "audit",
            }
        }

        fn do_create_transaction(
            &self,
            metadata: &TransactionMetadata,
        ) -> Result<MemoryTransaction, HandlerError> {
            self.inner().do_create_transaction(metadata)
        }

        fn do_begin_transaction(&self, tx: &mut MemoryTransaction) -> Result<(), HandlerError> {
            self.inner().do_begin_transaction(tx)
        }

        fn do_commit_transaction(&self, tx: &mut MemoryTransaction) -> Result<(), HandlerError> {
            self.inner().do_commit_transaction(tx)
        }

        fn do_mark_transaction_as_rollback_only(
            &self,
            tx: &mut MemoryTransaction,
        ) -> Result<(), HandlerError> {
            self.inner().do_mark_transaction_as_rollback_only(tx)
        }

        fn do_rollback_transaction(&self, tx: &mut MemoryTransaction) -> Result<(), HandlerError> {
            self.inner().do_rollback_transaction(tx)
        }

        fn do_release_transaction(&self, tx: &mut MemoryTransaction) -> Result<(), HandlerError> {
            self.inner().do_release_transaction(tx)
        }
    }

    #[test]
    fn test_single_handler_is_implicit() {
        let registry = HandlerRegistry::new().with_handler(MemoryHandler::new("memory"));
        let (name, _) = registry.resolve(None).unwrap();
        assert_eq!(name, "memory");
    }

    #[test]
    fn test_enum_dispatch_requires_explicit_name() {
        let registry = HandlerRegistry::new()
            .with_handler(Backend::Primary(MemoryHandler::new("primary")))
            .with_handler(Backend::Audit(MemoryHandler::new("audit")));
        assert_eq!(registry.len(), 2);

        let err = registry.resolve(None).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoHandlerSpecified);

        let (name, handler) = registry.resolve(Some("audit")).unwrap();
        assert_eq!(name, "audit");
        assert!(matches!(handler.as_ref(), Backend::Audit(_)));
    }

    #[test]
    fn test_unknown_names() {
        let registry = HandlerRegistry::new().with_handler(MemoryHandler::new("memory"));
        assert_eq!(
            registry.resolve(Some("jdbc")).unwrap_err().code,
            ErrorCode::HandlerNotFound
        );
        assert!(matches!(
            registry.resolve_exception_handler(Some("x")),
            Err(e) if e.code == ErrorCode::ExceptionHandlerNotFound
        ));
        assert!(registry.resolve_exception_handler(None).unwrap().is_none());
    }

    #[test]
    fn test_empty_registry() {
        let registry: HandlerRegistry<MemoryHandler> = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.resolve(None).unwrap_err().code,
            ErrorCode::NoHandlerSpecified
        );
    }

    #[test]
    fn test_exception_handler_lookup() {
        let registry = HandlerRegistry::new()
            .with_handler(MemoryHandler::new("memory"))
            .with_exception_handler("constraints", CategoryExceptionHandler::new(["constraint"]));
        assert!(registry
            .resolve_exception_handler(Some("constraints"))
            .unwrap()
            .is_some());
    }
}
