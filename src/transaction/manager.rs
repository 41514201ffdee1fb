//! Transaction manager - the transactional boundary.
//!
//! The TransactionManager wraps a call in a transaction according to its
//! resolved metadata. It handles:
//! - Metadata resolution and handler lookup
//! - Propagation (join, create, suspend, or refuse)
//! - Commit/rollback decisions on exit
//! - Guaranteed release and cleanup on every exit path
//!
//! # Entry transitions
//!
//! ```text
//!                 │ no current tx        │ current tx
//! ────────────────┼──────────────────────┼──────────────────────
//! REQUIRED        │ CreatedNew           │ JoinedExisting
//! REQUIRES_NEW    │ CreatedNew           │ CreatedNew (shadowing)
//! MANDATORY       │ error                │ JoinedExisting
//! SUPPORTS        │ NoTransaction        │ JoinedExisting
//! NOT_SUPPORTED   │ NoTransaction        │ NoTransaction (suspended)
//! NEVER           │ NoTransaction        │ error
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::transaction::config::TransactionConfig;
use crate::transaction::context::{
    HandleState, ResourceKey, RollbackReason, TransactionContext, TransactionHandle,
};
use crate::transaction::error::{
    Categorized, ConfigurationError, ErrorCode, HandlerError, HandlerOperation, TransactionError,
    TransactionResult,
};
use crate::transaction::exception::ExceptionHandler;
use crate::transaction::handler::TransactionHandler;
use crate::transaction::metadata::TransactionMetadata;
use crate::transaction::propagation::Propagation;
use crate::transaction::registry::HandlerRegistry;
use crate::transaction::resolver::{AttributeResolver, Invocation, TransactionMetadataResolver};

/// How a boundary relates to the transaction of its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryState {
    /// The body runs without a transaction.
    NoTransaction,
    /// The body runs in the caller's transaction; the caller decides its fate.
    JoinedExisting,
    /// The body runs in a transaction this boundary owns.
    CreatedNew,
}

impl BoundaryState {
    /// Compute the entry transition for `propagation`.
    pub fn enter(propagation: Propagation, has_current: bool) -> Result<Self, ConfigurationError> {
        match (propagation, has_current) {
            (Propagation::RequiresNew, _) | (Propagation::Required, false) => {
                Ok(BoundaryState::CreatedNew)
            }
            (Propagation::Required | Propagation::Mandatory | Propagation::Supports, true) => {
                Ok(BoundaryState::JoinedExisting)
            }
            (Propagation::Mandatory, false) => Err(ConfigurationError::new(
                ErrorCode::NoTransactionForMandatory,
                "MANDATORY propagation requires an active transaction",
            )),
            (Propagation::Never, true) => Err(ConfigurationError::new(
                ErrorCode::ExistingTransactionForNever,
                "NEVER propagation forbids an active transaction",
            )),
            (Propagation::Supports | Propagation::Never, false) | (Propagation::NotSupported, _) => {
                Ok(BoundaryState::NoTransaction)
            }
        }
    }
}

/// Counters of what the manager did since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub created: u64,
    pub joined: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    joined: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

type ExceptionHandlerRef<'a, T> = Option<&'a Arc<dyn ExceptionHandler<T>>>;

/// Drives transaction handlers around transactional bodies.
pub struct TransactionManager<H: TransactionHandler> {
    config: TransactionConfig,
    registry: HandlerRegistry<H>,
    resolver: Box<dyn TransactionMetadataResolver>,
    counters: Counters,
}

impl<H: TransactionHandler> TransactionManager<H> {
    /// Create a manager with the default configuration.
    pub fn new(registry: HandlerRegistry<H>) -> Self {
        Self {
            config: TransactionConfig::default(),
            registry,
            resolver: Box::new(AttributeResolver),
            counters: Counters::default(),
        }
    }

    /// Create a manager, checking that configured defaults are registered.
    pub fn with_config(
        config: TransactionConfig,
        registry: HandlerRegistry<H>,
    ) -> Result<Self, ConfigurationError> {
        if let Some(name) = config.default_handler.as_deref() {
            if registry.get(name).is_none() {
                return Err(ConfigurationError::new(
                    ErrorCode::InvalidConfig,
                    format!("default handler '{}' is not registered", name),
                ));
            }
        }
        if let Some(name) = config.default_exception_handler.as_deref() {
            registry.resolve_exception_handler(Some(name)).map_err(|_| {
                ConfigurationError::new(
                    ErrorCode::InvalidConfig,
                    format!("default exception handler '{}' is not registered", name),
                )
            })?;
        }
        Ok(Self {
            config,
            ..Self::new(registry)
        })
    }

    /// Replace the metadata resolver.
    pub fn with_resolver(mut self, resolver: impl TransactionMetadataResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry<H> {
        &self.registry
    }

    /// Get a snapshot of the manager's counters.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            created: self.counters.created.load(Ordering::Relaxed),
            joined: self.counters.joined.load(Ordering::Relaxed),
            committed: self.counters.committed.load(Ordering::Relaxed),
            rolled_back: self.counters.rolled_back.load(Ordering::Relaxed),
        }
    }

    /// Resolve the effective metadata of an invocation.
    pub fn resolve(&self, invocation: &Invocation) -> TransactionMetadata {
        self.resolver
            .resolve(invocation, &self.config.default_metadata())
    }

    /// Resource key a boundary with `metadata` would bind to.
    pub fn resource_key(&self, metadata: &TransactionMetadata) -> Result<ResourceKey, ConfigurationError> {
        let (name, _) = self.registry.resolve(self.handler_name(metadata))?;
        Ok(ResourceKey::new(name, self.resource_name(name, metadata)))
    }

    /// Run `body` across the boundary described by `invocation`.
    pub fn invoke<R, E, F>(
        &self,
        context: &TransactionContext<H::Transaction>,
        invocation: &Invocation,
        body: F,
    ) -> TransactionResult<R, E>
    where
        E: Categorized,
        F: FnOnce(&TransactionContext<H::Transaction>) -> TransactionResult<R, E>,
    {
        let metadata = self.resolve(invocation);
        debug!(method = %invocation.method, metadata = %metadata, "resolved transaction metadata");
        self.invoke_with(context, &metadata, body)
    }

    /// Run `body` with the configured defaults and the given propagation.
    pub fn run<R, E, F>(
        &self,
        context: &TransactionContext<H::Transaction>,
        propagation: Propagation,
        body: F,
    ) -> TransactionResult<R, E>
    where
        E: Categorized,
        F: FnOnce(&TransactionContext<H::Transaction>) -> TransactionResult<R, E>,
    {
        let metadata = self.config.default_metadata().with_propagation(propagation);
        self.invoke_with(context, &metadata, body)
    }

    /// Run `body` across a boundary with already resolved metadata.
    pub fn invoke_with<R, E, F>(
        &self,
        context: &TransactionContext<H::Transaction>,
        metadata: &TransactionMetadata,
        body: F,
    ) -> TransactionResult<R, E>
    where
        E: Categorized,
        F: FnOnce(&TransactionContext<H::Transaction>) -> TransactionResult<R, E>,
    {
        let (name, handler) = self.registry.resolve(self.handler_name(metadata))?;
        let metadata = TransactionMetadata {
            handler: Some(name.to_string()),
            resource: Some(self.resource_name(name, metadata)),
            exception_handler: metadata
                .exception_handler
                .clone()
                .or_else(|| self.config.default_exception_handler.clone()),
            ..metadata.clone()
        };
        let exception_handler = self
            .registry
            .resolve_exception_handler(metadata.exception_handler.as_deref())?;
        let key = ResourceKey::new(name, metadata.resource.as_deref().unwrap_or(name));
        let handler: &H = handler;

        let _cleanup = CleanupGuard { handler };
        handler
            .do_initialize(&metadata)
            .map_err(|e| TransactionError::handler(HandlerOperation::Initialize, e))?;

        let current = handler.get_current_transaction(context, &key);
        let state = BoundaryState::enter(metadata.propagation, current.is_some())?;
        debug!(resource = %key, propagation = %metadata.propagation, ?state, "entering transactional boundary");

        match (state, current) {
            (BoundaryState::CreatedNew, _) => {
                self.run_new(handler, exception_handler, &metadata, key, context, body)
            }
            (BoundaryState::JoinedExisting, Some(handle)) => {
                self.run_joined(handler, exception_handler, &metadata, &handle, context, body)
            }
            (BoundaryState::NoTransaction, Some(handle)) => {
                debug!(resource = %key, tx = handle.id(), "suspending transaction");
                body(&context.without_transaction(&key))
            }
            (_, None) => body(context),
        }
    }

    fn handler_name<'a>(&'a self, metadata: &'a TransactionMetadata) -> Option<&'a str> {
        metadata
            .handler
            .as_deref()
            .or(self.config.default_handler.as_deref())
    }

    fn resource_name(&self, handler: &str, metadata: &TransactionMetadata) -> String {
        metadata
            .resource
            .as_deref()
            .or(self.config.default_resource.as_deref())
            .unwrap_or(handler)
            .to_string()
    }

    fn run_new<R, E, F>(
        &self,
        handler: &H,
        exception_handler: ExceptionHandlerRef<'_, H::Transaction>,
        metadata: &TransactionMetadata,
        key: ResourceKey,
        context: &TransactionContext<H::Transaction>,
        body: F,
    ) -> TransactionResult<R, E>
    where
        E: Categorized,
        F: FnOnce(&TransactionContext<H::Transaction>) -> TransactionResult<R, E>,
    {
        let transaction = handler
            .do_create_transaction(metadata)
            .map_err(|e| TransactionError::handler(HandlerOperation::Create, e))?;
        let handle = TransactionHandle::new(key, metadata.propagation, metadata.read_only, transaction);
        self.counters.created.fetch_add(1, Ordering::Relaxed);

        // Rolls back if still active, then releases.
        let _release = ReleaseGuard {
            handler,
            handle: &handle,
            counters: &self.counters,
        };

        if self.config.join_global {
            handle
                .with_transaction(|tx| handler.do_join_global_transaction(tx))
                .map_err(|e| TransactionError::handler(HandlerOperation::JoinGlobal, e))?;
        }
        handle
            .with_transaction(|tx| handler.do_begin_transaction(tx))
            .map_err(|e| TransactionError::handler(HandlerOperation::Begin, e))?;
        debug!(tx = handle.id(), resource = %handle.key(), propagation = %handle.propagation(), "transaction begun");

        if handle.is_read_only() {
            self.mark_rollback_only(handler, &handle, RollbackReason::ReadOnly)
                .map_err(|e| TransactionError::handler(HandlerOperation::MarkRollbackOnly, e))?;
        }

        let outcome = body(&context.with_transaction(handle.clone()));

        match outcome {
            Ok(value) => match handle.rollback_reason() {
                None => {
                    self.commit(handler, &handle)
                        .map_err(|e| TransactionError::handler(HandlerOperation::Commit, e))?;
                    Ok(value)
                }
                Some(RollbackReason::ReadOnly) => {
                    self.rollback(handler, &handle)
                        .map_err(|e| TransactionError::handler(HandlerOperation::Rollback, e))?;
                    Ok(value)
                }
                Some(reason) => {
                    self.rollback(handler, &handle)
                        .map_err(|e| TransactionError::handler(HandlerOperation::Rollback, e))?;
                    Err(TransactionError::configuration(
                        ErrorCode::UnexpectedRollback,
                        format!(
                            "transaction {} was rolled back: marked rollback-only ({:?})",
                            handle.id(),
                            reason
                        ),
                    ))
                }
            },
            Err(error) => {
                let rollback = rollback_required(metadata, &error) || handle.is_rollback_only();
                let handled = consult(exception_handler, &error, metadata, &handle);
                debug!(tx = handle.id(), %error, rollback, handled, "transactional body failed");

                if rollback {
                    if let Err(e) = self.mark_rollback_only(handler, &handle, RollbackReason::Failure) {
                        warn!(tx = handle.id(), error = %e, "could not mark transaction rollback-only");
                    }
                    if let Err(e) = self.rollback(handler, &handle) {
                        warn!(tx = handle.id(), error = %e, "rollback failed after body error");
                    }
                } else if let Err(e) = self.commit(handler, &handle) {
                    warn!(tx = handle.id(), error = %e, "commit failed after body error");
                }
                Err(error)
            }
        }
    }

    fn run_joined<R, E, F>(
        &self,
        handler: &H,
        exception_handler: ExceptionHandlerRef<'_, H::Transaction>,
        metadata: &TransactionMetadata,
        handle: &TransactionHandle<H::Transaction>,
        context: &TransactionContext<H::Transaction>,
        body: F,
    ) -> TransactionResult<R, E>
    where
        E: Categorized,
        F: FnOnce(&TransactionContext<H::Transaction>) -> TransactionResult<R, E>,
    {
        self.counters.joined.fetch_add(1, Ordering::Relaxed);
        debug!(tx = handle.id(), resource = %handle.key(), "joining transaction");

        match body(context) {
            Ok(value) => Ok(value),
            Err(error) => {
                let rollback = rollback_required(metadata, &error);
                let handled = consult(exception_handler, &error, metadata, handle);
                debug!(tx = handle.id(), %error, rollback, handled, "participant failed");

                if rollback && !handled {
                    if let Err(e) = self.mark_rollback_only(handler, handle, RollbackReason::Participant) {
                        warn!(tx = handle.id(), error = %e, "could not mark transaction rollback-only");
                    }
                }
                Err(error)
            }
        }
    }

    fn mark_rollback_only(
        &self,
        handler: &H,
        handle: &TransactionHandle<H::Transaction>,
        reason: RollbackReason,
    ) -> Result<(), HandlerError> {
        handle.mark_rollback_only(reason);
        handle.with_transaction(|tx| handler.do_mark_transaction_as_rollback_only(tx))
    }

    /// Commit; on failure the handle stays active so the release guard rolls back.
    fn commit(&self, handler: &H, handle: &TransactionHandle<H::Transaction>) -> Result<(), HandlerError> {
        handle.with_transaction(|tx| handler.do_commit_transaction(tx))?;
        handle.set_state(HandleState::Committed);
        self.counters.committed.fetch_add(1, Ordering::Relaxed);
        info!(
            tx = handle.id(),
            resource = %handle.key(),
            elapsed_ms = handle.elapsed().num_milliseconds(),
            "transaction committed"
        );
        Ok(())
    }

    fn rollback(&self, handler: &H, handle: &TransactionHandle<H::Transaction>) -> Result<(), HandlerError> {
        let result = handle.with_transaction(|tx| handler.do_rollback_transaction(tx));
        handle.set_state(HandleState::RolledBack);
        self.counters.rolled_back.fetch_add(1, Ordering::Relaxed);
        result?;
        info!(
            tx = handle.id(),
            resource = %handle.key(),
            elapsed_ms = handle.elapsed().num_milliseconds(),
            "transaction rolled back"
        );
        Ok(())
    }
}

impl<H: TransactionHandler> std::fmt::Debug for TransactionManager<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Errors propagated from nested boundaries always roll back.
fn rollback_required<E: Categorized>(metadata: &TransactionMetadata, error: &TransactionError<E>) -> bool {
    match error {
        TransactionError::Body(e) => metadata.rollback_required(e),
        _ => true,
    }
}

fn consult<T, E: Categorized>(
    exception_handler: ExceptionHandlerRef<'_, T>,
    error: &TransactionError<E>,
    metadata: &TransactionMetadata,
    handle: &TransactionHandle<T>,
) -> bool {
    match exception_handler {
        Some(exception_handler) => {
            handle.with_transaction(|tx| exception_handler.handle_exception(error, metadata, tx))
        }
        None => false,
    }
}

struct ReleaseGuard<'a, H: TransactionHandler> {
    handler: &'a H,
    handle: &'a TransactionHandle<H::Transaction>,
    counters: &'a Counters,
}

impl<H: TransactionHandler> Drop for ReleaseGuard<'_, H> {
    fn drop(&mut self) {
        let handler = self.handler;
        if self.handle.state() == HandleState::Active {
            if let Err(e) = self
                .handle
                .with_transaction(|tx| handler.do_rollback_transaction(tx))
            {
                warn!(tx = self.handle.id(), error = %e, "best-effort rollback failed");
            }
            self.handle.set_state(HandleState::RolledBack);
            self.counters.rolled_back.fetch_add(1, Ordering::Relaxed);
            info!(tx = self.handle.id(), "transaction rolled back before release");
        }
        if let Err(e) = self
            .handle
            .with_transaction(|tx| handler.do_release_transaction(tx))
        {
            warn!(tx = self.handle.id(), error = %e, "transaction release failed");
        }
    }
}

struct CleanupGuard<'a, H: TransactionHandler> {
    handler: &'a H,
}

impl<H: TransactionHandler> Drop for CleanupGuard<'_, H> {
    fn drop(&mut self) {
        if let Err(e) = self.handler.do_cleanup() {
            warn!(handler = self.handler.name(), error = %e, "transaction cleanup failed");
        }
    }
}
