//! Transaction handler SPI.
//!
//! A handler adapts one backend client (a SQL connection, a graph session,
//! a key-value pipeline, ...) to the lifecycle driven by
//! [`TransactionManager`](crate::transaction::TransactionManager).
//!
//! For every boundary that creates a transaction the manager calls, in order:
//!
//! ```text
//! do_initialize → do_create_transaction → [do_join_global_transaction]
//!   → do_begin_transaction → body → do_commit_transaction | do_rollback_transaction
//!   → do_release_transaction → do_cleanup
//! ```
//!
//! `do_release_transaction` runs exactly once per created transaction and
//! `do_cleanup` runs once per boundary, on every exit path.

use crate::transaction::context::{ResourceKey, TransactionContext, TransactionHandle};
use crate::transaction::error::HandlerError;
use crate::transaction::metadata::TransactionMetadata;

/// Backend-specific transaction lifecycle hooks.
///
/// Several backends behind one manager are expressed as an enum implementing
/// this trait by delegating to each variant.
pub trait TransactionHandler {
    /// The backend's own transaction object.
    type Transaction;

    /// Name used to select this handler from metadata.
    fn name(&self) -> &str;

    /// Bind per-boundary configuration. Called once per boundary.
    fn do_initialize(&self, _metadata: &TransactionMetadata) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Create a transaction object for the resource named in `metadata`.
    fn do_create_transaction(
        &self,
        metadata: &TransactionMetadata,
    ) -> Result<Self::Transaction, HandlerError>;

    /// Attach to an ambient global transaction, when the platform has one.
    fn do_join_global_transaction(
        &self,
        _transaction: &mut Self::Transaction,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    fn do_begin_transaction(&self, transaction: &mut Self::Transaction) -> Result<(), HandlerError>;

    fn do_commit_transaction(&self, transaction: &mut Self::Transaction)
        -> Result<(), HandlerError>;

    fn do_mark_transaction_as_rollback_only(
        &self,
        transaction: &mut Self::Transaction,
    ) -> Result<(), HandlerError>;

    fn do_rollback_transaction(
        &self,
        transaction: &mut Self::Transaction,
    ) -> Result<(), HandlerError>;

    /// Release backend resources. Must tolerate being called after a failed
    /// begin, commit or rollback.
    fn do_release_transaction(
        &self,
        transaction: &mut Self::Transaction,
    ) -> Result<(), HandlerError>;

    /// Post-release housekeeping for the boundary.
    fn do_cleanup(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// The transaction currently bound to `key` in `context`.
    fn get_current_transaction(
        &self,
        context: &TransactionContext<Self::Transaction>,
        key: &ResourceKey,
    ) -> Option<TransactionHandle<Self::Transaction>> {
        context.get(key).cloned()
    }
}
