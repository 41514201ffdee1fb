//! Transaction handles and the explicit propagation context.
//!
//! A [`TransactionContext`] is an immutable map from resource to the
//! transaction currently bound to it. Boundaries never mutate the context
//! they receive: binding or suspending a transaction derives a new context
//! that is handed to the body, so the caller's view is restored as soon as
//! the body returns.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use ulid::Ulid;

use crate::transaction::propagation::Propagation;

/// Identifies a transactional resource: a handler and one of its resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    handler: String,
    resource: String,
}

impl ResourceKey {
    pub fn new(handler: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            resource: resource.into(),
        }
    }

    /// Name of the handler driving this resource.
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Name of the resource.
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.handler, self.resource)
    }
}

/// Why a transaction was marked rollback-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackReason {
    /// The transaction was started read-only.
    ReadOnly,
    /// A joined inner boundary failed.
    Participant,
    /// The owning boundary failed.
    Failure,
}

/// Where a transaction is in its lifecycle, from the owner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Active,
    Committed,
    RolledBack,
}

struct HandleInner<T> {
    id: String,
    key: ResourceKey,
    propagation: Propagation,
    read_only: bool,
    started_at: DateTime<Utc>,
    status: Mutex<HandleStatus>,
    transaction: Mutex<T>,
}

struct HandleStatus {
    state: HandleState,
    rollback: Option<RollbackReason>,
}

/// Shared handle over one active backend transaction.
///
/// Cloning the handle shares the transaction. Only the boundary that created
/// it commits, rolls back or releases it; joined boundaries may only mark it
/// rollback-only.
pub struct TransactionHandle<T> {
    inner: Arc<HandleInner<T>>,
}

impl<T> Clone for TransactionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> TransactionHandle<T> {
    pub(crate) fn new(
        key: ResourceKey,
        propagation: Propagation,
        read_only: bool,
        transaction: T,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Ulid::new().to_string().to_lowercase(),
                key,
                propagation,
                read_only,
                started_at: Utc::now(),
                status: Mutex::new(HandleStatus {
                    state: HandleState::Active,
                    rollback: None,
                }),
                transaction: Mutex::new(transaction),
            }),
        }
    }

    /// Get the transaction ID.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Get the resource this transaction is bound to.
    pub fn key(&self) -> &ResourceKey {
        &self.inner.key
    }

    /// Get the propagation of the boundary that created it.
    pub fn propagation(&self) -> Propagation {
        self.inner.propagation
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    /// When the transaction was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// Time since the transaction was created.
    pub fn elapsed(&self) -> Duration {
        Utc::now() - self.inner.started_at
    }

    pub fn state(&self) -> HandleState {
        self.inner.status.lock().state
    }

    pub fn is_rollback_only(&self) -> bool {
        self.inner.status.lock().rollback.is_some()
    }

    /// Why this transaction was marked rollback-only.
    ///
    /// A failure reported after a read-only mark replaces it; otherwise the
    /// first reason is kept.
    pub fn rollback_reason(&self) -> Option<RollbackReason> {
        self.inner.status.lock().rollback
    }

    /// Check if both handles share the same transaction.
    pub fn same_transaction(&self, other: &TransactionHandle<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Lock the backend transaction.
    ///
    /// Do not hold the guard across a nested boundary on the same resource.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.transaction.lock()
    }

    /// Run `f` with exclusive access to the backend transaction.
    ///
    /// The lock is not reentrant: `f` must not enter a nested boundary on the
    /// same resource.
    pub fn with_transaction<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.transaction.lock();
        f(&mut guard)
    }

    pub(crate) fn mark_rollback_only(&self, reason: RollbackReason) {
        let mut status = self.inner.status.lock();
        match status.rollback {
            None | Some(RollbackReason::ReadOnly) => status.rollback = Some(reason),
            Some(_) => {}
        }
    }

    pub(crate) fn set_state(&self, state: HandleState) {
        self.inner.status.lock().state = state;
    }
}

impl<T> fmt::Debug for TransactionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.inner.status.lock();
        f.debug_struct("TransactionHandle")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("propagation", &self.inner.propagation)
            .field("state", &status.state)
            .field("rollback", &status.rollback)
            .finish()
    }
}

/// Immutable map of the transactions bound to each resource.
pub struct TransactionContext<T> {
    bindings: Arc<BTreeMap<ResourceKey, TransactionHandle<T>>>,
}

impl<T> Clone for TransactionContext<T> {
    fn clone(&self) -> Self {
        Self {
            bindings: Arc::clone(&self.bindings),
        }
    }
}

impl<T> Default for TransactionContext<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TransactionContext<T> {
    /// Create an empty context: no transaction on any resource.
    pub fn new() -> Self {
        Self {
            bindings: Arc::new(BTreeMap::new()),
        }
    }

    /// Get the transaction bound to `key`.
    pub fn get(&self, key: &ResourceKey) -> Option<&TransactionHandle<T>> {
        self.bindings.get(key)
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.bindings.contains_key(key)
    }

    /// Get the number of bound transactions.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// List the resources that have a bound transaction.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceKey> {
        self.bindings.keys()
    }

    /// Derive a context where `handle` is bound to its resource.
    ///
    /// Any transaction previously bound to that resource is shadowed.
    pub fn with_transaction(&self, handle: TransactionHandle<T>) -> Self {
        let mut bindings = BTreeMap::clone(&self.bindings);
        bindings.insert(handle.key().clone(), handle);
        Self {
            bindings: Arc::new(bindings),
        }
    }

    /// Derive a context where `key` has no bound transaction.
    pub fn without_transaction(&self, key: &ResourceKey) -> Self {
        if !self.bindings.contains_key(key) {
            return self.clone();
        }
        let mut bindings = BTreeMap::clone(&self.bindings);
        bindings.remove(key);
        Self {
            bindings: Arc::new(bindings),
        }
    }
}

impl<T> fmt::Debug for TransactionContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.bindings.iter().map(|(k, h)| (k.to_string(), h.id().to_string())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(resource: &str) -> TransactionHandle<Vec<u32>> {
        TransactionHandle::new(
            ResourceKey::new("memory", resource),
            Propagation::Required,
            false,
            Vec::new(),
        )
    }

    #[test]
    fn test_with_transaction_leaves_parent_untouched() {
        let root = TransactionContext::new();
        let outer = handle("main");
        let ctx = root.with_transaction(outer.clone());

        assert!(root.is_empty());
        assert!(ctx.get(outer.key()).unwrap().same_transaction(&outer));
    }

    #[test]
    fn test_shadow_and_restore() {
        let outer = handle("main");
        let inner = handle("main");
        let ctx = TransactionContext::new().with_transaction(outer.clone());
        let nested = ctx.with_transaction(inner.clone());

        assert!(nested.get(inner.key()).unwrap().same_transaction(&inner));
        assert!(ctx.get(outer.key()).unwrap().same_transaction(&outer));
        assert_eq!(nested.len(), 1);
    }

    #[test]
    fn test_without_transaction() {
        let outer = handle("main");
        let other = handle("audit");
        let ctx = TransactionContext::new()
            .with_transaction(outer.clone())
            .with_transaction(other.clone());

        let suspended = ctx.without_transaction(outer.key());
        assert!(!suspended.contains(outer.key()));
        assert!(suspended.contains(other.key()));
        assert!(ctx.contains(outer.key()));
    }

    #[test]
    fn test_rollback_reason_keeps_first() {
        let h = handle("main");
        assert!(!h.is_rollback_only());
        h.mark_rollback_only(RollbackReason::Participant);
        h.mark_rollback_only(RollbackReason::Failure);
        assert_eq!(h.rollback_reason(), Some(RollbackReason::Participant));
    }

    #[test]
    fn test_failure_replaces_read_only_mark() {
        let h = handle("main");
        h.mark_rollback_only(RollbackReason::ReadOnly);
        h.mark_rollback_only(RollbackReason::Participant);
        assert_eq!(h.rollback_reason(), Some(RollbackReason::Participant));

        h.mark_rollback_only(RollbackReason::ReadOnly);
        assert_eq!(h.rollback_reason(), Some(RollbackReason::Participant));
    }

    #[test]
    fn test_elapsed_since_start() {
        let h = handle("main");
        assert!(h.started_at() <= Utc::now());
        assert!(h.elapsed() >= Duration::zero());
        assert_eq!(h.propagation(), Propagation::Required);
        assert!(!h.is_read_only());
    }

    #[test]
    fn test_with_transaction_mutates_backend_object() {
        let h = handle("main");
        h.with_transaction(|tx| tx.push(7));
        assert_eq!(*h.lock(), vec![7]);
        assert_eq!(h.state(), HandleState::Active);
        assert_eq!(h.id().len(), 26);
    }
}
