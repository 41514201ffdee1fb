//! Transaction handler over in-memory stores.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use super::error::MemoryError;
use super::store::MemoryStore;
use crate::transaction::{HandlerError, HandlerOperation, TransactionHandler, TransactionMetadata};

/// Lifecycle state of a [`MemoryTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTxState {
    Created,
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for MemoryTxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryTxState::Created => write!(f, "created"),
            MemoryTxState::Active => write!(f, "active"),
            MemoryTxState::Committed => write!(f, "committed"),
            MemoryTxState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// A transaction staging writes against one store.
#[derive(Debug)]
pub struct MemoryTransaction {
    id: u64,
    resource: String,
    store: MemoryStore,
    writes: BTreeMap<String, Option<Value>>,
    state: MemoryTxState,
    read_only: bool,
    rollback_only: bool,
    released: bool,
}

impl MemoryTransaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn state(&self) -> MemoryTxState {
        self.state
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Number of staged writes.
    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Read a value, seeing this transaction's own writes.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.writes.get(key) {
            Some(staged) => staged.clone(),
            None => self.store.get(key),
        }
    }

    /// Stage a write.
    pub fn put(&mut self, key: impl Into<String>, value: Value) -> Result<(), MemoryError> {
        self.check_writable()?;
        self.writes.insert(key.into(), Some(value));
        Ok(())
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: impl Into<String>) -> Result<(), MemoryError> {
        self.check_writable()?;
        self.writes.insert(key.into(), None);
        Ok(())
    }

    fn check_writable(&self) -> Result<(), MemoryError> {
        if self.read_only {
            return Err(MemoryError::ReadOnly { tx_id: self.id });
        }
        self.check_state(MemoryTxState::Active)
    }

    fn check_state(&self, expected: MemoryTxState) -> Result<(), MemoryError> {
        if self.state != expected {
            return Err(MemoryError::NotActive {
                tx_id: self.id,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }
}

/// One journaled handler call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerEvent {
    pub operation: HandlerOperation,
    pub resource: Option<String>,
    pub transaction: Option<u64>,
}

impl fmt::Display for HandlerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        if let Some(resource) = &self.resource {
            write!(f, " resource={}", resource)?;
        }
        if let Some(id) = self.transaction {
            write!(f, " tx={}", id)?;
        }
        Ok(())
    }
}

/// Transaction handler over in-memory stores, one per resource.
pub struct MemoryHandler {
    name: String,
    stores: RwLock<BTreeMap<String, MemoryStore>>,
    journal: Mutex<Vec<HandlerEvent>>,
    faults: Mutex<BTreeSet<HandlerOperation>>,
    next_id: AtomicU64,
}

impl MemoryHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stores: RwLock::new(BTreeMap::new()),
            journal: Mutex::new(Vec::new()),
            faults: Mutex::new(BTreeSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the store of `resource`, creating it on first use.
    pub fn store(&self, resource: &str) -> MemoryStore {
        if let Some(store) = self.stores.read().get(resource) {
            return store.clone();
        }
        self.stores
            .write()
            .entry(resource.to_string())
            .or_default()
            .clone()
    }

    /// Snapshot of every store, by resource.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        self.stores
            .read()
            .iter()
            .map(|(resource, store)| (resource.clone(), store.snapshot()))
            .collect()
    }

    /// Make every future call of `operation` fail.
    pub fn fail_on(&self, operation: HandlerOperation) {
        self.faults.lock().insert(operation);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// All journaled calls, oldest first.
    pub fn events(&self) -> Vec<HandlerEvent> {
        self.journal.lock().clone()
    }

    /// Journaled operations, oldest first.
    pub fn operations(&self) -> Vec<HandlerOperation> {
        self.journal.lock().iter().map(|e| e.operation).collect()
    }

    /// Number of journaled calls of `operation`.
    pub fn count(&self, operation: HandlerOperation) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|e| e.operation == operation)
            .count()
    }

    pub fn clear_events(&self) {
        self.journal.lock().clear();
    }

    fn record(
        &self,
        operation: HandlerOperation,
        resource: Option<&str>,
        transaction: Option<u64>,
    ) -> Result<(), MemoryError> {
        let event = HandlerEvent {
            operation,
            resource: resource.map(str::to_string),
            transaction,
        };
        trace!(handler = %self.name, event = %event, "memory handler call");
        self.journal.lock().push(event);
        if self.faults.lock().contains(&operation) {
            return Err(MemoryError::Injected(operation));
        }
        Ok(())
    }

    fn record_tx(
        &self,
        operation: HandlerOperation,
        tx: &MemoryTransaction,
    ) -> Result<(), MemoryError> {
        self.record(operation, Some(&tx.resource), Some(tx.id))
    }
}

impl TransactionHandler for MemoryHandler {
    type Transaction = MemoryTransaction;

    fn name(&self) -> &str {
        &self.name
    }

    fn do_initialize(&self, metadata: &TransactionMetadata) -> Result<(), HandlerError> {
        self.record(HandlerOperation::Initialize, metadata.resource.as_deref(), None)?;
        Ok(())
    }

    fn do_create_transaction(
        &self,
        metadata: &TransactionMetadata,
    ) -> Result<MemoryTransaction, HandlerError> {
        let resource = metadata.resource.as_deref().unwrap_or(&self.name);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(HandlerOperation::Create, Some(resource), Some(id))?;
        Ok(MemoryTransaction {
            id,
            resource: resource.to_string(),
            store: self.store(resource),
            writes: BTreeMap::new(),
            state: MemoryTxState::Created,
            read_only: metadata.read_only,
            rollback_only: false,
            released: false,
        })
    }

    fn do_join_global_transaction(&self, tx: &mut MemoryTransaction) -> Result<(), HandlerError> {
        // No global coordinator; journaled only.
        self.record_tx(HandlerOperation::JoinGlobal, tx)?;
        Ok(())
    }

    fn do_begin_transaction(&self, tx: &mut MemoryTransaction) -> Result<(), HandlerError> {
        self.record_tx(HandlerOperation::Begin, tx)?;
        tx.check_state(MemoryTxState::Created)?;
        tx.state = MemoryTxState::Active;
        Ok(())
    }

    fn do_commit_transaction(&self, tx: &mut MemoryTransaction) -> Result<(), HandlerError> {
        self.record_tx(HandlerOperation::Commit, tx)?;
        tx.check_state(MemoryTxState::Active)?;
        if tx.rollback_only {
            return Err(MemoryError::RollbackOnly { tx_id: tx.id }.into());
        }
        if !tx.writes.is_empty() {
            tx.store.apply(&tx.writes);
        }
        tx.writes.clear();
        tx.state = MemoryTxState::Committed;
        Ok(())
    }

    fn do_mark_transaction_as_rollback_only(
        &self,
        tx: &mut MemoryTransaction,
    ) -> Result<(), HandlerError> {
        self.record_tx(HandlerOperation::MarkRollbackOnly, tx)?;
        tx.rollback_only = true;
        Ok(())
    }

    fn do_rollback_transaction(&self, tx: &mut MemoryTransaction) -> Result<(), HandlerError> {
        self.record_tx(HandlerOperation::Rollback, tx)?;
        if tx.state == MemoryTxState::Committed {
            return Err(MemoryError::NotActive {
                tx_id: tx.id,
                state: tx.state.to_string(),
            }
            .into());
        }
        tx.writes.clear();
        tx.state = MemoryTxState::RolledBack;
        Ok(())
    }

    fn do_release_transaction(&self, tx: &mut MemoryTransaction) -> Result<(), HandlerError> {
        self.record_tx(HandlerOperation::Release, tx)?;
        tx.writes.clear();
        tx.released = true;
        Ok(())
    }

    fn do_cleanup(&self) -> Result<(), HandlerError> {
        self.record(HandlerOperation::Cleanup, None, None)?;
        Ok(())
    }
}

impl fmt::Debug for MemoryHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHandler")
            .field("name", &self.name)
            .field("resources", &self.stores.read().keys().collect::<Vec<_>>())
            .field("events", &self.journal.lock().len())
            .finish()
    }
}
