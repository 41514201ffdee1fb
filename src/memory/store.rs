//! Shared key-value store backing one in-memory resource.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

#[derive(Debug, Default)]
struct StoreInner {
    data: BTreeMap<String, Value>,
    version: u64,
}

/// Thread-safe key-value store; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a committed value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().data.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().data.is_empty()
    }

    /// Number of change sets applied so far.
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Copy of all committed data.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.read().data.clone()
    }

    /// Write outside any transaction.
    pub fn put(&self, key: impl Into<String>, value: Value) -> u64 {
        let mut writes = BTreeMap::new();
        writes.insert(key.into(), Some(value));
        self.apply(&writes)
    }

    /// Apply a change set atomically. `None` deletes the key.
    ///
    /// Returns the new version.
    pub fn apply(&self, writes: &BTreeMap<String, Option<Value>>) -> u64 {
        let mut inner = self.inner.write();
        for (key, value) in writes {
            match value {
                Some(value) => {
                    inner.data.insert(key.clone(), value.clone());
                }
                None => {
                    inner.data.remove(key);
                }
            }
        }
        inner.version += 1;
        inner.version
    }
}
