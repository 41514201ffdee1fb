//! In-memory backend error types.

use thiserror::Error;

use crate::transaction::HandlerOperation;

/// Errors raised by the in-memory backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Write attempted in a read-only transaction.
    #[error("transaction {tx_id} is read-only")]
    ReadOnly { tx_id: u64 },

    /// Operation not allowed in the transaction's current state.
    #[error("transaction {tx_id} is no longer active (state: {state})")]
    NotActive { tx_id: u64, state: String },

    /// Commit attempted on a rollback-only transaction.
    #[error("transaction {tx_id} is marked rollback-only")]
    RollbackOnly { tx_id: u64 },

    /// A failure injected with `MemoryHandler::fail_on`.
    #[error("injected failure during {0}")]
    Injected(HandlerOperation),
}

impl MemoryError {
    /// Check if this error was injected on purpose.
    pub fn is_injected(&self) -> bool {
        matches!(self, MemoryError::Injected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MemoryError::NotActive {
            tx_id: 3,
            state: "committed".to_string(),
        };
        assert_eq!(err.to_string(), "transaction 3 is no longer active (state: committed)");
        assert!(MemoryError::Injected(HandlerOperation::Commit).is_injected());
        assert!(!MemoryError::ReadOnly { tx_id: 1 }.is_injected());
    }
}
