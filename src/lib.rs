//! SeedTx - transactional boundaries with pluggable handlers
//!
//! This crate wraps units of work in transactions driven by a
//! [`TransactionHandler`](transaction::TransactionHandler). Propagation
//! policies decide whether a boundary joins the caller's transaction, starts
//! its own, runs without one, or refuses to run. The transaction in scope
//! travels in an explicit, immutable
//! [`TransactionContext`](transaction::TransactionContext).
//!
//! # Example
//!
//! ```
//! use seedtx::memory::MemoryHandler;
//! use seedtx::transaction::{
//!     HandlerRegistry, Propagation, TransactionContext, TransactionManager, TransactionResult,
//! };
//!
//! let manager = TransactionManager::new(HandlerRegistry::new().with_handler(MemoryHandler::new("memory")));
//! let result: TransactionResult<u32, std::io::Error> =
//!     manager.run(&TransactionContext::new(), Propagation::Required, |ctx| {
//!         assert_eq!(ctx.len(), 1);
//!         Ok(42)
//!     });
//! assert_eq!(result.unwrap(), 42);
//! assert_eq!(manager.stats().committed, 1);
//! ```

pub mod memory;
pub mod scenario;
pub mod transaction;
