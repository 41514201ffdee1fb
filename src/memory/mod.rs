//! In-memory reference backend.
//!
//! A [`MemoryHandler`] drives transactions over [`MemoryStore`]s, one store
//! per resource. Writes are staged in the transaction and applied to the
//! store atomically on commit. Every lifecycle call is journaled, and any
//! step can be made to fail, which makes the handler useful for exercising
//! propagation rules.
//!
//! # Usage
//!
//! ```
//! use seedtx::memory::MemoryHandler;
//! use seedtx::transaction::{
//!     HandlerRegistry, Propagation, TransactionContext, TransactionManager, TransactionResult,
//! };
//!
//! let registry = HandlerRegistry::new().with_handler(MemoryHandler::new("memory"));
//! let manager = TransactionManager::new(registry);
//!
//! let result: TransactionResult<(), std::convert::Infallible> =
//!     manager.run(&TransactionContext::new(), Propagation::Required, |ctx| {
//!         for handle in ctx.resources().filter_map(|key| ctx.get(key)) {
//!             handle.with_transaction(|tx| tx.put("greeting", "hello".into())).unwrap();
//!         }
//!         Ok(())
//!     });
//! assert!(result.is_ok());
//! ```

mod error;
mod handler;
mod store;

pub use error::MemoryError;
pub use handler::{HandlerEvent, MemoryHandler, MemoryTransaction, MemoryTxState};
pub use store::MemoryStore;
