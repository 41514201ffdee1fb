//! Declarative transaction boundaries.
//!
//! This module wraps calls in transactions according to per-call metadata.
//! A boundary resolves its metadata, drives a backend-specific
//! [`TransactionHandler`] through its lifecycle and applies propagation:
//! joining the caller's transaction, starting a new one, suspending it, or
//! refusing to run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │  (resolves metadata, applies propagation, commit/rollback)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │  Metadata   │       │  Handler    │       │ Transaction │
//!  │  Resolver   │       │  Registry   │       │  Context    │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! There is no ambient state: the caller passes a [`TransactionContext`]
//! into each boundary and the body receives the context it must pass on.
//!
//! # Usage
//!
//! ```ignore
//! use seedtx::transaction::{Propagation, TransactionContext, TransactionError};
//!
//! let root = TransactionContext::new();
//!
//! manager.run(&root, Propagation::Required, |ctx| {
//!     save_order(ctx)?;
//!     // Audit entries survive even if the order is rolled back.
//!     manager.run(ctx, Propagation::RequiresNew, |ctx| audit(ctx))?;
//!     Ok(())
//! })?;
//! ```

mod config;
mod context;
mod error;
mod exception;
mod handler;
mod manager;
mod metadata;
mod propagation;
mod registry;
mod resolver;

pub use config::{ConfigError, TransactionConfig};
pub use context::{
    HandleState, ResourceKey, RollbackReason, TransactionContext, TransactionHandle,
};
pub use error::{
    Categorized, ConfigurationError, ErrorCode, HandlerError, HandlerOperation,
    ParsePropagationError, TransactionError, TransactionResult,
};
pub use exception::{CategoryExceptionHandler, ExceptionHandler};
pub use handler::TransactionHandler;
pub use manager::{BoundaryState, ManagerStats, TransactionManager};
pub use metadata::TransactionMetadata;
pub use propagation::Propagation;
pub use registry::HandlerRegistry;
pub use resolver::{
    AttributeResolver, Invocation, ResolverChain, TransactionMetadataResolver,
    TransactionalAttributes,
};
