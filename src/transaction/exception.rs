//! Exception handler SPI.

use crate::transaction::error::Categorized;
use crate::transaction::metadata::TransactionMetadata;

/// Backend-specific reaction to an error raised inside a transaction.
///
/// Returning `true` means the handler dealt with the error on the backend
/// side. The error itself still reaches the caller; a handled error raised in
/// a joined boundary does not mark the owner's transaction rollback-only.
pub trait ExceptionHandler<T>: Send + Sync {
    fn handle_exception(
        &self,
        error: &dyn Categorized,
        metadata: &TransactionMetadata,
        transaction: &mut T,
    ) -> bool;
}

impl<T, F> ExceptionHandler<T> for F
where
    F: Fn(&dyn Categorized, &TransactionMetadata, &mut T) -> bool + Send + Sync,
{
    fn handle_exception(
        &self,
        error: &dyn Categorized,
        metadata: &TransactionMetadata,
        transaction: &mut T,
    ) -> bool {
        self(error, metadata, transaction)
    }
}

/// Handles every error belonging to one of a fixed set of categories.
#[derive(Debug, Clone, Default)]
pub struct CategoryExceptionHandler {
    categories: Vec<String>,
}

impl CategoryExceptionHandler {
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }
}

impl<T> ExceptionHandler<T> for CategoryExceptionHandler {
    fn handle_exception(
        &self,
        error: &dyn Categorized,
        metadata: &TransactionMetadata,
        _transaction: &mut T,
    ) -> bool {
        let handled = self
            .categories
            .iter()
            .any(|category| error.in_category(category));
        if handled {
            tracing::debug!(error = %error, metadata = %metadata, "exception handled");
        }
        handled
    }
}
