//! Metadata resolution for intercepted calls.
//!
//! An [`Invocation`] describes a call about to cross a transactional
//! boundary, together with the attributes declared on the method and on its
//! enclosing type. Resolvers turn it into effective [`TransactionMetadata`]:
//! method attributes override type attributes, which override the defaults.

use std::sync::Arc;

use crate::transaction::metadata::TransactionMetadata;
use crate::transaction::propagation::Propagation;

/// Transactional attributes declared on a method or a type.
///
/// Every field is optional; unset fields inherit from the enclosing level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionalAttributes {
    pub propagation: Option<Propagation>,
    pub handler: Option<String>,
    pub exception_handler: Option<String>,
    pub resource: Option<String>,
    pub read_only: Option<bool>,
    pub rollback_on: Option<Vec<String>>,
    pub no_rollback_for: Option<Vec<String>>,
}

impl TransactionalAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = Some(propagation);
        self
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn exception_handler(mut self, name: impl Into<String>) -> Self {
        self.exception_handler = Some(name.into());
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = Some(value);
        self
    }

    pub fn rollback_on<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rollback_on = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn no_rollback_for<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.no_rollback_for = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    /// Overlay the attributes that are set onto `metadata`.
    pub fn apply_to(&self, metadata: &mut TransactionMetadata) {
        if let Some(propagation) = self.propagation {
            metadata.propagation = propagation;
        }
        if let Some(handler) = &self.handler {
            metadata.handler = Some(handler.clone());
        }
        if let Some(name) = &self.exception_handler {
            metadata.exception_handler = Some(name.clone());
        }
        if let Some(resource) = &self.resource {
            metadata.resource = Some(resource.clone());
        }
        if let Some(read_only) = self.read_only {
            metadata.read_only = read_only;
        }
        if let Some(categories) = &self.rollback_on {
            metadata.rollback_on = categories.clone();
        }
        if let Some(categories) = &self.no_rollback_for {
            metadata.no_rollback_for = categories.clone();
        }
    }
}

/// A call about to cross a transactional boundary.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Qualified name of the invoked method, used in logs.
    pub method: String,
    /// Attributes declared on the method itself.
    pub method_attributes: Option<TransactionalAttributes>,
    /// Attributes declared on the enclosing type.
    pub type_attributes: Option<TransactionalAttributes>,
}

impl Invocation {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_method_attributes(mut self, attributes: TransactionalAttributes) -> Self {
        self.method_attributes = Some(attributes);
        self
    }

    pub fn with_type_attributes(mut self, attributes: TransactionalAttributes) -> Self {
        self.type_attributes = Some(attributes);
        self
    }
}

/// Produces effective metadata for an invocation.
///
/// Implementations must be deterministic, side-effect free and total.
pub trait TransactionMetadataResolver: Send + Sync {
    fn resolve(&self, invocation: &Invocation, defaults: &TransactionMetadata)
        -> TransactionMetadata;
}

impl<F> TransactionMetadataResolver for F
where
    F: Fn(&Invocation, &TransactionMetadata) -> TransactionMetadata + Send + Sync,
{
    fn resolve(
        &self,
        invocation: &Invocation,
        defaults: &TransactionMetadata,
    ) -> TransactionMetadata {
        self(invocation, defaults)
    }
}

/// Resolves metadata from declared attributes: defaults, then type, then method.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeResolver;

impl TransactionMetadataResolver for AttributeResolver {
    fn resolve(
        &self,
        invocation: &Invocation,
        defaults: &TransactionMetadata,
    ) -> TransactionMetadata {
        let mut metadata = defaults.clone();
        if let Some(attributes) = &invocation.type_attributes {
            attributes.apply_to(&mut metadata);
        }
        if let Some(attributes) = &invocation.method_attributes {
            attributes.apply_to(&mut metadata);
        }
        metadata
    }
}

/// Runs resolvers in order, each refining the previous result.
#[derive(Clone, Default)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn TransactionMetadataResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver to the chain.
    pub fn with(mut self, resolver: impl TransactionMetadataResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl TransactionMetadataResolver for ResolverChain {
    fn resolve(
        &self,
        invocation: &Invocation,
        defaults: &TransactionMetadata,
    ) -> TransactionMetadata {
        self.resolvers
            .iter()
            .fold(defaults.clone(), |metadata, resolver| {
                resolver.resolve(invocation, &metadata)
            })
    }
}

impl std::fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverChain")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}
