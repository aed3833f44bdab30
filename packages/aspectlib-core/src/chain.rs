//! Interceptors and their composition.

use std::fmt;
use std::sync::Arc;

use crate::operation::Operation;

/// Maps an operation to a replacement with the same call shape.
pub trait Interceptor: Send + Sync {
    fn wrap(&self, operation: Operation) -> Operation;
}

impl<F> Interceptor for F
where
    F: Fn(Operation) -> Operation + Send + Sync,
{
    fn wrap(&self, operation: Operation) -> Operation {
        self(operation)
    }
}

/// Interceptors nested around one operation, outermost first.
///
/// `InterceptorChain::new().with(a).with(b)` wraps an operation as
/// `a(b(operation))`. A chain is itself an [`Interceptor`], so chains nest.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    layers: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `interceptor` inside every layer added so far.
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.layers.push(Arc::new(interceptor));
        self
    }

    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.layers.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl FromIterator<Arc<dyn Interceptor>> for InterceptorChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Interceptor>>>(iter: I) -> Self {
        InterceptorChain {
            layers: iter.into_iter().collect(),
        }
    }
}

impl Interceptor for InterceptorChain {
    fn wrap(&self, operation: Operation) -> Operation {
        self.layers
            .iter()
            .rev()
            .fold(operation, |inner, layer| layer.wrap(inner))
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("layers", &self.layers.len())
            .finish()
    }
}
