//! Named advice lookup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::chain::{Interceptor, InterceptorChain};
use crate::error::AdviceError;

/// Maps advice names to interceptors.
#[derive(Clone, Default)]
pub struct AdviceRegistry {
    entries: BTreeMap<String, Arc<dyn Interceptor>>,
}

impl AdviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `interceptor` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, interceptor: impl Interceptor + 'static) {
        let name = name.into();
        log::debug!("registering advice {name}");
        self.entries.insert(name, Arc::new(interceptor));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Interceptor>, AdviceError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| AdviceError::expected_generator_function(name))
    }

    /// Resolve every name, in order, into one chain.
    pub fn chain<'a, I>(&self, names: I) -> Result<InterceptorChain, AdviceError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().map(|name| self.resolve(name)).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for AdviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
