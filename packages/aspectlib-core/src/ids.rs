//! Call identifiers used to correlate log lines of one intercepted call.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for one intercepted call.
///
/// Every invocation of an intercepted operation (and every opened
/// intercepted sequence) gets a fresh CallId.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CallId(u64);

static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl CallId {
    pub fn fresh() -> Self {
        CallId(CALL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
