//! Delays an advice asks its driver to wait out before the next invocation.
//!
//! The advice itself never sleeps: it is polled without an executor, so a
//! wait inside it would block whatever thread drives the call. Instead a
//! [`Pause`] travels with `Proceed`, and the driver waits in the way that
//! fits the call: blocking for plain calls and lazy sequences, awaiting for
//! async operations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;

/// How a [`Pause`] is waited out.
pub trait Sleeper: Send + Sync {
    /// Block the calling thread for `delay`.
    fn sleep(&self, delay: Duration);

    /// Wait for `delay` without blocking the thread.
    fn sleep_async(&self, delay: Duration) -> LocalBoxFuture<'static, ()>;
}

#[derive(Clone)]
pub struct Pause {
    delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl Pause {
    pub fn new(delay: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Pause { delay, sleeper }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn block(&self) {
        self.sleeper.sleep(self.delay);
    }

    pub fn wait(&self) -> LocalBoxFuture<'static, ()> {
        self.sleeper.sleep_async(self.delay)
    }
}

impl PartialEq for Pause {
    fn eq(&self, other: &Self) -> bool {
        self.delay == other.delay && Arc::ptr_eq(&self.sleeper, &other.sleeper)
    }
}

impl fmt::Debug for Pause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pause").field("delay", &self.delay).finish()
    }
}

impl fmt::Display for Pause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.delay.as_secs_f64())
    }
}
