//! Test doubles: canned results and call recording.
//!
//! ```
//! use aspectlib::{mock, Args, Operation, Recorder, Target, Value};
//!
//! let target = Target::new(Operation::plain("method", |_args: Args| Ok(Value::from("stuff"))));
//! let recorder = Recorder::new().passing_through();
//! let mut patch = target.weave(mock(3));
//! patch.merge(target.weave(recorder.clone()));
//!
//! let args = Args::positional([3, 4, 5]).kwarg("key", "value");
//! assert_eq!(target.call(args.clone()).unwrap(), Value::from(3));
//! assert_eq!(recorder.calls()[0].args, args);
//!
//! patch.rollback();
//! assert_eq!(target.call(Args::new()).unwrap(), Value::from("stuff"));
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use aspectlib_core::{Advisor, Args, Aspect, Interceptor, Invocation, Operation, Value};
use serde::{Deserialize, Serialize};

use crate::weave::{Rollback, Target};

/// Makes every call return a fixed value.
#[derive(Debug, Clone)]
pub struct Mock {
    value: Value,
    call_original: bool,
}

pub fn mock(value: impl Into<Value>) -> Mock {
    Mock {
        value: value.into(),
        call_original: false,
    }
}

impl Mock {
    /// Still run the real operation (its failures propagate), then return
    /// the fixed value.
    pub fn calling_original(mut self) -> Self {
        self.call_original = true;
        self
    }

    pub fn aspect(&self) -> Aspect {
        let value = self.value.clone();
        let call_original = self.call_original;
        Aspect::routine("mock", move |_: Invocation, advisor: Advisor| {
            let value = value.clone();
            async move {
                if call_original {
                    advisor.proceed().await?;
                }
                Ok(Some(value))
            }
        })
    }
}

impl Interceptor for Mock {
    fn wrap(&self, operation: Operation) -> Operation {
        self.aspect().wrap(operation)
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub operation: String,
    pub args: Args,
}

pub type History = Arc<Mutex<Vec<Call>>>;

/// Records every call into a shared history.
///
/// By default the real operation is not run and calls return `None`.
#[derive(Clone, Default)]
pub struct Recorder {
    history: History,
    call_original: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record into an existing history, shared with other recorders.
    pub fn with_history(history: History) -> Self {
        Recorder {
            history,
            call_original: false,
        }
    }

    pub fn passing_through(mut self) -> Self {
        self.call_original = true;
        self
    }

    pub fn history(&self) -> History {
        Arc::clone(&self.history)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Weave this recorder onto `target` until the rollback runs.
    pub fn attach(&self, target: &Target) -> Rollback {
        target.weave(self.clone())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.calls())
    }

    pub fn aspect(&self) -> Aspect {
        let history = self.history();
        let call_original = self.call_original;
        Aspect::routine("record", move |invocation: Invocation, advisor: Advisor| {
            history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Call {
                    operation: invocation.operation().to_string(),
                    args: invocation.args().clone(),
                });
            async move {
                if call_original {
                    Ok(Some(advisor.proceed().await?))
                } else {
                    Ok(Some(Value::None))
                }
            }
        })
    }
}

impl Interceptor for Recorder {
    fn wrap(&self, operation: Operation) -> Operation {
        self.aspect().wrap(operation)
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("calls", &self.calls().len())
            .field("call_original", &self.call_original)
            .finish()
    }
}
