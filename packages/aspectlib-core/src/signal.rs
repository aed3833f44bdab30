//! Signals an advice emits at each suspension point.

use std::fmt;

use crate::failure::Failure;
use crate::pause::Pause;
use crate::value::{Args, Value};

/// Instruction from an advice to the interceptor driving it.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlSignal {
    /// Invoke the underlying operation, after waiting out `pause` if one
    /// is given. `args: None` reuses the original call's arguments.
    Proceed {
        args: Option<Args>,
        pause: Option<Pause>,
    },
    /// End the call with `value` (`None` ends it with [`Value::None`]).
    Return { value: Option<Value> },
    /// Emit an item to the consumer of an intercepted sequence. Only
    /// acceptable while driving a lazy sequence.
    Yield { item: Value },
}

impl ControlSignal {
    pub fn proceed() -> Self {
        ControlSignal::Proceed {
            args: None,
            pause: None,
        }
    }

    pub fn proceed_with(args: Args) -> Self {
        ControlSignal::Proceed {
            args: Some(args),
            pause: None,
        }
    }

    pub fn proceed_after(pause: Pause) -> Self {
        ControlSignal::Proceed {
            args: None,
            pause: Some(pause),
        }
    }

    pub fn return_value(value: impl Into<Value>) -> Self {
        ControlSignal::Return {
            value: Some(value.into()),
        }
    }

    pub fn return_nothing() -> Self {
        ControlSignal::Return { value: None }
    }

    pub fn yield_item(item: impl Into<Value>) -> Self {
        ControlSignal::Yield { item: item.into() }
    }

    pub fn is_proceed(&self) -> bool {
        matches!(self, ControlSignal::Proceed { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self, ControlSignal::Return { .. })
    }

    pub fn is_yield(&self) -> bool {
        matches!(self, ControlSignal::Yield { .. })
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlSignal::Proceed { args, pause } => {
                write!(f, "Proceed")?;
                if let Some(args) = args {
                    write!(f, "({args})")?;
                }
                if let Some(pause) = pause {
                    write!(f, " after {pause}")?;
                }
                Ok(())
            }
            ControlSignal::Return { value: None } => write!(f, "Return"),
            ControlSignal::Return { value: Some(value) } => write!(f, "Return({value})"),
            ControlSignal::Yield { item } => write!(f, "Yield({item})"),
        }
    }
}

/// One step of an advice routine, as reported by [`crate::Advice`].
#[derive(Debug)]
pub enum Step {
    /// Suspended with a signal.
    Signal(ControlSignal),
    /// Ran to its end without a further signal.
    Complete,
    /// A failure escaped the routine.
    Raise(Failure),
}

impl Step {
    pub fn is_signal(&self) -> bool {
        matches!(self, Step::Signal(_))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Step::Complete)
    }

    pub fn is_raise(&self) -> bool {
        matches!(self, Step::Raise(_))
    }
}

impl From<ControlSignal> for Step {
    fn from(signal: ControlSignal) -> Self {
        Step::Signal(signal)
    }
}
