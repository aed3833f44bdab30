//! Lazy, resumable sequences.
//!
//! A [`LazySequence`] is pulled one step at a time. Each step either yields
//! an item, returns a final value, or fails. The consumer may send a value
//! back in with every pull, inject a failure at the point the sequence is
//! suspended, or close it early.

use std::fmt;
use std::future::Future;

use crate::coroutine::{Co, Coroutine, Resumed};
use crate::error::AdviceError;
use crate::failure::Failure;
use crate::value::Value;

#[derive(Debug)]
pub enum SequenceStep {
    Yield(Value),
    Return(Value),
    Throw(Failure),
}

impl SequenceStep {
    pub fn is_yield(&self) -> bool {
        matches!(self, SequenceStep::Yield(_))
    }

    pub fn is_return(&self) -> bool {
        matches!(self, SequenceStep::Return(_))
    }

    pub fn is_throw(&self) -> bool {
        matches!(self, SequenceStep::Throw(_))
    }

    pub fn into_item(self) -> Option<Value> {
        match self {
            SequenceStep::Yield(item) => Some(item),
            _ => None,
        }
    }
}

pub trait LazySequence {
    /// Resume with `value`; the first resume of a sequence ignores it.
    fn resume(&mut self, value: Value) -> SequenceStep;

    /// Raise `failure` at the point the sequence is suspended.
    fn throw(&mut self, failure: Failure) -> SequenceStep;

    /// Release the sequence. Safe from any state and idempotent.
    fn close(&mut self);

    fn next_step(&mut self) -> SequenceStep {
        self.resume(Value::None)
    }
}

impl<S: LazySequence + ?Sized> LazySequence for Box<S> {
    fn resume(&mut self, value: Value) -> SequenceStep {
        (**self).resume(value)
    }

    fn throw(&mut self, failure: Failure) -> SequenceStep {
        (**self).throw(failure)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Handle a [`Generator`] body yields through.
pub type Yielder = Co<Value>;

impl Co<Value> {
    /// Yield `item`; completes with the value the consumer sends back, or
    /// with the failure it injects.
    pub async fn yield_item(&self, item: impl Into<Value>) -> Result<Value, Failure> {
        self.suspend(item.into()).await
    }
}

/// A [`LazySequence`] written as an `async` body.
///
/// ```
/// use aspectlib_core::{drain, Generator, Value};
///
/// let mut numbers = Generator::new(|co| async move {
///     for i in 0..3 {
///         co.yield_item(i).await?;
///     }
///     Ok(Value::from("done"))
/// });
/// let (items, last) = drain(&mut numbers).unwrap();
/// assert_eq!(items, vec![Value::from(0), Value::from(1), Value::from(2)]);
/// assert_eq!(last, Value::from("done"));
/// ```
pub struct Generator {
    co: Coroutine<Value, Result<Value, Failure>>,
}

impl Generator {
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Yielder) -> Fut,
        Fut: Future<Output = Result<Value, Failure>> + 'static,
    {
        Generator {
            co: Coroutine::new(body),
        }
    }

    pub fn boxed<F, Fut>(body: F) -> Box<dyn LazySequence>
    where
        F: FnOnce(Yielder) -> Fut,
        Fut: Future<Output = Result<Value, Failure>> + 'static,
    {
        Box::new(Generator::new(body))
    }

    fn step(&mut self, resumed: Resumed<Value, Result<Value, Failure>>) -> SequenceStep {
        match resumed {
            Resumed::Suspended(item) => SequenceStep::Yield(item),
            Resumed::Completed(Ok(value)) => SequenceStep::Return(value),
            Resumed::Completed(Err(failure)) => SequenceStep::Throw(failure),
            Resumed::Stalled => SequenceStep::Throw(
                AdviceError::expected_generator(
                    "generator",
                    "awaited a future other than its yielder",
                )
                .into(),
            ),
            Resumed::Finished => SequenceStep::Return(Value::None),
        }
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("started", &self.co.is_started())
            .field("finished", &self.co.is_finished())
            .finish()
    }
}

impl LazySequence for Generator {
    fn resume(&mut self, value: Value) -> SequenceStep {
        let resumed = self.co.resume(Some(Ok(value)));
        self.step(resumed)
    }

    fn throw(&mut self, failure: Failure) -> SequenceStep {
        if !self.co.is_started() || self.co.is_finished() {
            self.co.close();
            return SequenceStep::Throw(failure);
        }
        let resumed = self.co.resume(Some(Err(failure)));
        self.step(resumed)
    }

    fn close(&mut self) {
        self.co.close();
    }
}

/// Pull `sequence` to its end, collecting every item and the final value.
pub fn drain(sequence: &mut dyn LazySequence) -> Result<(Vec<Value>, Value), Failure> {
    let mut items = Vec::new();
    loop {
        match sequence.next_step() {
            SequenceStep::Yield(item) => items.push(item),
            SequenceStep::Return(value) => return Ok((items, value)),
            SequenceStep::Throw(failure) => return Err(failure),
        }
    }
}
