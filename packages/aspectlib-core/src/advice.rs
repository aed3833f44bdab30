//! Advice routines and the process that drives one of them.
//!
//! An [`Advice`] is a cooperative routine: it is started, then resumed with
//! the outcome of every operation invocation it asked for, and it answers
//! each time with a [`Step`]. [`AdviceProcess`] wraps one routine for one
//! call and enforces the lifecycle `NotStarted -> Suspended -> Finished`.
//!
//! Routines are written either as explicit state machines implementing
//! [`Advice`], or as `async` bodies through [`Routine`]:
//!
//! ```
//! use aspectlib_core::{Advisor, Routine, Value};
//!
//! let routine = Routine::new("double-result", |advisor: Advisor| async move {
//!     let result = advisor.proceed().await?;
//!     Ok(Some(Value::from(result.as_int().unwrap_or(0) * 2)))
//! });
//! # let _ = routine;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::coroutine::{Co, Coroutine, Resumed};
use crate::error::AdviceError;
use crate::failure::Failure;
use crate::ids::CallId;
use crate::logging::signal_log;
use crate::pause::Pause;
use crate::signal::{ControlSignal, Step};
use crate::value::{Args, Value};

/// What an advice answered: a signal, the natural-completion sentinel
/// (`Ok(None)`), or a failure escaping it.
pub type Signal = Result<Option<ControlSignal>, Failure>;

/// A cooperative routine governing one intercepted call.
pub trait Advice {
    fn name(&self) -> &str;

    /// Run up to the first signal.
    fn start(&mut self) -> Step;

    /// Resume with the result of the last invocation.
    fn send(&mut self, value: Value) -> Step;

    /// Resume with the failure of the last invocation.
    fn throw(&mut self, failure: Failure) -> Step;

    /// Offered every item an intercepted sequence produces, in order.
    ///
    /// `Ok(None)` lets the item through; `Return` ends the sequence in its
    /// place.
    fn observe(&mut self, _item: &Value) -> Signal {
        Ok(None)
    }

    /// Release the routine. Called at most once by [`AdviceProcess`].
    fn close(&mut self) {}
}

/// The call an advice is created for.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    operation: Arc<str>,
    args: Args,
}

impl Invocation {
    pub fn new(operation: impl Into<Arc<str>>, args: Args) -> Self {
        Invocation {
            operation: operation.into(),
            args,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    pub fn into_args(self) -> Args {
        self.args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.operation, self.args)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Suspended,
    Finished,
}

/// One advice routine driven through one call.
pub struct AdviceProcess {
    advice: Box<dyn Advice>,
    state: ProcessState,
    closed: bool,
    call_id: CallId,
}

impl AdviceProcess {
    pub fn new(advice: Box<dyn Advice>) -> Self {
        AdviceProcess {
            advice,
            state: ProcessState::NotStarted,
            closed: false,
            call_id: CallId::fresh(),
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    pub fn name(&self) -> &str {
        self.advice.name()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn start(&mut self) -> Signal {
        if self.state != ProcessState::NotStarted {
            return Err(self.misuse("was started twice"));
        }
        let step = self.advice.start();
        self.accept(step, true)
    }

    pub fn resume(&mut self, value: Value) -> Signal {
        self.check_suspended("resumed")?;
        signal_log!("call {}: {} <- {}", self.call_id, self.advice.name(), value);
        let step = self.advice.send(value);
        self.accept(step, false)
    }

    pub fn resume_with_failure(&mut self, failure: Failure) -> Signal {
        self.check_suspended("resumed with a failure")?;
        signal_log!("call {}: {} <- raised {}", self.call_id, self.advice.name(), failure);
        let step = self.advice.throw(failure);
        self.accept(step, false)
    }

    /// Offer a sequence item to the advice. Items arriving after the
    /// process finished are let through unobserved.
    pub fn observe(&mut self, item: &Value) -> Signal {
        if self.state != ProcessState::Suspended {
            return Ok(None);
        }
        match self.advice.observe(item) {
            Ok(Some(signal)) => {
                if signal.is_return() {
                    self.state = ProcessState::Finished;
                }
                Ok(Some(signal))
            }
            Ok(None) => Ok(None),
            Err(failure) => {
                self.state = ProcessState::Finished;
                Err(failure)
            }
        }
    }

    /// Release the routine. Idempotent; safe from any state.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state = ProcessState::Finished;
        signal_log!("call {}: closing {}", self.call_id, self.advice.name());
        self.advice.close();
    }

    fn check_suspended(&self, action: &str) -> Result<(), Failure> {
        match self.state {
            ProcessState::Suspended => Ok(()),
            ProcessState::NotStarted => Err(self.misuse(&format!("was {action} before start"))),
            ProcessState::Finished => Err(self.misuse(&format!("was {action} after finishing"))),
        }
    }

    fn misuse(&self, reason: &str) -> Failure {
        log::debug!("call {}: advice {} {}", self.call_id, self.advice.name(), reason);
        AdviceError::expected_generator(self.advice.name(), reason).into()
    }

    fn accept(&mut self, step: Step, first: bool) -> Signal {
        match step {
            Step::Signal(signal) => {
                signal_log!("call {}: {} -> {}", self.call_id, self.advice.name(), signal);
                self.state = if signal.is_return() {
                    ProcessState::Finished
                } else {
                    ProcessState::Suspended
                };
                Ok(Some(signal))
            }
            Step::Complete if first => {
                self.state = ProcessState::Finished;
                Err(self.misuse("completed without issuing a signal"))
            }
            Step::Complete => {
                self.state = ProcessState::Finished;
                Ok(None)
            }
            Step::Raise(failure) => {
                self.state = ProcessState::Finished;
                Err(failure)
            }
        }
    }
}

impl Drop for AdviceProcess {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for AdviceProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceProcess")
            .field("advice", &self.advice.name())
            .field("state", &self.state)
            .field("closed", &self.closed)
            .field("call_id", &self.call_id)
            .finish()
    }
}

/// Handle an async advice body signals through.
pub type Advisor = Co<ControlSignal>;

impl Co<ControlSignal> {
    /// Invoke the operation with the original arguments.
    pub async fn proceed(&self) -> Result<Value, Failure> {
        self.suspend(ControlSignal::proceed()).await
    }

    /// Invoke the operation with `args` instead of the original arguments.
    pub async fn proceed_with(&self, args: Args) -> Result<Value, Failure> {
        self.suspend(ControlSignal::proceed_with(args)).await
    }

    /// Invoke the operation with the original arguments once the driver
    /// has waited out `pause`.
    pub async fn proceed_after(&self, pause: Pause) -> Result<Value, Failure> {
        self.suspend(ControlSignal::proceed_after(pause)).await
    }

    /// Emit an item to the consumer of an intercepted sequence and receive
    /// the value it sends back.
    pub async fn yield_item(&self, item: impl Into<Value>) -> Result<Value, Failure> {
        self.suspend(ControlSignal::yield_item(item)).await
    }
}

type Observer = Box<dyn FnMut(&Value) -> Signal>;

/// An [`Advice`] written as an `async` body.
///
/// The body's output decides how the call ends: `Ok(Some(value))` returns
/// `value`, `Ok(None)` completes naturally with the last result, `Err`
/// lets the failure escape.
pub struct Routine {
    name: String,
    co: Coroutine<ControlSignal, Result<Option<Value>, Failure>>,
    observer: Option<Observer>,
}

impl Routine {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Advisor) -> Fut,
        Fut: Future<Output = Result<Option<Value>, Failure>> + 'static,
    {
        Routine {
            name: name.into(),
            co: Coroutine::new(body),
            observer: None,
        }
    }

    /// Attach a hook that sees every item of an intercepted sequence.
    pub fn observing<O>(mut self, observer: O) -> Self
    where
        O: FnMut(&Value) -> Signal + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    fn step(&mut self, resumed: Resumed<ControlSignal, Result<Option<Value>, Failure>>) -> Step {
        match resumed {
            Resumed::Suspended(signal) => Step::Signal(signal),
            Resumed::Completed(Ok(Some(value))) => Step::Signal(ControlSignal::Return {
                value: Some(value),
            }),
            Resumed::Completed(Ok(None)) => Step::Complete,
            Resumed::Completed(Err(failure)) => Step::Raise(failure),
            Resumed::Stalled => Step::Raise(
                AdviceError::expected_generator(
                    self.name.clone(),
                    "awaited a future other than its advisor",
                )
                .into(),
            ),
            Resumed::Finished => Step::Raise(
                AdviceError::expected_generator(self.name.clone(), "was resumed after finishing")
                    .into(),
            ),
        }
    }
}

impl Advice for Routine {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Step {
        let resumed = self.co.resume(None);
        self.step(resumed)
    }

    fn send(&mut self, value: Value) -> Step {
        let resumed = self.co.resume(Some(Ok(value)));
        self.step(resumed)
    }

    fn throw(&mut self, failure: Failure) -> Step {
        let resumed = self.co.resume(Some(Err(failure)));
        self.step(resumed)
    }

    fn observe(&mut self, item: &Value) -> Signal {
        match self.observer.as_mut() {
            Some(observer) => observer(item),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.co.close();
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routine")
            .field("name", &self.name)
            .field("finished", &self.co.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    struct Scripted {
        steps: Vec<Step>,
        closes: Rc<RefCell<u32>>,
    }

    impl Advice for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn start(&mut self) -> Step {
            self.steps.remove(0)
        }

        fn send(&mut self, _value: Value) -> Step {
            self.steps.remove(0)
        }

        fn throw(&mut self, failure: Failure) -> Step {
            Step::Raise(failure)
        }

        fn close(&mut self) {
            *self.closes.borrow_mut() += 1;
        }
    }

    fn scripted(steps: Vec<Step>) -> (AdviceProcess, Rc<RefCell<u32>>) {
        let closes = Rc::new(RefCell::new(0));
        let advice = Scripted {
            steps,
            closes: Rc::clone(&closes),
        };
        (AdviceProcess::new(Box::new(advice)), closes)
    }

    fn expect_expected_generator(signal: Signal) {
        let failure = signal.unwrap_err();
        assert!(matches!(
            failure.advice_error(),
            Some(AdviceError::ExpectedGenerator { .. })
        ));
    }

    #[test]
    fn test_lifecycle_states() {
        let (mut process, closes) = scripted(vec![
            ControlSignal::proceed().into(),
            ControlSignal::return_value(1).into(),
        ]);
        assert_eq!(process.state(), ProcessState::NotStarted);
        assert_eq!(process.start().unwrap(), Some(ControlSignal::proceed()));
        assert_eq!(process.state(), ProcessState::Suspended);
        assert_eq!(
            process.resume(Value::None).unwrap(),
            Some(ControlSignal::return_value(1))
        );
        assert_eq!(process.state(), ProcessState::Finished);
        expect_expected_generator(process.resume(Value::None));
        process.close();
        process.close();
        assert_eq!(*closes.borrow(), 1);
    }

    #[test]
    fn test_resume_before_start_is_fatal() {
        let (mut process, _) = scripted(vec![ControlSignal::proceed().into()]);
        expect_expected_generator(process.resume(Value::None));
        expect_expected_generator(process.resume_with_failure(Failure::new("io", "x")));
    }

    #[test]
    fn test_start_twice_is_fatal() {
        let (mut process, _) = scripted(vec![
            ControlSignal::proceed().into(),
            ControlSignal::proceed().into(),
        ]);
        assert!(process.start().is_ok());
        expect_expected_generator(process.start());
    }

    #[test]
    fn test_completion_without_first_signal_is_fatal() {
        let (mut process, _) = scripted(vec![Step::Complete]);
        expect_expected_generator(process.start());
        assert_eq!(process.state(), ProcessState::Finished);
    }

    #[test]
    fn test_drop_closes_exactly_once() {
        let (process, closes) = scripted(vec![ControlSignal::proceed().into()]);
        drop(process);
        assert_eq!(*closes.borrow(), 1);
    }

    #[test]
    fn test_routine_natural_completion_is_sentinel() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let routine = Routine::new("observe", move |advisor: Advisor| async move {
            let result = advisor.proceed().await?;
            log.borrow_mut().push(result);
            Ok(None)
        });
        let mut process = AdviceProcess::new(Box::new(routine));
        assert_eq!(process.start().unwrap(), Some(ControlSignal::proceed()));
        assert_eq!(process.resume(Value::from(5)).unwrap(), None);
        assert_eq!(process.state(), ProcessState::Finished);
        assert_eq!(*seen.borrow(), vec![Value::from(5)]);
    }

    #[test]
    fn test_routine_failure_propagates_with_identity() {
        let routine = Routine::new("pass", |advisor: Advisor| async move {
            advisor.proceed().await?;
            Ok(None)
        });
        let mut process = AdviceProcess::new(Box::new(routine));
        process.start().unwrap();
        let failure = Failure::new("io", "gone");
        let raised = process.resume_with_failure(failure.clone()).unwrap_err();
        assert!(raised.same(&failure));
    }

    #[test]
    fn test_routine_observer() {
        let routine = Routine::new("cut", |advisor: Advisor| async move {
            advisor.proceed().await?;
            Ok(None)
        })
        .observing(|item| {
            if item.as_int() == Some(3) {
                Ok(Some(ControlSignal::return_value("cut")))
            } else {
                Ok(None)
            }
        });
        let mut process = AdviceProcess::new(Box::new(routine));
        process.start().unwrap();
        assert_eq!(process.observe(&Value::from(1)).unwrap(), None);
        assert_eq!(
            process.observe(&Value::from(3)).unwrap(),
            Some(ControlSignal::return_value("cut"))
        );
        assert_eq!(process.state(), ProcessState::Finished);
        assert_eq!(process.observe(&Value::from(4)).unwrap(), None);
    }

    #[test]
    fn test_invocation_display() {
        let invocation = Invocation::new("charge", Args::positional([10]).kwarg("currency", "EUR"));
        assert_eq!(invocation.to_string(), r#"charge(10, currency="EUR")"#);
        assert_eq!(invocation.operation(), "charge");
    }
}
