//! Driving an advice process around single-shot operations.

use std::fmt;
use std::sync::Arc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;

use crate::advice::{Advice, AdviceProcess, Invocation, Signal};
use crate::error::AdviceError;
use crate::failure::Failure;
use crate::operation::{AsyncOperation, Operation, PlainOperation};
use crate::pause::Pause;
use crate::signal::ControlSignal;
use crate::value::{Args, Value};

/// Creates one fresh advice per call.
pub type AdviceFactory = Arc<dyn Fn(Invocation) -> Box<dyn Advice> + Send + Sync>;

enum Next {
    Invoke(Args, Option<Pause>),
    Finish(Result<Value, Failure>),
}

/// Per-call state shared by the sync and async drivers.
struct CallState {
    process: AdviceProcess,
    original: Args,
    last: Value,
}

impl CallState {
    fn begin(factory: &AdviceFactory, operation: &Operation, args: Args) -> (Self, Next) {
        let invocation = Invocation::new(operation.shared_name(), args.clone());
        let mut state = CallState {
            process: AdviceProcess::new(factory(invocation)),
            original: args,
            last: Value::None,
        };
        let signal = state.process.start();
        let next = state.next(signal);
        (state, next)
    }

    fn deliver(&mut self, outcome: Result<Value, Failure>) -> Next {
        let signal = match outcome {
            Ok(result) => {
                self.last = result.clone();
                self.process.resume(result)
            }
            Err(failure) if failure.is_fatal() => return Next::Finish(Err(failure)),
            Err(failure) => {
                self.last = Value::None;
                self.process.resume_with_failure(failure)
            }
        };
        self.next(signal)
    }

    fn next(&mut self, signal: Signal) -> Next {
        match signal {
            Ok(Some(ControlSignal::Proceed { args, pause })) => {
                Next::Invoke(args.unwrap_or_else(|| self.original.clone()), pause)
            }
            Ok(Some(ControlSignal::Return { value })) => Next::Finish(Ok(value.unwrap_or_default())),
            Ok(Some(signal @ ControlSignal::Yield { .. })) => {
                log::warn!(
                    "advice {} issued {} around a single-shot call",
                    self.process.name(),
                    signal
                );
                Next::Finish(Err(AdviceError::unacceptable(
                    self.process.name(),
                    signal.to_string(),
                )
                .into()))
            }
            Ok(None) => Next::Finish(Ok(std::mem::take(&mut self.last))),
            Err(failure) => Next::Finish(Err(failure)),
        }
    }

    fn finish(mut self, outcome: Result<Value, Failure>) -> Result<Value, Failure> {
        self.process.close();
        outcome
    }
}

/// Runs one advice around every call of a plain or async operation.
#[derive(Clone)]
pub struct CallInterceptor {
    factory: AdviceFactory,
    operation: Operation,
}

impl CallInterceptor {
    pub fn new(factory: AdviceFactory, operation: Operation) -> Self {
        CallInterceptor { factory, operation }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn call(&self, args: Args) -> Result<Value, Failure> {
        let (mut state, mut next) = CallState::begin(&self.factory, &self.operation, args);
        loop {
            match next {
                Next::Invoke(args, pause) => {
                    if let Some(pause) = pause {
                        pause.block();
                    }
                    next = state.deliver(self.operation.call(args));
                }
                Next::Finish(outcome) => return state.finish(outcome),
            }
        }
    }

    /// The same loop, awaiting the operation and any pause at every
    /// `Proceed`.
    pub fn call_async(&self, args: Args) -> LocalBoxFuture<'static, Result<Value, Failure>> {
        let factory = Arc::clone(&self.factory);
        let operation = self.operation.clone();
        async move {
            let (mut state, mut next) = CallState::begin(&factory, &operation, args);
            loop {
                match next {
                    Next::Invoke(args, pause) => {
                        if let Some(pause) = pause {
                            pause.wait().await;
                        }
                        let outcome = operation.call_async(args).await;
                        next = state.deliver(outcome);
                    }
                    Next::Finish(outcome) => return state.finish(outcome),
                }
            }
        }
        .boxed_local()
    }
}

impl PlainOperation for CallInterceptor {
    fn call(&self, args: Args) -> Result<Value, Failure> {
        CallInterceptor::call(self, args)
    }
}

impl AsyncOperation for CallInterceptor {
    fn call(&self, args: Args) -> LocalBoxFuture<'static, Result<Value, Failure>> {
        self.call_async(args)
    }
}

impl fmt::Debug for CallInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallInterceptor")
            .field("operation", &self.operation)
            .finish()
    }
}
