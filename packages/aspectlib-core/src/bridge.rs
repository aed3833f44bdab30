//! Driving an advice process around lazy-sequence operations.
//!
//! A [`SequenceBridge`] sits between the outer consumer and the inner
//! sequence the operation produces. Items flow outward through the advice's
//! observation hook, resumption values and injected failures flow inward
//! unchanged, and the terminal outcome of every inner sequence is handed to
//! the advice, which may post-process it, open another inner sequence, emit
//! items of its own, or end the call.
//!
//! The inner sequence and the advice process are each closed exactly once,
//! inner first, whichever way the call ends.

use std::fmt;
use std::mem;

use crate::advice::{AdviceProcess, Invocation, Signal};
use crate::call::AdviceFactory;
use crate::error::AdviceError;
use crate::failure::Failure;
use crate::logging::signal_log;
use crate::operation::{Operation, SequenceOperation};
use crate::sequence::{LazySequence, SequenceStep};
use crate::signal::ControlSignal;
use crate::value::{Args, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    /// Opened but never pulled; the advice has not started.
    Idle,
    /// An inner sequence is live and its items flow outward.
    Bridging,
    /// No inner sequence is live; the advice drives the call.
    Draining,
    Done,
}

enum Event {
    Advice(Signal),
    Inner(SequenceStep),
}

/// The outer proxy of one intercepted sequence call.
pub struct SequenceBridge {
    operation: Operation,
    original: Args,
    process: AdviceProcess,
    inner: Option<Box<dyn LazySequence>>,
    state: BridgeState,
    last: Value,
}

impl SequenceBridge {
    pub fn new(factory: &AdviceFactory, operation: Operation, args: Args) -> Self {
        let invocation = Invocation::new(operation.shared_name(), args.clone());
        SequenceBridge {
            process: AdviceProcess::new(factory(invocation)),
            operation,
            original: args,
            inner: None,
            state: BridgeState::Idle,
            last: Value::None,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    fn run(&mut self, mut event: Event) -> SequenceStep {
        loop {
            event = match event {
                Event::Inner(SequenceStep::Yield(item)) => return self.forward(item),
                Event::Inner(SequenceStep::Return(value)) => {
                    self.close_inner();
                    self.state = BridgeState::Draining;
                    self.last = value.clone();
                    Event::Advice(self.process.resume(value))
                }
                Event::Inner(SequenceStep::Throw(failure)) => {
                    self.close_inner();
                    if failure.is_fatal() {
                        return self.fail(failure);
                    }
                    self.state = BridgeState::Draining;
                    self.last = Value::None;
                    Event::Advice(self.process.resume_with_failure(failure))
                }
                Event::Advice(Err(failure)) => return self.fail(failure),
                Event::Advice(Ok(None)) => {
                    let last = mem::take(&mut self.last);
                    return self.finish(last);
                }
                Event::Advice(Ok(Some(ControlSignal::Return { value }))) => {
                    return self.finish(value.unwrap_or_default())
                }
                Event::Advice(Ok(Some(ControlSignal::Yield { item }))) => {
                    self.state = BridgeState::Draining;
                    return SequenceStep::Yield(item);
                }
                Event::Advice(Ok(Some(ControlSignal::Proceed { args, pause }))) => {
                    if let Some(pause) = pause {
                        pause.block();
                    }
                    let args = args.unwrap_or_else(|| self.original.clone());
                    match self.operation.open(args) {
                        Ok(inner) => {
                            signal_log!("{}: opened inner sequence", self.operation.name());
                            self.state = BridgeState::Bridging;
                            let inner = self.inner.insert(inner);
                            Event::Inner(inner.next_step())
                        }
                        Err(failure) if failure.is_fatal() => return self.fail(failure),
                        Err(failure) => {
                            self.state = BridgeState::Draining;
                            self.last = Value::None;
                            Event::Advice(self.process.resume_with_failure(failure))
                        }
                    }
                }
            };
        }
    }

    /// Offer an inner item to the advice, then pass it on.
    fn forward(&mut self, item: Value) -> SequenceStep {
        match self.process.observe(&item) {
            Ok(None) => SequenceStep::Yield(item),
            Ok(Some(ControlSignal::Return { value })) => {
                signal_log!("{}: advice cut the sequence short", self.operation.name());
                self.finish(value.unwrap_or_default())
            }
            Ok(Some(other)) => {
                let failure =
                    AdviceError::unacceptable(self.process.name(), other.to_string()).into();
                self.fail(failure)
            }
            Err(failure) => self.fail(failure),
        }
    }

    fn finish(&mut self, value: Value) -> SequenceStep {
        self.shutdown();
        SequenceStep::Return(value)
    }

    fn fail(&mut self, failure: Failure) -> SequenceStep {
        log::debug!(
            "{}: sequence call failed with {}",
            self.operation.name(),
            failure
        );
        self.shutdown();
        SequenceStep::Throw(failure)
    }

    fn close_inner(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.close();
        }
    }

    fn shutdown(&mut self) {
        self.close_inner();
        self.process.close();
        self.state = BridgeState::Done;
    }
}

impl LazySequence for SequenceBridge {
    fn resume(&mut self, value: Value) -> SequenceStep {
        match self.state {
            BridgeState::Idle => {
                let signal = self.process.start();
                self.run(Event::Advice(signal))
            }
            BridgeState::Bridging => match self.inner.as_mut() {
                Some(inner) => {
                    let step = inner.resume(value);
                    self.run(Event::Inner(step))
                }
                None => SequenceStep::Return(Value::None),
            },
            BridgeState::Draining => {
                let signal = self.process.resume(value);
                self.run(Event::Advice(signal))
            }
            BridgeState::Done => SequenceStep::Return(Value::None),
        }
    }

    fn throw(&mut self, failure: Failure) -> SequenceStep {
        match self.state {
            BridgeState::Idle | BridgeState::Done => {
                self.shutdown();
                SequenceStep::Throw(failure)
            }
            BridgeState::Bridging => match self.inner.as_mut() {
                Some(inner) => {
                    let step = inner.throw(failure);
                    self.run(Event::Inner(step))
                }
                None => self.fail(failure),
            },
            BridgeState::Draining => {
                let signal = self.process.resume_with_failure(failure);
                self.run(Event::Advice(signal))
            }
        }
    }

    fn close(&mut self) {
        if self.state == BridgeState::Done {
            return;
        }
        signal_log!("{}: consumer closed the sequence", self.operation.name());
        self.shutdown();
    }
}

impl Drop for SequenceBridge {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for SequenceBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceBridge")
            .field("operation", &self.operation)
            .field("state", &self.state)
            .field("process", &self.process)
            .finish()
    }
}

/// Runs one advice around every call of a sequence operation.
#[derive(Clone)]
pub struct SequenceInterceptor {
    factory: AdviceFactory,
    operation: Operation,
}

impl SequenceInterceptor {
    pub fn new(factory: AdviceFactory, operation: Operation) -> Self {
        SequenceInterceptor { factory, operation }
    }

    /// Open the outer proxy. Nothing runs until the first pull.
    pub fn bridge(&self, args: Args) -> SequenceBridge {
        SequenceBridge::new(&self.factory, self.operation.clone(), args)
    }
}

impl SequenceOperation for SequenceInterceptor {
    fn open(&self, args: Args) -> Result<Box<dyn LazySequence>, Failure> {
        Ok(Box::new(self.bridge(args)))
    }
}

impl fmt::Debug for SequenceInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceInterceptor")
            .field("operation", &self.operation)
            .finish()
    }
}
