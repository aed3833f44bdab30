//! aspectlib-core: the advice interception protocol.
//!
//! An advice is a cooperative routine installed around an operation. It is
//! started when the operation is called and answers with control signals:
//! `Proceed` runs the real operation, `Return` ends the call, and natural
//! completion ends it with the last result. The operation's results and
//! failures are fed back into the advice, which may replace, translate,
//! repeat or skip them.
//!
//! # Architecture
//!
//! - **AdviceProcess**: lifecycle `NotStarted -> Suspended -> Finished`
//!   around one [`Advice`] routine
//! - **CallInterceptor**: signal loop around plain and async operations
//! - **SequenceBridge**: bidirectional proxy around lazy sequences, closing
//!   inner before outer on every exit path
//! - **InterceptorChain**: nested composition, outermost first
//! - **Pause**: a delay carried by `Proceed`, waited out by the driver
//!   (blocking for plain calls, awaited for async ones)
//! - **Coroutines**: `async` bodies polled with a no-op waker; no threads,
//!   no executor

mod logging;

pub mod advice;
pub mod aspect;
pub mod bridge;
pub mod call;
pub mod chain;
mod coroutine;
pub mod error;
pub mod failure;
pub mod ids;
pub mod operation;
pub mod pause;
pub mod registry;
pub mod sequence;
pub mod signal;
pub mod value;

// Re-exports for convenience
pub use advice::{Advice, AdviceProcess, Advisor, Invocation, ProcessState, Routine, Signal};
pub use aspect::Aspect;
pub use bridge::{BridgeState, SequenceBridge, SequenceInterceptor};
pub use call::{AdviceFactory, CallInterceptor};
pub use chain::{Interceptor, InterceptorChain};
pub use coroutine::{Co, Resumption, Suspend};
pub use error::AdviceError;
pub use failure::Failure;
pub use ids::CallId;
pub use operation::{AsyncOperation, Operation, OperationKind, PlainOperation, SequenceOperation};
pub use pause::{Pause, Sleeper};
pub use registry::AdviceRegistry;
pub use sequence::{drain, Generator, LazySequence, SequenceStep, Yielder};
pub use signal::{ControlSignal, Step};
pub use value::{Args, Value};
