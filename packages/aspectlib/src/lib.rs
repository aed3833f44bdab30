//! aspectlib: weaving advice onto named operations.
//!
//! Built on [`aspectlib_core`], which defines the advice protocol. This
//! crate adds the parts applications use directly:
//!
//! - **weave**: [`Target`] slots and a [`Namespace`] of dotted names, with
//!   [`Rollback`] to undo every patch
//! - **contrib**: [`Retry`] with backoff policies
//! - **debug**: [`log_calls`] call logging
//! - **doubles**: [`mock`] and [`Recorder`] for tests
//! - **config**: weaving driven by `aspects.toml`

pub mod config;
pub mod contrib;
pub mod debug;
pub mod doubles;
pub mod error;
pub mod weave;

pub use aspectlib_core::{
    drain, Advice, AdviceError, AdviceProcess, AdviceRegistry, Advisor, Args, Aspect,
    ControlSignal, Failure, Generator, Interceptor, InterceptorChain, Invocation, LazySequence,
    Operation, OperationKind, Pause, Routine, SequenceStep, Sleeper, Step, Value,
};

pub use config::{builtin_registry, find_config_file, Config, WeaveEntry};
pub use contrib::{Backoff, Retry};
pub use debug::{log_calls, LogOptions, LogSink, SharedWriter};
pub use doubles::{mock, Call, History, Mock, Recorder};
pub use error::WeaveError;
pub use weave::{check_name, MethodFilter, Namespace, Rollback, RollbackGuard, Target};
