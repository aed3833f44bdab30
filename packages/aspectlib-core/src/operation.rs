//! Operations: the real functions, async functions and sequence producers
//! that interceptors wrap.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;

use crate::error::AdviceError;
use crate::failure::Failure;
use crate::sequence::LazySequence;
use crate::value::{Args, Value};

/// A single-shot operation: one result or one failure.
pub trait PlainOperation: Send + Sync {
    fn call(&self, args: Args) -> Result<Value, Failure>;
}

impl<F> PlainOperation for F
where
    F: Fn(Args) -> Result<Value, Failure> + Send + Sync,
{
    fn call(&self, args: Args) -> Result<Value, Failure> {
        self(args)
    }
}

/// An operation whose result arrives through a future awaited on the
/// caller's task.
pub trait AsyncOperation: Send + Sync {
    fn call(&self, args: Args) -> LocalBoxFuture<'static, Result<Value, Failure>>;
}

/// An operation producing a lazy sequence of values.
pub trait SequenceOperation: Send + Sync {
    fn open(&self, args: Args) -> Result<Box<dyn LazySequence>, Failure>;
}

impl<F> SequenceOperation for F
where
    F: Fn(Args) -> Result<Box<dyn LazySequence>, Failure> + Send + Sync,
{
    fn open(&self, args: Args) -> Result<Box<dyn LazySequence>, Failure> {
        self(args)
    }
}

struct AsyncFn<F>(F);

impl<F, Fut> AsyncOperation for AsyncFn<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, Failure>> + 'static,
{
    fn call(&self, args: Args) -> LocalBoxFuture<'static, Result<Value, Failure>> {
        (self.0)(args).boxed_local()
    }
}

#[derive(Clone)]
pub enum OperationKind {
    Plain(Arc<dyn PlainOperation>),
    Async(Arc<dyn AsyncOperation>),
    Sequence(Arc<dyn SequenceOperation>),
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Plain(_) => "plain",
            OperationKind::Async(_) => "async",
            OperationKind::Sequence(_) => "sequence",
        }
    }
}

/// A named operation. Cloning is cheap and shares the implementation.
#[derive(Clone)]
pub struct Operation {
    name: Arc<str>,
    kind: OperationKind,
}

impl Operation {
    pub fn plain<F>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(Args) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        Operation::from_kind(name, OperationKind::Plain(Arc::new(body)))
    }

    pub fn asynchronous<F, Fut>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Failure>> + 'static,
    {
        Operation::from_kind(name, OperationKind::Async(Arc::new(AsyncFn(body))))
    }

    pub fn sequence<F>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(Args) -> Result<Box<dyn LazySequence>, Failure> + Send + Sync + 'static,
    {
        Operation::from_kind(name, OperationKind::Sequence(Arc::new(body)))
    }

    pub fn from_kind(name: impl Into<Arc<str>>, kind: OperationKind) -> Self {
        Operation {
            name: name.into(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, OperationKind::Sequence(_))
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, OperationKind::Async(_))
    }

    /// Invoke a plain operation.
    pub fn call(&self, args: Args) -> Result<Value, Failure> {
        match &self.kind {
            OperationKind::Plain(body) => body.call(args),
            other => Err(self.unsupported(other, "called synchronously")),
        }
    }

    /// Invoke an async operation, or a plain one as an immediately ready
    /// future.
    pub fn call_async(&self, args: Args) -> LocalBoxFuture<'static, Result<Value, Failure>> {
        match &self.kind {
            OperationKind::Async(body) => body.call(args),
            OperationKind::Plain(body) => {
                let result = body.call(args);
                async move { result }.boxed_local()
            }
            other => {
                let failure = self.unsupported(other, "awaited");
                async move { Err(failure) }.boxed_local()
            }
        }
    }

    /// Open a sequence operation.
    pub fn open(&self, args: Args) -> Result<Box<dyn LazySequence>, Failure> {
        match &self.kind {
            OperationKind::Sequence(body) => body.open(args),
            other => Err(self.unsupported(other, "opened as a sequence")),
        }
    }

    fn unsupported(&self, kind: &OperationKind, usage: &str) -> Failure {
        AdviceError::unsupported(
            self.name.to_string(),
            format!("is a {} operation and cannot be {usage}", kind.label()),
        )
        .into()
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("kind", &self.kind.label())
            .finish()
    }
}
