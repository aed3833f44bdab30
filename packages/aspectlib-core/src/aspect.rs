//! Aspects: interceptors that bind one advice factory.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::advice::{Advice, AdviceProcess, Advisor, Invocation, Routine};
use crate::bridge::SequenceInterceptor;
use crate::call::{AdviceFactory, CallInterceptor};
use crate::chain::Interceptor;
use crate::failure::Failure;
use crate::operation::{Operation, OperationKind};
use crate::value::Value;

/// Binds an advice factory to whatever operation it wraps.
///
/// Every call of a wrapped operation creates a fresh advice, so an aspect
/// holds no per-call state and can wrap any number of operations.
///
/// ```
/// use aspectlib_core::{Advisor, Args, Aspect, Interceptor, Operation, Value};
///
/// let logged = Aspect::routine("add-one", |_invocation, advisor: Advisor| async move {
///     let result = advisor.proceed().await?;
///     Ok(Some(Value::from(result.as_int().unwrap_or(0) + 1)))
/// });
/// let answer = Operation::plain("answer", |_args: Args| Ok(Value::from(41)));
/// let wrapped = logged.wrap(answer);
/// assert_eq!(wrapped.call(Args::new()).unwrap(), Value::from(42));
/// ```
#[derive(Clone)]
pub struct Aspect {
    name: Arc<str>,
    factory: AdviceFactory,
}

impl Aspect {
    pub fn new<F, A>(name: impl Into<Arc<str>>, factory: F) -> Self
    where
        F: Fn(Invocation) -> A + Send + Sync + 'static,
        A: Advice + 'static,
    {
        Aspect {
            name: name.into(),
            factory: Arc::new(move |invocation: Invocation| {
                Box::new(factory(invocation)) as Box<dyn Advice>
            }),
        }
    }

    /// An aspect whose advice is an `async` body.
    pub fn routine<F, Fut>(name: impl Into<Arc<str>>, body: F) -> Self
    where
        F: Fn(Invocation, Advisor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, Failure>> + 'static,
    {
        let name: Arc<str> = name.into();
        let label = Arc::clone(&name);
        Aspect {
            name,
            factory: Arc::new(move |invocation: Invocation| {
                Box::new(Routine::new(label.to_string(), |advisor| body(invocation, advisor)))
                    as Box<dyn Advice>
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A fresh advice process for one call.
    pub fn spawn(&self, invocation: Invocation) -> AdviceProcess {
        AdviceProcess::new((self.factory)(invocation))
    }

    pub fn factory(&self) -> AdviceFactory {
        Arc::clone(&self.factory)
    }
}

impl Interceptor for Aspect {
    fn wrap(&self, operation: Operation) -> Operation {
        log::debug!("aspect {} wraps {:?}", self.name, operation);
        let kind = match operation.kind() {
            OperationKind::Plain(_) => OperationKind::Plain(Arc::new(CallInterceptor::new(
                self.factory(),
                operation.clone(),
            ))),
            OperationKind::Async(_) => OperationKind::Async(Arc::new(CallInterceptor::new(
                self.factory(),
                operation.clone(),
            ))),
            OperationKind::Sequence(_) => OperationKind::Sequence(Arc::new(
                SequenceInterceptor::new(self.factory(), operation.clone()),
            )),
        };
        Operation::from_kind(operation.shared_name(), kind)
    }
}

impl fmt::Debug for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aspect").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::ProcessState;
    use crate::sequence::{drain, Generator};
    use crate::signal::{ControlSignal, Step};
    use crate::value::Args;

    /// Returns a fixed value without proceeding.
    struct Constant(Value);

    impl Advice for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn start(&mut self) -> Step {
            ControlSignal::return_value(self.0.clone()).into()
        }

        fn send(&mut self, _value: Value) -> Step {
            Step::Complete
        }

        fn throw(&mut self, failure: Failure) -> Step {
            Step::Raise(failure)
        }
    }

    #[test]
    fn test_state_machine_advice() {
        let aspect = Aspect::new("constant", |_| Constant(Value::from("fixed")));
        let op = aspect.wrap(Operation::plain("real", |_args: Args| {
            Err(Failure::new("io", "must not run"))
        }));
        assert_eq!(op.name(), "real");
        assert_eq!(op.call(Args::new()).unwrap(), Value::from("fixed"));
    }

    #[test]
    fn test_routine_sees_invocation() {
        let aspect = Aspect::routine("args", |invocation: Invocation, _advisor: Advisor| async move {
            Ok(Some(Value::from(invocation.to_string())))
        });
        let op = aspect.wrap(Operation::plain("greet", |_args: Args| Ok(Value::None)));
        assert_eq!(
            op.call(Args::positional(["bob"])).unwrap(),
            Value::from(r#"greet("bob")"#)
        );
    }

    #[test]
    fn test_wrap_keeps_call_shape() {
        let aspect = Aspect::routine("pass", |_, advisor: Advisor| async move {
            Ok(Some(advisor.proceed().await?))
        });
        let seq = aspect.wrap(Operation::sequence("two", |_args: Args| {
            Ok(Generator::boxed(|co| async move {
                co.yield_item(1).await?;
                co.yield_item(2).await?;
                Ok(Value::None)
            }))
        }));
        assert!(seq.is_sequence());
        let (items, _) = drain(seq.open(Args::new()).unwrap().as_mut()).unwrap();
        assert_eq!(items, vec![Value::from(1), Value::from(2)]);

        let fut = aspect.wrap(Operation::asynchronous("later", |_args: Args| async move {
            Ok(Value::from(1))
        }));
        assert!(fut.is_async());
    }

    #[test]
    fn test_spawn_is_fresh_per_call() {
        let aspect = Aspect::new("constant", |_| Constant(Value::None));
        let mut first = aspect.spawn(Invocation::new("x", Args::new()));
        let second = aspect.spawn(Invocation::new("x", Args::new()));
        first.start().unwrap();
        assert_eq!(first.state(), ProcessState::Finished);
        assert_eq!(second.state(), ProcessState::NotStarted);
        assert_ne!(first.call_id(), second.call_id());
    }
}
