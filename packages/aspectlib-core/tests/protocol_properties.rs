// Property tests for the interception protocol: pass-through and chain
// identity for plain calls and sequences, retry counts, short-circuiting,
// and the inner-then-advice cleanup order on every exit path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aspectlib_core::{
    Advice, Advisor, Args, Aspect, Failure, Interceptor, InterceptorChain, LazySequence,
    Operation, Routine, SequenceStep, Signal, Step, Value,
};
use proptest::prelude::*;

type Log = Arc<Mutex<Vec<String>>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn pass_through() -> Aspect {
    Aspect::routine("pass", |_, advisor: Advisor| async move {
        Ok(Some(advisor.proceed().await?))
    })
}

fn retrying(limit: usize) -> Aspect {
    Aspect::routine("retry", move |_, advisor: Advisor| async move {
        let mut retries = 0;
        loop {
            match advisor.proceed().await {
                Ok(value) => return Ok(Some(value)),
                Err(_) if retries < limit => retries += 1,
                Err(failure) => return Err(failure),
            }
        }
    })
}

/// Yields `10, 20, ...` `count` times, then returns `"final"`. Records every
/// resumption value after the first pull and every close.
struct Instrumented {
    next: i64,
    count: i64,
    started: bool,
    received: Log,
    log: Log,
}

impl LazySequence for Instrumented {
    fn resume(&mut self, value: Value) -> SequenceStep {
        if self.started {
            self.received.lock().unwrap().push(value.to_string());
        }
        self.started = true;
        if self.next < self.count {
            self.next += 1;
            SequenceStep::Yield(Value::from(self.next * 10))
        } else {
            SequenceStep::Return(Value::from("final"))
        }
    }

    fn throw(&mut self, failure: Failure) -> SequenceStep {
        SequenceStep::Throw(failure)
    }

    fn close(&mut self) {
        self.log.lock().unwrap().push("inner closed".to_string());
    }
}

fn instrumented(count: i64, received: &Log, log: &Log) -> Operation {
    let received = Arc::clone(received);
    let log = Arc::clone(log);
    Operation::sequence("numbers", move |_args: Args| {
        Ok(Box::new(Instrumented {
            next: 0,
            count,
            started: false,
            received: Arc::clone(&received),
            log: Arc::clone(&log),
        }) as Box<dyn LazySequence>)
    })
}

/// Delegates to a routine and records its close.
struct Tracked {
    routine: Routine,
    log: Log,
}

impl Advice for Tracked {
    fn name(&self) -> &str {
        self.routine.name()
    }

    fn start(&mut self) -> Step {
        self.routine.start()
    }

    fn send(&mut self, value: Value) -> Step {
        self.routine.send(value)
    }

    fn throw(&mut self, failure: Failure) -> Step {
        self.routine.throw(failure)
    }

    fn observe(&mut self, item: &Value) -> Signal {
        self.routine.observe(item)
    }

    fn close(&mut self) {
        self.log.lock().unwrap().push("advice closed".to_string());
        self.routine.close();
    }
}

#[derive(Debug, Clone, Copy)]
enum Exit {
    Exhaust,
    Close(usize),
    ObserverFails(usize),
    AdviceFailsAfterInner,
}

fn exit_strategy() -> impl Strategy<Value = Exit> {
    prop_oneof![
        Just(Exit::Exhaust),
        (1usize..8).prop_map(Exit::Close),
        (0usize..8).prop_map(Exit::ObserverFails),
        Just(Exit::AdviceFailsAfterInner),
    ]
}

fn routine_for(exit: Exit) -> Routine {
    match exit {
        Exit::AdviceFailsAfterInner => Routine::new("fails", |advisor: Advisor| async move {
            advisor.proceed().await?;
            Err(Failure::new("value", "advice gave up"))
        }),
        Exit::ObserverFails(limit) => {
            let mut seen = 0;
            Routine::new("observer", |advisor: Advisor| async move {
                Ok(Some(advisor.proceed().await?))
            })
            .observing(move |_item| {
                seen += 1;
                if seen > limit {
                    Err(Failure::new("value", "observer gave up"))
                } else {
                    Ok(None)
                }
            })
        }
        Exit::Exhaust | Exit::Close(_) => Routine::new("pass", |advisor: Advisor| async move {
            Ok(Some(advisor.proceed().await?))
        }),
    }
}

/// Pull until termination, sending `r` into the pull with index `j`.
fn pull_pattern(seq: &mut dyn LazySequence, j: usize, r: i64) -> Vec<String> {
    let mut out = Vec::new();
    for pull in 0.. {
        let input = if pull == j { Value::from(r) } else { Value::None };
        let step = seq.resume(input);
        out.push(format!("{step:?}"));
        if !step.is_yield() {
            break;
        }
    }
    out
}

proptest! {
    #[test]
    fn pass_through_is_identity(n in -50i64..50) {
        let failure = Failure::new("value", "odd input");
        let shared = failure.clone();
        let op = Operation::plain("triple", move |args: Args| {
            let n = args.get(0).and_then(Value::as_int).unwrap_or(0);
            if n % 2 == 0 { Ok(Value::from(n * 3)) } else { Err(shared.clone()) }
        });
        let wrapped = pass_through().wrap(op.clone());
        match (op.call(Args::positional([n])), wrapped.call(Args::positional([n]))) {
            (Ok(direct), Ok(intercepted)) => prop_assert_eq!(direct, intercepted),
            (Err(direct), Err(intercepted)) => {
                prop_assert!(direct.same(&intercepted));
                prop_assert!(intercepted.same(&failure));
            }
            (direct, intercepted) => prop_assert!(false, "{direct:?} vs {intercepted:?}"),
        }
    }

    #[test]
    fn chain_of_pass_throughs_is_identity(k in 0usize..6, n in 0i64..20) {
        let op = Operation::plain("square", |args: Args| {
            let n = args.get(0).and_then(Value::as_int).unwrap_or(0);
            Ok(Value::from(n * n))
        });
        let chain = (0..k).fold(InterceptorChain::new(), |chain, _| chain.with(pass_through()));
        prop_assert_eq!(chain.len(), k);
        let wrapped = chain.wrap(op.clone());
        prop_assert_eq!(
            wrapped.call(Args::positional([n])).unwrap(),
            op.call(Args::positional([n])).unwrap()
        );
    }

    #[test]
    fn retry_invocation_counts(limit in 0usize..5, fail_first in 0usize..8) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = Operation::plain("flaky", move |_args: Args| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < fail_first {
                Err(Failure::new("io", format!("attempt {n}")))
            } else {
                Ok(Value::from("ok"))
            }
        });
        let result = retrying(limit).wrap(op).call(Args::new());
        if fail_first <= limit {
            prop_assert_eq!(result.unwrap(), Value::from("ok"));
            prop_assert_eq!(calls.load(Ordering::SeqCst), fail_first + 1);
        } else {
            let failure = result.unwrap_err();
            prop_assert_eq!(failure.kind(), "io");
            prop_assert_eq!(calls.load(Ordering::SeqCst), limit + 1);
        }
    }

    #[test]
    fn sequence_pass_through_is_transparent(count in 0i64..6, j in 1usize..8, r in 0i64..100) {
        let direct_received = Log::default();
        let intercepted_received = Log::default();
        let closes = Log::default();

        let direct_op = instrumented(count, &direct_received, &closes);
        let mut direct = direct_op.open(Args::new()).unwrap();
        let expected = pull_pattern(direct.as_mut(), j, r);

        let wrapped = pass_through().wrap(instrumented(count, &intercepted_received, &closes));
        let mut intercepted = wrapped.open(Args::new()).unwrap();
        let actual = pull_pattern(intercepted.as_mut(), j, r);

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(entries(&intercepted_received), entries(&direct_received));
    }

    #[test]
    fn sequence_chain_of_pass_throughs_is_transparent(
        k in 0usize..5,
        count in 0i64..6,
        j in 1usize..8,
        r in 0i64..100,
    ) {
        let direct_received = Log::default();
        let chained_received = Log::default();
        let closes = Log::default();

        let direct_op = instrumented(count, &direct_received, &closes);
        let mut direct = direct_op.open(Args::new()).unwrap();
        let expected = pull_pattern(direct.as_mut(), j, r);

        let chain = (0..k).fold(InterceptorChain::new(), |chain, _| chain.with(pass_through()));
        let wrapped = chain.wrap(instrumented(count, &chained_received, &closes));
        let mut chained = wrapped.open(Args::new()).unwrap();
        let actual = pull_pattern(chained.as_mut(), j, r);

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(entries(&chained_received), entries(&direct_received));
    }

    #[test]
    fn cleanup_runs_once_inner_first(count in 0i64..6, exit in exit_strategy()) {
        let log = Log::default();
        let received = Log::default();
        let advice_log = Arc::clone(&log);
        let aspect = Aspect::new("tracked", move |_| Tracked {
            routine: routine_for(exit),
            log: Arc::clone(&advice_log),
        });
        let wrapped = aspect.wrap(instrumented(count, &received, &log));
        let mut seq = wrapped.open(Args::new()).unwrap();

        match exit {
            Exit::Close(pulls) => {
                for _ in 0..pulls {
                    if !seq.next_step().is_yield() {
                        break;
                    }
                }
                seq.close();
            }
            _ => loop {
                if !seq.next_step().is_yield() {
                    break;
                }
            },
        }
        seq.close();
        drop(seq);

        prop_assert_eq!(entries(&log), vec!["inner closed".to_string(), "advice closed".to_string()]);
    }
}

#[test]
fn short_circuit_never_invokes() {
    init_logging();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let op = Operation::plain("expensive", move |_args: Args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::from("fresh"))
    });
    let cached = Aspect::routine("cache", |_, _advisor: Advisor| async move {
        Ok(Some(Value::from("cached")))
    });
    let wrapped = InterceptorChain::new()
        .with(pass_through())
        .with(cached)
        .wrap(op);
    for _ in 0..3 {
        assert_eq!(wrapped.call(Args::new()).unwrap(), Value::from("cached"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn sequence_failure_reaches_consumer_unchanged() {
    init_logging();
    let failure = Failure::new("io", "disk gone");
    let raised = failure.clone();
    let op = Operation::sequence("broken", move |_args: Args| {
        let raised = raised.clone();
        Ok(aspectlib_core::Generator::boxed(move |co| async move {
            co.yield_item(1).await?;
            Err(raised)
        }))
    });
    let wrapped = InterceptorChain::new()
        .with(pass_through())
        .with(pass_through())
        .wrap(op);
    let mut seq = wrapped.open(Args::new()).unwrap();
    assert!(seq.next_step().is_yield());
    match seq.next_step() {
        SequenceStep::Throw(err) => assert!(err.same(&failure)),
        other => panic!("expected throw, got {other:?}"),
    }
}
