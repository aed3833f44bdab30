use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use aspectlib_core::{
    drain, Advisor, Args, Aspect, Generator, Interceptor, InterceptorChain, Operation, Value,
};

fn pass_through() -> Aspect {
    Aspect::routine("pass", |_, advisor: Advisor| async move {
        Ok(Some(advisor.proceed().await?))
    })
}

fn add() -> Operation {
    Operation::plain("add", |args: Args| {
        let a = args.get(0).and_then(Value::as_int).unwrap_or(0);
        let b = args.get(1).and_then(Value::as_int).unwrap_or(0);
        Ok(Value::from(a + b))
    })
}

fn range() -> Operation {
    Operation::sequence("range", |args: Args| {
        let n = args.get(0).and_then(Value::as_int).unwrap_or(0);
        Ok(Generator::boxed(move |co| async move {
            for i in 0..n {
                co.yield_item(i).await?;
            }
            Ok(Value::from(n))
        }))
    })
}

fn bench_plain_call(c: &mut Criterion) {
    let mut group = c.benchmark_group("plain_call");
    group.bench_function("direct", |b| {
        let op = add();
        b.iter(|| op.call(black_box(Args::positional([1, 2]))))
    });
    for depth in [1usize, 4, 16] {
        let chain = (0..depth).fold(InterceptorChain::new(), |chain, _| chain.with(pass_through()));
        let op = chain.wrap(add());
        group.bench_with_input(BenchmarkId::new("chained", depth), &op, |b, op| {
            b.iter(|| op.call(black_box(Args::positional([1, 2]))))
        });
    }
    group.finish();
}

fn bench_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence_drain");
    let direct = range();
    group.bench_function("direct", |b| {
        b.iter(|| {
            let mut seq = direct.open(Args::positional([100])).ok();
            seq.as_mut().map(|seq| drain(seq.as_mut()))
        })
    });
    let wrapped = pass_through().wrap(range());
    group.bench_function("intercepted", |b| {
        b.iter(|| {
            let mut seq = wrapped.open(Args::positional([100])).ok();
            seq.as_mut().map(|seq| drain(seq.as_mut()))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_plain_call, bench_sequence);
criterion_main!(benches);
