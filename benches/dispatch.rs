//! Throughput benchmarks for publish fan-out and executor dispatch.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nodebus::{Context, Executor};
use std::sync::Arc;

/// Publish cost as the number of subscribers on a topic grows
fn bench_publish_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fan_out");

    for subscribers in [1, 4, 16, 64] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let ctx = Context::init();
                let node = ctx.create_node("bench").unwrap();
                for _ in 0..count {
                    node.create_subscription("t", 10, |_| {}).unwrap();
                }

                b.iter(|| {
                    black_box(ctx.publish("t", &b"payload"[..]));
                });
            },
        );
    }

    group.finish();
}

/// Publish then drain a batch through spin_some
fn bench_spin_some(c: &mut Criterion) {
    let mut group = c.benchmark_group("spin_some");

    for batch in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &n| {
            let ctx = Context::init();
            let node = ctx.create_node("bench").unwrap();
            node.create_subscription("t", n, |m| {
                black_box(m.payload().len());
            })
            .unwrap();
            let executor = Executor::new(Arc::clone(&ctx));
            executor.add_node(node).unwrap();

            b.iter(|| {
                for _ in 0..n {
                    ctx.publish("t", &b"payload"[..]);
                }
                black_box(executor.spin_some().unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_publish_fan_out, bench_spin_some);
criterion_main!(benches);
