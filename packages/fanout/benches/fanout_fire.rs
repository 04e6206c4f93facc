//! Benchmarking the cost of firing events with various subscriber layouts.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use fanout::{Event, Handler, Manager, Priority, Queue};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout_fire");

    let empty = Event::<u64>::new();
    group.bench_function("no_subscribers", |b| {
        b.iter(|| empty.fire(black_box(1)));
    });

    let single = Event::<u64>::new();
    single.add(0, |value: &u64| {
        black_box(value);
    });
    group.bench_function("one_subscriber", |b| {
        b.iter(|| single.fire(black_box(1)));
    });

    // Spread over every kind of bucket, so the walk visits all of them.
    let spread = Event::<u64>::new();
    for priority in [
        Priority::Condition,
        Priority::First,
        Priority::Numbered(3),
        Priority::Numbered(0),
        Priority::Numbered(-3),
        Priority::Last,
    ] {
        for _ in 0..4 {
            spread.add(priority, |value: &u64| {
                black_box(value);
            });
        }
    }
    group.bench_function("24_subscribers_all_buckets", |b| {
        b.iter(|| spread.fire(black_box(1)));
    });

    let handled = Event::<u64>::new();
    let mut handlers = Vec::new();
    for _ in 0..8 {
        let mut handler = Handler::new(|value: &u64| {
            black_box(value);
        });
        handler.subscribe(&handled, 0);
        handlers.push(handler);
    }
    group.bench_function("8_handlers", |b| {
        b.iter(|| handled.fire(black_box(1)));
    });

    let manager = Arc::new(Manager::new());
    let managed = Event::<u64>::with_manager(&manager);
    managed.add(0, |value: &u64| {
        black_box(value);
    });
    group.bench_function("managed_fire_and_drain_100", |b| {
        b.iter(|| {
            for value in 0..100 {
                managed.fire(black_box(value));
            }

            manager.run_all()
        });
    });

    let queue = Queue::<u64>::new();
    queue.event().add(0, |value: &u64| {
        black_box(value);
    });
    group.bench_function("queue_process_100", |b| {
        b.iter_batched(
            || {
                for value in 0..100 {
                    queue.push(value);
                }
            },
            |()| queue.process(0),
            BatchSize::SmallInput,
        );
    });

    group.finish();

    drop(handlers);
}
