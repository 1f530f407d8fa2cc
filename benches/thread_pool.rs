use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use statio::pool::{FastPool, SimplePool, ThreadPool};
use statio::task::Task;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const TASKS: usize = 1000;

/// Dispatches `TASKS` no-op increments and spins until every one ran.
fn dispatch_burst(pool: &dyn ThreadPool) {
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..TASKS {
        let done = done.clone();
        pool.add_task(Task::once(move || {
            done.fetch_add(1, Ordering::Release);
        }));
    }

    while done.load(Ordering::Acquire) < TASKS {
        std::hint::spin_loop();
    }
}

fn pool_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_dispatch");
    group.throughput(Throughput::Elements(TASKS as u64));

    for workers in [1usize, 4] {
        let fast = FastPool::new(workers);
        group.bench_with_input(BenchmarkId::new("fast", workers), &fast, |b, pool| {
            b.iter(|| dispatch_burst(*pool))
        });
        fast.stop();

        let simple = SimplePool::new(workers);
        group.bench_with_input(BenchmarkId::new("simple", workers), &simple, |b, pool| {
            b.iter(|| dispatch_burst(*pool))
        });
        simple.stop();
    }

    group.finish();
}

criterion_group!(benches, pool_dispatch);
criterion_main!(benches);
