use statio::pool::{self, FastPool, SimplePool, ThreadPool};
use statio::sync::Notification;
use statio::task::Task;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

fn run_counter_workload(pool: &dyn ThreadPool, tasks: usize) -> usize {
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..tasks {
        let counter = counter.clone();
        pool.add_task(Task::once(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
    }

    pool.stop();
    counter.load(Ordering::Relaxed)
}

#[test]
fn fast_pool_runs_every_task() {
    let pool = FastPool::new(4);
    assert_eq!(run_counter_workload(&pool, 1000), 1000);
}

#[test]
fn simple_pool_runs_every_task() {
    let pool = SimplePool::new(4);
    assert_eq!(run_counter_workload(&pool, 1000), 1000);
}

#[test]
fn single_worker_runs_tasks_in_order() {
    let pool = FastPool::new(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..100 {
        let order = order.clone();
        pool.add_task(Task::once(move || {
            order.lock().unwrap().push(i);
        }));
    }

    pool.stop();
    assert_eq!(*order.lock().unwrap(), (0..100).collect::<Vec<_>>());
}

#[test]
fn stop_from_inside_a_worker_completes() {
    let pool = Arc::new(FastPool::new(4));
    let done = Arc::new(Notification::new());

    let pool2 = pool.clone();
    let done2 = done.clone();
    pool.add_task(Task::once(move || {
        pool2.stop();
        done2.notify();
    }));

    done.wait();
}

#[test]
fn count_reports_queued_backlog() {
    let pool = FastPool::new(1);

    let gate = Arc::new(Notification::new());
    let started = Arc::new(Notification::new());

    let gate2 = gate.clone();
    let started2 = started.clone();
    pool.add_task(Task::once(move || {
        started2.notify();
        gate2.wait();
    }));

    // The single worker is parked on the gate; everything else queues.
    started.wait();
    for _ in 0..10 {
        pool.add_task(Task::once(|| {}));
    }
    assert_eq!(pool.count(), 10);

    gate.notify();
    pool.stop();
    assert_eq!(pool.count(), 0);
}

#[test]
fn worker_ids_cover_the_pool() {
    const WORKERS: usize = 4;

    let pool = FastPool::new(WORKERS);
    let barrier = Arc::new(Barrier::new(WORKERS));
    let ids = Arc::new(Mutex::new(HashSet::new()));

    for _ in 0..WORKERS {
        let barrier = barrier.clone();
        let ids = ids.clone();
        pool.add_task(Task::once(move || {
            ids.lock().unwrap().insert(pool::me());
            // Hold every worker here so all four tasks land on
            // distinct workers.
            barrier.wait();
        }));
    }

    pool.stop();

    let ids = ids.lock().unwrap();
    assert_eq!(*ids, (0..WORKERS).collect::<HashSet<_>>());
}

#[test]
fn me_is_unset_off_worker() {
    assert_eq!(pool::me(), usize::MAX);
}

#[test]
fn multi_shot_tasks_can_be_scheduled_repeatedly() {
    let pool = FastPool::new(2);
    let counter = Arc::new(AtomicUsize::new(0));

    let counter2 = counter.clone();
    let handle = Task::handle(move || {
        counter2.fetch_add(1, Ordering::Relaxed);
    });

    for _ in 0..5 {
        pool.add_task(Task::from(handle.clone()));
    }

    pool.stop();
    assert_eq!(counter.load(Ordering::Relaxed), 5);
}
