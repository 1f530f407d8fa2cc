use statio::pool;
use statio::reactor::Reactor;
use statio::task::Task;

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::os::fd::IntoRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

fn start_reactor(workers: usize) -> (Arc<Reactor>, thread::JoinHandle<()>) {
    let reactor = Arc::new(Reactor::new(workers));
    let handle = {
        let reactor = reactor.clone();
        thread::spawn(move || reactor.poll())
    };
    (reactor, handle)
}

#[test]
fn tasks_run_on_pool_workers() {
    let (reactor, poll_thread) = start_reactor(2);

    let seen = Arc::new(Mutex::new(None));
    let seen2 = seen.clone();
    reactor.add_task(Task::once(move || {
        *seen2.lock().unwrap() = Some(pool::me());
    }));

    wait_until("task to run", || seen.lock().unwrap().is_some());
    let worker = seen.lock().unwrap().unwrap();
    assert!(worker < 2, "task ran off-pool (worker {worker})");

    reactor.stop();
    poll_thread.join().unwrap();
}

#[test]
fn timers_fire_in_deadline_order() {
    let (reactor, poll_thread) = start_reactor(1);

    let order = Arc::new(Mutex::new(Vec::new()));

    let order2 = order.clone();
    reactor.add_timer(0.3, Task::once(move || order2.lock().unwrap().push(2)));
    let order2 = order.clone();
    reactor.add_timer(0.1, Task::once(move || order2.lock().unwrap().push(1)));

    wait_until("both timers", || order.lock().unwrap().len() == 2);
    assert_eq!(*order.lock().unwrap(), vec![1, 2]);

    reactor.stop();
    poll_thread.join().unwrap();
}

#[test]
fn equal_deadlines_keep_insertion_order() {
    let (reactor, poll_thread) = start_reactor(1);

    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..5 {
        let order = order.clone();
        reactor.add_timer(0.05, Task::once(move || order.lock().unwrap().push(i)));
    }

    wait_until("all timers", || order.lock().unwrap().len() == 5);
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);

    reactor.stop();
    poll_thread.join().unwrap();
}

/// The descriptor latch: readiness without demand is banked; demand
/// without readiness is armed; the callback fires exactly once per
/// meeting of the two. A callback that neither drains nor re-arms
/// stalls the socket until a new request comes in.
#[test]
fn latch_pairs_readiness_with_demand() {
    let (reactor, poll_thread) = start_reactor(1);

    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = listener.local_addr().unwrap();
    let mut client = TcpStream::connect(addr).expect("failed to connect");
    let (server, _) = listener.accept().expect("failed to accept");
    let fd = server.into_raw_fd();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = fired.clone();
    // Deliberately neither drains the socket nor re-arms.
    let read_cb = Task::handle(move || {
        fired2.fetch_add(1, Ordering::SeqCst);
    });

    let descriptor = reactor.new_descriptor(fd, Some(read_cb), None);

    // Readiness with no demand: banked, nothing fires.
    client.write_all(b"a").unwrap();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // Demand meets the banked readiness: fires once.
    descriptor.read_when_ready(Box::new(()));
    wait_until("first upcall", || fired.load(Ordering::SeqCst) == 1);

    // New edge with no demand: banked again, still no fire. This is
    // the stall a partial drain without re-arm produces.
    client.write_all(b"b").unwrap();
    thread::sleep(Duration::from_millis(300));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Re-arming unstalls.
    descriptor.read_when_ready(Box::new(()));
    wait_until("second upcall", || fired.load(Ordering::SeqCst) == 2);

    reactor.del_descriptor(&descriptor);
    reactor.stop();
    poll_thread.join().unwrap();

    unsafe { libc::close(fd) };
}

#[test]
fn demand_before_readiness_fires_on_the_edge() {
    let (reactor, poll_thread) = start_reactor(1);

    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = listener.local_addr().unwrap();
    let mut client = TcpStream::connect(addr).expect("failed to connect");
    let (server, _) = listener.accept().expect("failed to accept");
    let fd = server.into_raw_fd();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = fired.clone();
    let read_cb = Task::handle(move || {
        fired2.fetch_add(1, Ordering::SeqCst);
    });

    let descriptor = reactor.new_descriptor(fd, Some(read_cb), None);

    // Demand first; no data yet, so nothing can fire.
    descriptor.read_when_ready(Box::new(()));
    thread::sleep(Duration::from_millis(200));
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // The readiness edge releases the armed demand.
    client.write_all(b"x").unwrap();
    wait_until("armed upcall", || fired.load(Ordering::SeqCst) == 1);

    reactor.del_descriptor(&descriptor);
    reactor.stop();
    poll_thread.join().unwrap();

    unsafe { libc::close(fd) };
}

#[test]
fn stop_is_idempotent_and_callable_from_anywhere() {
    let (reactor, poll_thread) = start_reactor(2);

    reactor.stop();
    reactor.stop();
    assert!(reactor.stopped());

    poll_thread.join().unwrap();
}
