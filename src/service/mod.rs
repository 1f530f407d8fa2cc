//! The service facade.
//!
//! An [`IoService`] binds the request-serving machinery together: one
//! reactor (and with it the worker pool), any number of acceptors, and
//! the request-rate stats. Protocol layers register an acceptor per
//! listening port and share the event loop.

use crate::net::{AcceptCallback, Acceptor};
use crate::reactor::Reactor;
use crate::stats::RequestStats;

use std::io;
use std::sync::{Arc, Condvar, Mutex};

struct StopState {
    /// stop() was issued.
    requested: bool,

    /// stop() completed.
    stopped: bool,
}

/// Lifecycle orchestrator for a set of acceptors over one reactor.
///
/// # Thread safety
///
/// [`stop`](Self::stop) may be called from any thread, any number of
/// times: the first caller performs the tear-down and every concurrent
/// caller blocks until it completes. Calling it from a pool worker
/// (the `/quit` path does) is supported.
pub struct IoService {
    reactor: Arc<Reactor>,
    stats: RequestStats,
    acceptors: Mutex<Vec<Arc<Acceptor>>>,

    stop: Mutex<StopState>,
    cv_stopped: Condvar,
}

impl IoService {
    /// Builds a service whose reactor runs `num_workers` pool threads.
    pub fn new(num_workers: usize) -> Arc<IoService> {
        Arc::new(IoService {
            reactor: Arc::new(Reactor::new(num_workers)),
            stats: RequestStats::new(num_workers),
            acceptors: Mutex::new(Vec::new()),
            stop: Mutex::new(StopState {
                requested: false,
                stopped: false,
            }),
            cv_stopped: Condvar::new(),
        })
    }

    /// Installs `cb` as the upcall for connect requests arriving on
    /// `port` (0 picks an ephemeral port) and returns the bound port.
    ///
    /// Acceptors must be registered before [`start`](Self::start).
    pub fn register_acceptor(&self, port: u16, cb: AcceptCallback) -> io::Result<u16> {
        let acceptor = Acceptor::new(&self.reactor, port, cb)?;
        let bound = acceptor.port();
        self.acceptors.lock().unwrap().push(acceptor);
        Ok(bound)
    }

    /// Starts accepting and serving. Blocks the calling thread — it
    /// becomes the polling thread — and returns only after
    /// [`stop`](Self::stop) has completely finished.
    pub fn start(&self) {
        let acceptors: Vec<_> = self.acceptors.lock().unwrap().clone();
        for acceptor in &acceptors {
            Acceptor::start_accept(acceptor);
        }

        self.reactor.poll();

        // poll() broke out of its loop, but the stop() that broke it
        // may still be tearing the workers down; hold until it
        // finished so the caller can safely drop the service.
        let mut stop = self.stop.lock().unwrap();
        while !stop.stopped {
            stop = self.cv_stopped.wait(stop).unwrap();
        }
    }

    /// Tears the service down: closes every acceptor, stops the
    /// reactor and its workers, then releases [`start`](Self::start).
    pub fn stop(&self) {
        {
            let mut stop = self.stop.lock().unwrap();
            if stop.requested {
                // Someone else is (or was) stopping; wait for them.
                while !stop.stopped {
                    stop = self.cv_stopped.wait(stop).unwrap();
                }
                return;
            }
            stop.requested = true;
        }

        let acceptors: Vec<_> = self.acceptors.lock().unwrap().clone();
        for acceptor in &acceptors {
            acceptor.close();
        }

        // Waits for the polling loop to break and all enqueued
        // callbacks to be served before the workers join.
        self.reactor.stop();

        let mut stop = self.stop.lock().unwrap();
        stop.stopped = true;
        self.cv_stopped.notify_all();
    }

    /// True once [`stop`](Self::stop) has been issued.
    pub fn stopped(&self) -> bool {
        self.stop.lock().unwrap().requested
    }

    /// The reactor backing this service.
    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    /// Request-rate counters shared by the protocols on this service.
    pub fn stats(&self) -> &RequestStats {
        &self.stats
    }
}

impl Drop for IoService {
    fn drop(&mut self) {
        self.stop();
    }
}
