//! Per-descriptor readiness/demand latch.
//!
//! A [`Descriptor`] merges two asynchronous signals into one scheduling
//! decision: the OS reporting "this socket is ready" and a user asking
//! "run my callback when I can read (or write)". Whichever signal
//! arrives second fires the callback on the worker pool.
//!
//! The underlying registration is edge-triggered, so a read or write
//! callback must drain the socket until `EAGAIN` and then re-arm
//! through [`Descriptor::read_when_ready`] /
//! [`Descriptor::write_when_ready`]; returning early without either
//! stalls the socket.

use crate::pool::{FastPool, ThreadPool};
use crate::reactor::poller::unix::sys_set_nonblocking;
use crate::task::{Task, TaskHandle};

use std::any::Any;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A multi-shot upcall installed on a descriptor. The descriptor owns
/// it; each firing schedules a cheap clone.
pub type Callback = TaskHandle;

/// Type-erased ownership token carried from arming to callback
/// completion.
///
/// Arming a latch hands over a clone of the owner's `Arc`; the clone
/// rides inside the scheduled task and is dropped when the callback
/// finishes. This is what keeps a connection (or acceptor) alive for
/// exactly as long as it has a continuation in flight.
pub type KeepAlive = Box<dyn Any + Send>;

/// State of one direction (read or write).
///
/// The pair `(waiting, can)` encodes four states, of which
/// `(Some, true)` is unreachable: whichever transition would create it
/// fires the callback instead.
struct Latch {
    /// Readiness arrived but nobody asked yet.
    can: bool,

    /// Somebody asked but readiness has not arrived; holds the asker's
    /// keepalive.
    waiting: Option<KeepAlive>,
}

impl Latch {
    fn new() -> Self {
        Self {
            can: false,
            waiting: None,
        }
    }
}

struct Upcalls {
    read: Latch,
    write: Latch,
    read_cb: Option<Callback>,
    write_cb: Option<Callback>,
}

/// The per-fd rendezvous between readiness and demand. See the
/// [module docs](self).
///
/// Created through `Reactor::new_descriptor`; disposed of through
/// `Reactor::del_descriptor`, which defers the release to the polling
/// thread's GC pass so no worker can be left holding a dead reference.
pub struct Descriptor {
    fd: RawFd,
    token: AtomicUsize,
    pool: Arc<FastPool>,
    state: Mutex<Upcalls>,
}

impl Descriptor {
    pub(crate) fn new(
        fd: RawFd,
        pool: Arc<FastPool>,
        read_cb: Option<Callback>,
        write_cb: Option<Callback>,
    ) -> Self {
        // Everything behind a descriptor runs under the edge-triggered
        // contract; a blocking fd would wedge a worker.
        let _ = sys_set_nonblocking(fd);

        Self {
            fd,
            token: AtomicUsize::new(usize::MAX),
            pool,
            state: Mutex::new(Upcalls {
                read: Latch::new(),
                write: Latch::new(),
                read_cb,
                write_cb,
            }),
        }
    }

    /// The underlying socket.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn set_token(&self, token: usize) {
        self.token.store(token, Ordering::Release);
    }

    pub(crate) fn token(&self) -> usize {
        self.token.load(Ordering::Acquire)
    }

    /// Replaces both upcalls, dropping the previous ones.
    ///
    /// Used by the client-connect path: the descriptor starts with only
    /// a connect-completion callback and is switched to the live
    /// read/write pair once the connect resolves.
    pub fn set_up_calls(&self, read_cb: Option<Callback>, write_cb: Option<Callback>) {
        let old;
        {
            let mut state = self.state.lock().unwrap();
            old = (state.read_cb.take(), state.write_cb.take());
            state.read_cb = read_cb;
            state.write_cb = write_cb;
        }
        drop(old);
    }

    /// User-request transition for reads: fire now if readiness is
    /// banked, otherwise arm and hold `keep` until it fires.
    pub fn read_when_ready(&self, keep: KeepAlive) {
        let mut state = self.state.lock().unwrap();
        if state.read.can {
            state.read.can = false;
            let cb = state.read_cb.clone();
            drop(state);
            self.schedule(cb, keep);
        } else {
            state.read.waiting = Some(keep);
        }
    }

    /// User-request transition for writes.
    pub fn write_when_ready(&self, keep: KeepAlive) {
        let mut state = self.state.lock().unwrap();
        if state.write.can {
            state.write.can = false;
            let cb = state.write_cb.clone();
            drop(state);
            self.schedule(cb, keep);
        } else {
            state.write.waiting = Some(keep);
        }
    }

    /// Readiness-edge transition for reads: fire the armed waiter if
    /// there is one, otherwise bank the readiness. Called by the
    /// polling thread only.
    pub(crate) fn read_if_waiting(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(keep) = state.read.waiting.take() {
            let cb = state.read_cb.clone();
            drop(state);
            self.schedule(cb, keep);
        } else {
            state.read.can = true;
        }
    }

    /// Readiness-edge transition for writes.
    pub(crate) fn write_if_waiting(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(keep) = state.write.waiting.take() {
            let cb = state.write_cb.clone();
            drop(state);
            self.schedule(cb, keep);
        } else {
            state.write.can = true;
        }
    }

    fn schedule(&self, cb: Option<Callback>, keep: KeepAlive) {
        let Some(cb) = cb else {
            // No upcall installed for this direction; the keepalive
            // simply drops.
            return;
        };

        self.pool.add_task(Task::once(move || {
            cb();
            drop(keep);
        }));
    }
}
