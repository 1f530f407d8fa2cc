use super::descriptor::{Callback, Descriptor};
use super::poller::event::Event;
use super::poller::Poller;
use super::timer::TimerQueue;
use crate::pool::{FastPool, ThreadPool};
use crate::stats::ticks::{self, Ticks};
use crate::task::Task;
use crate::utils::Slab;

use std::mem;
use std::os::fd::RawFd;
use std::sync::{Arc, Condvar, Mutex};

struct StopFlags {
    /// Has stop been requested?
    stopped: bool,

    /// Is the polling loop still running?
    polling: bool,
}

/// Readiness-driven I/O reactor.
///
/// One thread — whichever calls [`poll`] — owns the OS readiness
/// primitive and multiplexes every registered socket over it. Ready
/// descriptors get their upcalls scheduled on the worker pool, so no
/// user callback ever runs on the polling thread.
///
/// Each loop iteration polls, drains due timers, fans events out to
/// descriptors, and garbage-collects descriptors retired since the
/// last pass. The GC deferral is what makes `del_descriptor` safe to
/// call from any thread: the slot is released only by the polling
/// thread, after event dispatch.
///
/// Sockets handed to the reactor must be non-blocking (the
/// [`Descriptor`] constructor enforces this).
///
/// [`poll`]: Reactor::poll
pub struct Reactor {
    poller: Poller,
    pool: Arc<FastPool>,
    registry: Mutex<Slab<Arc<Descriptor>>>,

    /// Tokens of descriptors awaiting collection.
    gc: Mutex<Vec<usize>>,

    timers: Mutex<TimerQueue>,

    stop: Mutex<StopFlags>,
    cv_polling: Condvar,
}

impl Reactor {
    /// Builds a reactor backed by `num_workers` pool threads.
    pub fn new(num_workers: usize) -> Self {
        Self {
            poller: Poller::new(),
            pool: Arc::new(FastPool::new(num_workers)),
            registry: Mutex::new(Slab::new()),
            gc: Mutex::new(Vec::new()),
            timers: Mutex::new(TimerQueue::new()),
            stop: Mutex::new(StopFlags {
                stopped: false,
                polling: false,
            }),
            cv_polling: Condvar::new(),
        }
    }

    /// Blocks the calling thread and runs the polling loop on it.
    /// Returns once [`stop`] is observed.
    ///
    /// [`stop`]: Reactor::stop
    pub fn poll(&self) {
        {
            let mut flags = self.stop.lock().unwrap();
            flags.polling = true;
        }

        self.poll_body();
    }

    /// Stops the polling loop and the worker pool; returns only when
    /// both are fully torn down. Idempotent; callable from any thread,
    /// including a pool worker.
    pub fn stop(&self) {
        {
            let mut flags = self.stop.lock().unwrap();
            if flags.stopped {
                return;
            }

            // Signal the intention to stop, then wait for the polling
            // loop to break. Stopping the workers while the loop kept
            // feeding them would never converge.
            flags.stopped = true;
            while flags.polling {
                flags = self.cv_polling.wait(flags).unwrap();
            }
        }

        // Workers drain their in-flight and queued callbacks and join.
        self.pool.stop();

        // With the loop and the workers gone, nobody can be holding a
        // descriptor; release whatever was retired.
        self.collect();
    }

    /// True once [`stop`] has been requested (not necessarily
    /// completed).
    ///
    /// [`stop`]: Reactor::stop
    pub fn stopped(&self) -> bool {
        self.stop.lock().unwrap().stopped
    }

    /// Registers `fd` and starts watching it. `read_cb` / `write_cb`
    /// fire — on pool workers — whenever readiness and demand meet on
    /// the returned descriptor.
    pub fn new_descriptor(
        &self,
        fd: RawFd,
        read_cb: Option<Callback>,
        write_cb: Option<Callback>,
    ) -> Arc<Descriptor> {
        let descriptor = Arc::new(Descriptor::new(fd, self.pool.clone(), read_cb, write_cb));

        let token = self.registry.lock().unwrap().insert(descriptor.clone());
        descriptor.set_token(token);

        self.poller.add(fd, token);
        descriptor
    }

    /// Retires a descriptor. The registry slot is freed by the polling
    /// thread on its next GC pass, never synchronously, so pending
    /// worker references stay valid.
    pub fn del_descriptor(&self, descriptor: &Arc<Descriptor>) {
        self.gc.lock().unwrap().push(descriptor.token());
    }

    /// Schedules `task` to run on a pool worker at least `delay`
    /// seconds (possibly fractional) from now.
    pub fn add_timer(&self, delay: f64, task: Task) {
        let deadline = ticks::now() + (delay * ticks::TICKS_PER_SECOND as f64) as Ticks;
        self.timers.lock().unwrap().insert(deadline, task);
    }

    /// Schedules `task` to run on a pool worker as soon as possible.
    pub fn add_task(&self, task: Task) {
        self.pool.add_task(task);
    }

    /// The worker pool driving the upcalls.
    pub fn pool(&self) -> &Arc<FastPool> {
        &self.pool
    }

    fn poll_body(&self) {
        let mut events: Vec<Event> = Vec::with_capacity(64);

        while !self.stopped() {
            self.poller.poll(&mut events);

            // Due timers go to the workers, in deadline order.
            {
                let mut timers = self.timers.lock().unwrap();
                let now = ticks::now();
                while let Some(task) = timers.pop_expired(now) {
                    self.pool.add_task(task);
                }
            }

            for event in &events {
                let descriptor = self.registry.lock().unwrap().get(event.token).cloned();
                let Some(descriptor) = descriptor else {
                    continue;
                };

                if event.error || event.readable {
                    descriptor.read_if_waiting();
                }
                if event.error || event.writable {
                    descriptor.write_if_waiting();
                }
            }

            self.collect();
        }

        let mut flags = self.stop.lock().unwrap();
        flags.polling = false;
        self.cv_polling.notify_all();
    }

    /// Releases every descriptor retired since the last pass. The
    /// final drop happens outside the registry lock.
    fn collect(&self) {
        let tokens: Vec<usize> = mem::take(&mut *self.gc.lock().unwrap());
        if tokens.is_empty() {
            return;
        }

        let mut retired = Vec::with_capacity(tokens.len());
        {
            let mut registry = self.registry.lock().unwrap();
            for token in tokens {
                if let Some(descriptor) = registry.try_remove(token) {
                    self.poller.del(descriptor.fd());
                    retired.push(descriptor);
                }
            }
        }
        drop(retired);
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}
