use super::ThreadPool;
use crate::task::Task;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// A queued message: a task to run, or `None` asking the worker to
/// exit.
type Message = Option<Task>;

/// One-slot rendezvous owned by a single worker.
///
/// The dispatcher fills the slot; the owning worker empties it. A full
/// slot means the worker has left the free list, so no second delivery
/// can race in.
struct Mailbox {
    slot: Mutex<Option<Message>>,
    has_message: Condvar,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            has_message: Condvar::new(),
        }
    }

    fn deliver(&self, message: Message) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(message);
        self.has_message.notify_one();
    }

    fn receive(&self) -> Message {
        let mut slot = self.slot.lock().unwrap();
        while slot.is_none() {
            slot = self.has_message.wait(slot).unwrap();
        }
        slot.take().unwrap()
    }
}

/// Dispatch state shared between the pool handle and its workers.
struct Dispatch {
    /// Tasks nobody was free to take yet.
    queue: VecDeque<Message>,

    /// Workers waiting for a delivery.
    free: VecDeque<Arc<Mailbox>>,
}

/// Worker pool with a free-worker fast path.
///
/// `add_task` hands the task directly to an idle worker's mailbox when
/// one exists and only falls back to the shared queue otherwise. A
/// worker finishing a task takes the queue head if there is one and
/// parks itself on the free list if not.
///
/// Stopping delivers one exit sentinel per worker; see
/// [`ThreadPool::stop`] for the stop-from-worker rule.
pub struct FastPool {
    dispatch: Arc<Mutex<Dispatch>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    num_workers: usize,
}

impl FastPool {
    /// Spawns `num_workers` worker threads, all initially idle.
    pub fn new(num_workers: usize) -> Self {
        assert!(num_workers > 0, "num_workers must be > 0");

        let dispatch = Arc::new(Mutex::new(Dispatch {
            queue: VecDeque::new(),
            free: VecDeque::new(),
        }));

        let mut handles = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let mailbox = Arc::new(Mailbox::new());
            dispatch.lock().unwrap().free.push_back(mailbox.clone());

            let dispatch = dispatch.clone();
            let handle = thread::Builder::new()
                .name(format!("statio-worker-{id}"))
                .spawn(move || worker_loop(id, mailbox, dispatch))
                .expect("failed to spawn pool worker");
            handles.push(handle);
        }

        Self {
            dispatch,
            handles: Mutex::new(handles),
            num_workers,
        }
    }

    fn add_message(&self, message: Message) {
        let mut dispatch = self.dispatch.lock().unwrap();
        if let Some(mailbox) = dispatch.free.pop_front() {
            mailbox.deliver(message);
        } else {
            dispatch.queue.push_back(message);
        }
    }
}

impl ThreadPool for FastPool {
    fn add_task(&self, task: Task) {
        self.add_message(Some(task));
    }

    fn stop(&self) {
        for _ in 0..self.num_workers {
            self.add_message(None);
        }

        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        let caller = thread::current().id();
        let mut stopping_from_worker = false;

        for handle in handles {
            if handle.thread().id() == caller {
                // Cannot join the thread running this very call; it
                // exits on its own right after the current task.
                stopping_from_worker = true;
            } else {
                let _ = handle.join();
            }
        }

        if stopping_from_worker {
            super::mark_last_worker();
        }
    }

    fn count(&self) -> usize {
        self.dispatch.lock().unwrap().queue.len()
    }
}

impl Drop for FastPool {
    fn drop(&mut self) {
        if !self.handles.get_mut().unwrap().is_empty() {
            self.stop();
        }
        // Tasks still queued (including ones submitted after stop) are
        // dropped unexecuted.
        self.dispatch.lock().unwrap().queue.clear();
    }
}

fn worker_loop(id: usize, mailbox: Arc<Mailbox>, dispatch: Arc<Mutex<Dispatch>>) {
    super::set_worker_id(id);

    'outer: loop {
        let mut message = mailbox.receive();

        loop {
            match message {
                None => break 'outer,
                Some(task) => {
                    task.run();
                    if super::is_last_worker() {
                        break 'outer;
                    }
                }
            }

            // Grab more work while we are hot; park only when the
            // queue is dry.
            let next = {
                let mut dispatch = dispatch.lock().unwrap();
                match dispatch.queue.pop_front() {
                    Some(next) => Some(next),
                    None => {
                        dispatch.free.push_back(mailbox.clone());
                        None
                    }
                }
            };

            match next {
                Some(next) => message = next,
                None => break,
            }
        }
    }
}
