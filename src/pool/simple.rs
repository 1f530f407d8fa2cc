use super::ThreadPool;
use crate::task::Task;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Message = Option<Task>;

struct Queue {
    messages: Mutex<VecDeque<Message>>,
    not_empty: Condvar,
}

/// Baseline worker pool: one shared queue, every worker blocks on it.
///
/// Same contract as [`super::FastPool`]; kept as the reference point the
/// fast pool is measured against.
pub struct SimplePool {
    queue: Arc<Queue>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    num_workers: usize,
}

impl SimplePool {
    /// Spawns `num_workers` worker threads.
    pub fn new(num_workers: usize) -> Self {
        assert!(num_workers > 0, "num_workers must be > 0");

        let queue = Arc::new(Queue {
            messages: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let queue = queue.clone();
            let handle = thread::Builder::new()
                .name(format!("statio-worker-{id}"))
                .spawn(move || worker_loop(id, queue))
                .expect("failed to spawn pool worker");
            handles.push(handle);
        }

        Self {
            queue,
            handles: Mutex::new(handles),
            num_workers,
        }
    }

    fn add_message(&self, message: Message) {
        let mut messages = self.queue.messages.lock().unwrap();
        messages.push_back(message);
        self.queue.not_empty.notify_one();
    }
}

impl ThreadPool for SimplePool {
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
        self.queue.messages.lock().unwrap().len()
    }
}

impl Drop for SimplePool {
    fn drop(&mut self) {
        if !self.handles.get_mut().unwrap().is_empty() {
            self.stop();
        }
        self.queue.messages.lock().unwrap().clear();
    }
}

fn worker_loop(id: usize, queue: Arc<Queue>) {
    super::set_worker_id(id);

    loop {
        let message = {
            let mut messages = queue.messages.lock().unwrap();
            while messages.is_empty() {
                messages = queue.not_empty.wait(messages).unwrap();
            }
            messages.pop_front().unwrap()
        };

        match message {
            None => break,
            Some(task) => {
                task.run();
                if super::is_last_worker() {
                    break;
                }
            }
        }
    }
}
