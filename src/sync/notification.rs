use std::sync::{Condvar, Mutex};

/// One-shot completion latch.
///
/// A caller parks on [`wait`](Self::wait) until some other thread calls
/// [`notify`](Self::notify). Once notified, the latch stays open:
/// every subsequent wait returns immediately. The synchronous client
/// wrappers use this to turn a callback into a blocking call.
pub struct Notification {
    notified: Mutex<bool>,
    cv: Condvar,
}

impl Notification {
    pub fn new() -> Self {
        Self {
            notified: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Opens the latch and wakes every waiter.
    pub fn notify(&self) {
        let mut notified = self.notified.lock().unwrap();
        *notified = true;
        self.cv.notify_all();
    }

    /// Blocks until the latch opens.
    pub fn wait(&self) {
        let mut notified = self.notified.lock().unwrap();
        while !*notified {
            notified = self.cv.wait(notified).unwrap();
        }
    }

    /// True once [`notify`](Self::notify) has been called.
    pub fn notified(&self) -> bool {
        *self.notified.lock().unwrap()
    }
}

impl Default for Notification {
    fn default() -> Self {
        Self::new()
    }
}
