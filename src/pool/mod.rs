//! Worker thread pools.
//!
//! Two pools satisfy the same small contract. [`FastPool`] keeps a list
//! of idle workers and delivers each task straight into one worker's
//! mailbox, so under light load there is no contention on a shared
//! queue and no condvar broadcast on dispatch. [`SimplePool`] is the
//! baseline: one shared queue that every worker drains.
//!
//! Workers carry a stable integer id, readable from inside a task via
//! [`me`]; the request-rate stats rely on it to keep one counter record
//! per worker.

mod fast;
mod simple;

pub use fast::FastPool;
pub use simple::SimplePool;

use crate::task::Task;

use std::cell::Cell;

/// Common surface of the worker pools.
pub trait ThreadPool: Send + Sync {
    /// Schedules a task; runs on some worker, in submission order per
    /// queue.
    fn add_task(&self, task: Task);

    /// Stops every worker and joins it. May be called from inside a
    /// worker; in that case the calling worker exits right after the
    /// task that issued the stop returns.
    fn stop(&self);

    /// Number of tasks queued but not yet picked up.
    fn count(&self) -> usize;
}

thread_local! {
    static WORKER_ID: Cell<usize> = const { Cell::new(usize::MAX) };

    /// Set on the worker that ran `stop()` so it can exit without
    /// being joined.
    static LAST_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// The id of the worker the caller is running on.
///
/// Returns `usize::MAX` outside of a pool worker.
pub fn me() -> usize {
    WORKER_ID.with(|id| id.get())
}

/// Overrides the calling thread's worker id. Test helper.
pub fn set_me_for_test(id: usize) {
    WORKER_ID.with(|cell| cell.set(id));
}

fn set_worker_id(id: usize) {
    WORKER_ID.with(|cell| cell.set(id));
}

fn is_last_worker() -> bool {
    LAST_WORKER.with(|flag| flag.get())
}

fn mark_last_worker() {
    LAST_WORKER.with(|flag| flag.set(true));
}
