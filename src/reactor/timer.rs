use crate::stats::ticks::Ticks;
use crate::task::Task;

use std::collections::BTreeMap;

/// Deadline-ordered timer queue.
///
/// Entries with equal deadlines keep their insertion order: the key is
/// `(deadline, sequence)`, so the map's natural order is the required
/// stable tie-break.
pub(crate) struct TimerQueue {
    entries: BTreeMap<(Ticks, u64), Task>,
    seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            seq: 0,
        }
    }

    pub(crate) fn insert(&mut self, deadline: Ticks, task: Task) {
        let key = (deadline, self.seq);
        self.seq += 1;
        self.entries.insert(key, task);
    }

    /// Removes and returns the earliest entry whose deadline is at or
    /// before `now`.
    pub(crate) fn pop_expired(&mut self, now: Ticks) -> Option<Task> {
        let (&key, _) = self.entries.first_key_value()?;
        if key.0 > now {
            return None;
        }
        self.entries.remove(&key)
    }
}
