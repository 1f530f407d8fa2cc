//! Request-rate accounting.
//!
//! [`RequestStats`] answers "how many requests finished in the last
//! second?" without making the workers contend on anything. Each worker
//! owns one cache-line-aligned record of ten 100 ms slots arranged in a
//! ring; finishing a request touches only the owner's record, and the
//! stats reader walks all records lock-free.
//!
//! Readers racing a writer can observe a slot just before it is bumped
//! and undercount; overcounting is impossible because a slot is always
//! zeroed before it is reused for a new 100 ms window.

pub mod ticks;

use ticks::{Ticks, TICKS_PER_SECOND};

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Number of slots one second is divided into.
const NUM_SLOTS: usize = 10;

/// Width of one slot, in ticks.
const TICKS_PER_SLOT: u64 = TICKS_PER_SECOND / NUM_SLOTS as u64;

/// One worker's rolling window. Aligned to a cache line so neighboring
/// workers never share one.
#[repr(align(64))]
struct Counts {
    /// The "now" slot in the ring.
    base_pos: AtomicU32,

    /// Tick at which the "now" slot started.
    base_tick: AtomicU64,

    /// Per-slot request counts.
    val: [AtomicU32; NUM_SLOTS],
}

impl Counts {
    fn new() -> Self {
        Self {
            base_pos: AtomicU32::new(0),
            base_tick: AtomicU64::new(0),
            val: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }
}

/// Per-worker rolling requests-per-second counters. See the
/// [module docs](self).
pub struct RequestStats {
    counts: Box<[Counts]>,
}

impl RequestStats {
    /// One record per worker; workers identify themselves with
    /// [`crate::pool::me`].
    pub fn new(num_workers: usize) -> Self {
        Self {
            counts: (0..num_workers).map(|_| Counts::new()).collect(),
        }
    }

    /// Records that worker `worker` finished one request at `now`.
    ///
    /// Must only be called by that worker; this is what makes the
    /// relaxed single-writer updates sound.
    ///
    /// # Panics
    ///
    /// Panics when `worker` is out of range.
    pub fn finished_request(&self, worker: usize, now: Ticks) {
        let counts = &self.counts[worker];
        let base_tick = counts.base_tick.load(Ordering::Relaxed);

        // Did at least one slot expire since this worker's last
        // request?
        if now > base_tick + TICKS_PER_SLOT {
            let new_pos = pos_for_tick(now);

            if base_tick + TICKS_PER_SECOND < now {
                // Idle for over a second: the whole window is stale.
                for slot in &counts.val {
                    slot.store(0, Ordering::Relaxed);
                }
            } else {
                // Zero only the slots skipped between the previous
                // request and this one, ring-wise.
                let mut pos = counts.base_pos.load(Ordering::Relaxed);
                loop {
                    pos = inc_pos(pos);
                    counts.val[pos as usize].store(0, Ordering::Relaxed);
                    if pos == new_pos {
                        break;
                    }
                }
            }

            counts.base_pos.store(new_pos, Ordering::Relaxed);
            counts.base_tick.store(round_tick(now), Ordering::Relaxed);
        }

        let pos = counts.base_pos.load(Ordering::Relaxed) as usize;
        counts.val[pos].fetch_add(1, Ordering::Relaxed);
    }

    /// Requests finished across all workers in the second ending at
    /// `now`. Lock-free; may undercount under concurrent updates,
    /// never overcounts.
    pub fn reqs_last_sec(&self, now: Ticks) -> u32 {
        let mut acc = 0u32;

        for counts in self.counts.iter() {
            let base_tick = counts.base_tick.load(Ordering::Relaxed);

            // A worker idle for more than a second contributes
            // nothing; its whole window predates the second we report.
            if now.saturating_sub(base_tick) > TICKS_PER_SECOND {
                continue;
            }

            // pos_for_tick(now - 1s) == pos_for_tick(now): walk the
            // ring from just after "one second ago" up to the
            // worker's current slot.
            let base_pos = counts.base_pos.load(Ordering::Relaxed);
            let mut pos = pos_for_tick(now);
            loop {
                pos = inc_pos(pos);
                acc += counts.val[pos as usize].load(Ordering::Relaxed);
                if pos == base_pos {
                    break;
                }
            }
        }

        acc
    }

    /// Number of per-worker records.
    pub fn num_workers(&self) -> usize {
        self.counts.len()
    }
}

/// The next ring position after `pos`.
fn inc_pos(pos: u32) -> u32 {
    (pos + 1) % NUM_SLOTS as u32
}

/// The ring position a request arriving at tick `t` belongs to.
fn pos_for_tick(t: Ticks) -> u32 {
    (t / TICKS_PER_SLOT % NUM_SLOTS as u64) as u32
}

/// Rounds `t` down to the start of its slot.
fn round_tick(t: Ticks) -> Ticks {
    t - (t % TICKS_PER_SLOT)
}
