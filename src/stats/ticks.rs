//! Monotonic tick source.
//!
//! Ticks are nanoseconds on a process-local monotonic clock; every
//! timestamped subsystem (timers, request stats) counts in them so a
//! tick value can be banked, compared and binned without conversions.

use std::sync::OnceLock;
use std::time::Instant;

/// A point on the process-local monotonic clock.
pub type Ticks = u64;

/// Number of ticks in one second.
pub const TICKS_PER_SECOND: u64 = 1_000_000_000;

static START: OnceLock<Instant> = OnceLock::new();

/// Current tick count. The origin is the first call in the process.
pub fn now() -> Ticks {
    START.get_or_init(Instant::now).elapsed().as_nanos() as Ticks
}
