//! Tick values are injected directly, so these tests are timing-free.

use statio::stats::ticks::TICKS_PER_SECOND;
use statio::stats::RequestStats;

/// Width of one of the ten slots.
const SLOT: u64 = TICKS_PER_SECOND / 10;

#[test]
fn one_completion_is_visible_immediately() {
    let stats = RequestStats::new(1);

    let t = 5 * SLOT;
    stats.finished_request(0, t);

    assert_eq!(stats.reqs_last_sec(t + 1), 1);
    assert_eq!(stats.reqs_last_sec(t + SLOT), 1);
}

#[test]
fn one_completion_expires_after_a_second() {
    let stats = RequestStats::new(1);

    let t = 5 * SLOT;
    stats.finished_request(0, t);

    // Still in the window right at the boundary...
    assert_eq!(stats.reqs_last_sec(t + TICKS_PER_SECOND), 1);
    // ...gone one tick past it.
    assert_eq!(stats.reqs_last_sec(t + TICKS_PER_SECOND + 1), 0);
}

#[test]
fn completions_within_one_second_accumulate() {
    let stats = RequestStats::new(1);

    stats.finished_request(0, 2 * SLOT);
    stats.finished_request(0, 2 * SLOT + 100);
    stats.finished_request(0, 7 * SLOT);

    assert_eq!(stats.reqs_last_sec(7 * SLOT + 1), 3);
}

#[test]
fn old_slots_roll_out_of_the_window() {
    let stats = RequestStats::new(1);

    stats.finished_request(0, 2 * SLOT);
    stats.finished_request(0, 7 * SLOT);

    // A read 1s past the first completion sees only the second.
    assert_eq!(stats.reqs_last_sec(12 * SLOT + 1), 1);
}

#[test]
fn a_long_gap_zeroes_the_whole_window() {
    let stats = RequestStats::new(1);

    stats.finished_request(0, SLOT + 1);
    // More than a second later: the stale slots must not leak into
    // the new window.
    stats.finished_request(0, 14 * SLOT);

    assert_eq!(stats.reqs_last_sec(14 * SLOT + 1), 1);
}

#[test]
fn counts_never_exceed_the_last_second() {
    let stats = RequestStats::new(1);

    // Spread 30 completions over three seconds.
    for burst in 0..3u64 {
        for i in 0..10u64 {
            stats.finished_request(0, burst * TICKS_PER_SECOND + i * SLOT + burst + 1);
        }
    }

    let now = 2 * TICKS_PER_SECOND + 9 * SLOT + 10;
    assert!(stats.reqs_last_sec(now) <= 10);
}

#[test]
fn workers_are_summed() {
    let stats = RequestStats::new(3);

    let t = 4 * SLOT;
    stats.finished_request(0, t);
    stats.finished_request(1, t + 10);
    stats.finished_request(2, t + 20);

    assert_eq!(stats.reqs_last_sec(t + SLOT), 3);
}

#[test]
fn idle_workers_contribute_nothing() {
    let stats = RequestStats::new(4);

    stats.finished_request(2, 3 * SLOT);
    assert_eq!(stats.reqs_last_sec(3 * SLOT + 1), 1);
}

#[test]
#[should_panic]
fn out_of_range_worker_is_fatal() {
    let stats = RequestStats::new(2);
    stats.finished_request(2, SLOT);
}
