// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction tests.

use super::*;

#[test]
fn fake_clock_advances_by_exact_duration() {
    let clock = FakeClock::new(1_000);
    clock.advance(Duration::from_secs(60));
    assert_eq!(clock.now_unix(), 1_060);
}

#[test]
fn fake_clock_set_overrides_current_value() {
    let clock = FakeClock::new(1_000);
    clock.set(5_000);
    assert_eq!(clock.now_unix(), 5_000);
}

#[test]
fn system_clock_now_unix_is_plausible() {
    let now = SystemClock.now_unix();
    // Any time after 2024-01-01; guards against an obviously broken clock.
    assert!(now > 1_700_000_000);
}
