// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_past_the_epoch_and_monotonic_enough() {
    let clock = SystemClock;
    let first = clock.epoch_ms();
    let second = clock.epoch_ms();
    // Sometime after 2020; wall clocks can step but not to zero.
    assert!(first > 1_577_836_800_000);
    assert!(second >= first);
}

#[test]
fn fake_clock_starts_fixed_and_advances() {
    let clock = FakeClock::new();
    assert_eq!(clock.epoch_ms(), 1_000_000);

    clock.advance(Duration::from_millis(250));
    assert_eq!(clock.epoch_ms(), 1_000_250);
    clock.advance(Duration::from_secs(2));
    assert_eq!(clock.epoch_ms(), 1_002_250);
}

#[test]
fn fake_clock_can_be_set() {
    let clock = FakeClock::default();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let observer = clock.clone();
    clock.advance(Duration::from_millis(10));
    assert_eq!(observer.epoch_ms(), 1_000_010);
}
