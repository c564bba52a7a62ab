// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fixed_clock_advances() {
    let clock = FixedClock::new(1_000);
    assert_eq!(clock.epoch_ms(), 1_000);
    clock.advance_ms(500);
    assert_eq!(clock.epoch_ms(), 1_500);
    clock.advance_secs(2);
    assert_eq!(clock.epoch_ms(), 3_500);
}

#[test]
fn rfc3339_roundtrip() {
    let clock = FixedClock::new(1_700_000_000_000);
    let rendered = clock.now_rfc3339();
    let parsed = parse_rfc3339(&rendered).unwrap();
    assert_eq!(parsed.timestamp_millis(), 1_700_000_000_000);
}

#[test]
fn rfc3339_strings_sort_chronologically() {
    let a = FixedClock::new(1_000_000).now_rfc3339();
    let b = FixedClock::new(2_000_000).now_rfc3339();
    assert!(a < b);
}

#[test]
fn parse_rejects_garbage() {
    assert!(parse_rfc3339("not a timestamp").is_none());
}

#[test]
fn system_clock_is_monotone_enough() {
    let clock = SystemClock;
    let a = clock.epoch_ms();
    let b = clock.epoch_ms();
    assert!(b >= a);
}
