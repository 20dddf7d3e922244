// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Time precision and file-id (`fid`) arithmetic.
//!
//! "Now" can be frozen via a thread-local override so retention-planner
//! tests don't race real wall-clock time.

use std::cell::Cell;

thread_local! {
    static FROZEN_NOW: Cell<Option<i64>> = const { Cell::new(None) };
}

/// Overrides "now" (in the configured precision's ticks) for the current thread.
/// Pass `None` to resume using the real wall clock.
pub fn set_now_for_test(ticks: Option<i64>) {
    FROZEN_NOW.with(|cell| cell.set(ticks));
}

/// The tick precision time-series keys are stored in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimePrecision {
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TimePrecision {
    /// Number of ticks in one day at this precision.
    #[must_use]
    pub const fn ticks_per_day(self) -> i64 {
        match self {
            Self::Milliseconds => 86_400_000,
            Self::Microseconds => 86_400_000_000,
            Self::Nanoseconds => 86_400_000_000_000,
        }
    }

    /// Returns the current wall-clock time in this precision's ticks.
    ///
    /// Honors [`set_now_for_test`] when set, for deterministic retention tests.
    #[must_use]
    pub fn now(self) -> i64 {
        if let Some(frozen) = FROZEN_NOW.with(Cell::get) {
            return frozen;
        }

        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        match self {
            Self::Milliseconds => elapsed.as_millis() as i64,
            Self::Microseconds => elapsed.as_micros() as i64,
            Self::Nanoseconds => elapsed.as_nanos() as i64,
        }
    }
}

/// Computes `fid = key / (days_per_file * ticks_per_day(precision))`.
///
/// File-ids are half-open partitions of the key space; negative keys map to
/// file-ids below zero via floor division, so a key's fid is always the
/// partition that actually contains it.
#[must_use]
pub fn fid_of(key: i64, days_per_file: u16, precision: TimePrecision) -> i64 {
    let span = file_span(days_per_file, precision);
    key.div_euclid(span)
}

/// Ticks spanned by a single file-id at this `(days_per_file, precision)`.
#[must_use]
pub fn file_span(days_per_file: u16, precision: TimePrecision) -> i64 {
    i64::from(days_per_file) * precision.ticks_per_day()
}

/// Returns the half-open `[min_key, max_key]` range covered by `fid`.
#[must_use]
pub fn fid_key_range(fid: i64, days_per_file: u16, precision: TimePrecision) -> (i64, i64) {
    let span = file_span(days_per_file, precision);
    let min_key = fid * span;
    let max_key = min_key + span - 1;
    (min_key, max_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn fid_of_single_day_ms() {
        assert_eq!(0, fid_of(0, 1, TimePrecision::Milliseconds));
        assert_eq!(0, fid_of(86_399_000, 1, TimePrecision::Milliseconds));
        assert_eq!(1, fid_of(86_400_001, 1, TimePrecision::Milliseconds));
    }

    #[test]
    fn fid_key_range_matches_fid_of() {
        let days_per_file = 1;
        let precision = TimePrecision::Milliseconds;

        for fid in -2..=3 {
            let (min_key, max_key) = fid_key_range(fid, days_per_file, precision);
            assert_eq!(fid, fid_of(min_key, days_per_file, precision));
            assert_eq!(fid, fid_of(max_key, days_per_file, precision));
        }
    }

    #[test]
    fn ticks_per_day_scale() {
        assert_eq!(
            TimePrecision::Microseconds.ticks_per_day(),
            TimePrecision::Milliseconds.ticks_per_day() * 1_000
        );
        assert_eq!(
            TimePrecision::Nanoseconds.ticks_per_day(),
            TimePrecision::Milliseconds.ticks_per_day() * 1_000_000
        );
    }

    #[test]
    fn now_can_be_frozen_for_tests() {
        set_now_for_test(Some(12345));
        assert_eq!(12345, TimePrecision::Milliseconds.now());
        set_now_for_test(None);
        assert!(TimePrecision::Milliseconds.now() > 12345);
    }
}
