// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction.
//!
//! All time in the coordinator flows through a [`Clock`] so that TTL sweeps,
//! checkpoint debouncing, and duration accounting are testable without
//! sleeping. Timestamps persist as RFC 3339 UTC strings, which sort
//! lexicographically in the store.

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// Current instant as a UTC datetime.
    fn now(&self) -> DateTime<Utc> {
        match Utc.timestamp_millis_opt(self.epoch_ms() as i64) {
            chrono::LocalResult::Single(dt) => dt,
            _ => Utc::now(),
        }
    }

    /// Current instant rendered as RFC 3339 (storage format).
    fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339()
    }
}

/// Wall-clock time for production use.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Manually advanced clock for tests.
#[cfg(any(test, feature = "test-support"))]
pub struct FixedClock(std::sync::atomic::AtomicU64);

#[cfg(any(test, feature = "test-support"))]
impl FixedClock {
    pub fn new(epoch_ms: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(epoch_ms))
    }

    /// Move the clock forward.
    pub fn advance_ms(&self, ms: u64) {
        self.0.fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs * 1000);
    }

    pub fn set(&self, epoch_ms: u64) {
        self.0.store(epoch_ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FixedClock {
    fn epoch_ms(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Parse a stored RFC 3339 timestamp back into a datetime.
///
/// Returns `None` for values written by hand or corrupted rows.
pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
