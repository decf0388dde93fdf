// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A clock that provides the current wall-clock time.
///
/// Abstracted so the cron scheduler and staleness scanner can be driven by a
/// [`FakeClock`] in tests instead of waiting on real time.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Seconds since the Unix epoch, UTC.
    fn now_unix(&self) -> u64;

    /// The current instant as a [`chrono::DateTime<Utc>`], used by the cron
    /// expression evaluator to read wall-clock fields in the local timezone.
    fn now_local(&self) -> chrono::DateTime<chrono::Local> {
        chrono::DateTime::from_timestamp(self.now_unix() as i64, 0)
            .unwrap_or_default()
            .with_timezone(&chrono::Local)
    }
}

/// Real system clock.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
    }
}

/// Fake clock for testing with controllable time.
#[derive(Clone)]
pub struct FakeClock {
    epoch_secs: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new(epoch_secs: u64) -> Self {
        Self { epoch_secs: Arc::new(Mutex::new(epoch_secs)) }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.epoch_secs.lock() += duration.as_secs();
    }

    /// Set the clock to a specific Unix timestamp.
    pub fn set(&self, epoch_secs: u64) {
        *self.epoch_secs.lock() = epoch_secs;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        // 2025-01-01T00:00:00Z
        Self::new(1_735_689_600)
    }
}

impl Clock for FakeClock {
    fn now_unix(&self) -> u64 {
        *self.epoch_secs.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
