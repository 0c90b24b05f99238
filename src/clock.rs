//! Time source for the sync engine.
//!
//! The engine never reads the system clock directly: scheduling math needs a
//! stable "now" and a time zone for calendar-day boundaries, and tests need to
//! pin both.

use chrono::{DateTime, Duration, FixedOffset, Local};
use std::sync::{Mutex, PoisonError};

pub trait Clock: Send + Sync {
    /// Current instant; the offset is the zone calendar days are counted in.
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock in the machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock pinned to an epoch-millisecond instant in UTC.
    pub fn at_millis(millis: i64) -> Self {
        let now = DateTime::from_timestamp_millis(millis)
            .unwrap_or_default()
            .fixed_offset();
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
