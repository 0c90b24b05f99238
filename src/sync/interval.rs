//! Adaptive fetch scheduling.
//!
//! Entries are checked about as often as they historically change. The
//! cadence is inferred from upload dates (falling back to local fetch dates),
//! and a quiet entry gets its effective interval doubled the longer it stays
//! quiet.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};

use crate::media::{Entry, LibraryItem};

/// Half-open `[start, end)` range of epoch ms in which an entry counts as due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: i64,
    pub end: i64,
}

impl FetchWindow {
    pub fn contains(&self, at: i64) -> bool {
        self.start <= at && at < self.end
    }
}

/// New values for an entry's interval and next due time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSchedule {
    pub interval: i32,
    pub next_update: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchIntervalEstimator;

impl FetchIntervalEstimator {
    pub const MAX_INTERVAL: i32 = 28;
    pub const DEFAULT_INTERVAL: i32 = 7;
    pub const GRACE_DAYS: i64 = 1;
    /// Distinct days of history considered
    pub const HISTORY_DAYS: usize = 10;
    /// Elapsed cycles after which the effective interval doubles
    pub const DOUBLE_AFTER_CYCLES: i64 = 10;
    /// Longest user-pinned interval honored, in days
    pub const MAX_OVERRIDE: i32 = u16::MAX as i32;

    /// Today in `now`'s zone, widened by the grace period on both sides.
    pub fn window(&self, now: DateTime<FixedOffset>) -> FetchWindow {
        let today = start_of_day(now);
        FetchWindow {
            start: (today - Duration::days(Self::GRACE_DAYS)).timestamp_millis(),
            end: (today + Duration::days(1 + Self::GRACE_DAYS)).timestamp_millis(),
        }
    }

    /// Cadence in days, clamped to `[1, MAX_INTERVAL]`.
    pub fn estimate_interval<I: LibraryItem>(&self, items: &[I], tz: FixedOffset) -> i32 {
        let uploads = recent_days(items.iter().map(|i| i.core().date_upload), tz);
        let fetches = recent_days(items.iter().map(|i| i.core().date_fetch), tz);

        let interval = span_interval(&uploads)
            .or_else(|| span_interval(&fetches))
            .unwrap_or(Self::DEFAULT_INTERVAL);
        interval.clamp(1, Self::MAX_INTERVAL)
    }

    /// Next due time for `entry` given `interval`, or `None` when neither the
    /// stored interval nor the stored due time would change.
    pub fn compute_next_update(
        &self,
        entry: &Entry,
        interval: i32,
        now: DateTime<FixedOffset>,
        window: FetchWindow,
    ) -> Option<FetchSchedule> {
        let next_update = if entry.fetch_interval != 0 && window.contains(entry.next_update) {
            entry.next_update
        } else {
            let changed_at = DateTime::from_timestamp_millis(entry.last_update)
                .filter(|_| entry.last_update > 0)
                .map(|at| at.with_timezone(now.offset()))
                .unwrap_or(now);
            let last_day = start_of_day(changed_at);
            let days_elapsed = (now - last_day).num_days().max(0);

            let effective = if interval < 0 {
                interval.saturating_abs().min(Self::MAX_OVERRIDE)
            } else {
                Self::stretched(interval, days_elapsed)
            };
            let effective = i64::from(effective.max(1));
            let cycle = days_elapsed / effective;
            (last_day + Duration::days((cycle + 1) * effective)).timestamp_millis()
        };

        if next_update == entry.next_update && interval == entry.fetch_interval {
            return None;
        }
        Some(FetchSchedule {
            interval,
            next_update,
        })
    }

    /// Full bookkeeping pass: infer the interval (unless overridden) and
    /// derive the next due time.
    pub fn schedule<I: LibraryItem>(
        &self,
        entry: &Entry,
        history: &[I],
        now: DateTime<FixedOffset>,
        window: FetchWindow,
    ) -> Option<FetchSchedule> {
        let interval = if entry.fetch_interval < 0 {
            entry.fetch_interval
        } else {
            self.estimate_interval(history, *now.offset())
        };
        self.compute_next_update(entry, interval, now, window)
    }

    fn stretched(interval: i32, days_elapsed: i64) -> i32 {
        let mut delta = interval.max(1);
        while delta < Self::MAX_INTERVAL && days_elapsed / i64::from(delta) > Self::DOUBLE_AFTER_CYCLES
        {
            delta = (delta * 2).min(Self::MAX_INTERVAL);
        }
        delta
    }
}

fn start_of_day(at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    at.date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(*at.offset())
        .single()
        .unwrap_or(at)
}

/// Most recent distinct calendar days among positive timestamps, newest first.
fn recent_days(stamps: impl Iterator<Item = i64>, tz: FixedOffset) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = stamps
        .filter(|&ms| ms > 0)
        .filter_map(DateTime::from_timestamp_millis)
        .map(|at| at.with_timezone(&tz).date_naive())
        .collect();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();
    days.truncate(FetchIntervalEstimator::HISTORY_DAYS);
    days
}

fn span_interval(days: &[NaiveDate]) -> Option<i32> {
    if days.len() < 3 {
        return None;
    }
    let span = (days[0] - days[days.len() - 1]).num_days();
    let periods = (days.len() - 1) as i64;
    Some(i32::try_from(span / periods).unwrap_or(i32::MAX))
}
