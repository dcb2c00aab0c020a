// ── Engine: Clock / Slot Math (spec §4.B) ──────────────────────────────────
// A process-wide timezone name is bound at startup. `now()` returns a naive
// local-time instant in that zone; all scheduling math uses this. Storage
// uses UTC (`Clock::now_utc`) and converts at the slot-math boundary, which
// spec §9's Open Questions note is behaviorally equivalent to storing naive
// local time provided every read/write agrees — this implementation always
// converts through `Clock`, so it does.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Five 12-minute buckets per hour, numbered 1..5 (spec §4.B's literal
/// formula). Only equality of `(hour, slot)` pairs is ever compared, so the
/// 1-indexing (vs. the original implementation's 0-indexed `minute // 12`)
/// is an arbitrary but harmless choice as long as it is applied consistently.
pub fn slot_of_minute(minute: u32) -> u32 {
    minute / 12 + 1
}

#[derive(Debug, Clone)]
pub struct Clock {
    tz: Tz,
}

impl Clock {
    pub fn new(tz_name: &str) -> Self {
        let tz: Tz = tz_name.parse().unwrap_or(chrono_tz::Asia::Shanghai);
        Clock { tz }
    }

    /// Current instant, as naive local time in the configured zone.
    pub fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }

    /// Current instant in UTC — used for storage.
    pub fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Convert a stored UTC instant to local time in the configured zone.
    pub fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.with_timezone(&self.tz).naive_local()
    }

    /// `(hour, slot)` for a local instant.
    pub fn hour_slot(local: NaiveDateTime) -> (u32, u32) {
        use chrono::Timelike;
        (local.hour(), slot_of_minute(local.minute()))
    }

    /// Midnight-to-midnight local calendar day containing `local`, as a
    /// `NaiveDate`. Used as the boundary for "today" comparisons.
    pub fn local_date(local: NaiveDateTime) -> chrono::NaiveDate {
        local.date()
    }

    /// UTC instant `n` local days ago from `local`, converted back to UTC
    /// for a store-level range query.
    pub fn days_ago_utc(&self, local: NaiveDateTime, days: i64) -> DateTime<Utc> {
        let cutoff_local = local - chrono::Duration::days(days);
        self.local_to_utc(cutoff_local)
    }

    /// `[start, end)` UTC bounds of the local calendar day `date`, for
    /// "today" range queries against the (timezone-agnostic) store.
    pub fn day_bounds_utc(&self, date: chrono::NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let start_local = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
        let end_local = start_local + chrono::Duration::days(1);
        (self.local_to_utc(start_local), self.local_to_utc(end_local))
    }

    fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        self.tz
            .from_local_datetime(&local)
            .single()
            .unwrap_or_else(|| self.tz.from_utc_datetime(&local))
            .with_timezone(&Utc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn slot_buckets_are_five_per_hour() {
        assert_eq!(slot_of_minute(0), 1);
        assert_eq!(slot_of_minute(6), 1);
        assert_eq!(slot_of_minute(11), 1);
        assert_eq!(slot_of_minute(12), 2);
        assert_eq!(slot_of_minute(59), 5);
    }

    #[test]
    fn slot_equality_example_from_spec_s4() {
        // "slot(04:06)=1, slot(04:07)=1" — scenario S4.
        assert_eq!(slot_of_minute(6), slot_of_minute(7));
    }

    #[test]
    fn hour_slot_pairs() {
        let dt = NaiveDate::from_ymd_opt(2026, 8, 1)
            .unwrap()
            .and_hms_opt(4, 7, 0)
            .unwrap();
        assert_eq!(Clock::hour_slot(dt), (4, 1));
    }

    #[test]
    fn day_bounds_span_exactly_24_hours() {
        let clock = Clock::new("Asia/Shanghai");
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        let (start, end) = clock.day_bounds_utc(date);
        assert_eq!((end - start).num_hours(), 24);
    }

    #[test]
    fn unknown_timezone_falls_back() {
        let clock = Clock::new("Not/ARealZone");
        // Should not panic; produces a valid instant.
        let _ = clock.now();
    }
}
