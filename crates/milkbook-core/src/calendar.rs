//! # Billing Calendar
//!
//! Local-time day bucketing for deliveries, prices and statements.
//!
//! ## Why Not UTC?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operator in Pune saves "today's deliveries" at 01:30 IST on 5 March    │
//! │                                                                         │
//! │     01:30 IST (+05:30)  ==  20:00 UTC on 4 March                        │
//! │                                                                         │
//! │  UTC bucketing   → delivery lands on 4 March   ❌ wrong bill line       │
//! │  Local bucketing → delivery lands on 5 March   ✅ what the operator saw  │
//! │                                                                         │
//! │  Every day boundary in MilkBook goes through BillingCalendar, which    │
//! │  carries an explicit offset instead of reading the host timezone.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The offset is fixed (no DST), so every local day is exactly 24 hours.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime,
    Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::DEFAULT_UTC_OFFSET_MINUTES;

// =============================================================================
// Billing Calendar
// =============================================================================

/// Maps instants to the distributor's local calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingCalendar {
    offset: FixedOffset,
}

impl BillingCalendar {
    /// Creates a calendar for the given UTC offset.
    pub fn new(offset: FixedOffset) -> Self {
        BillingCalendar { offset }
    }

    /// Creates a calendar from an offset in minutes east of UTC.
    ///
    /// ## Example
    /// ```rust
    /// use milkbook_core::BillingCalendar;
    ///
    /// let ist = BillingCalendar::from_offset_minutes(330).unwrap();
    /// assert_eq!(ist.offset_minutes(), 330);
    /// assert!(BillingCalendar::from_offset_minutes(24 * 60).is_err());
    /// ```
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, ValidationError> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(BillingCalendar::new)
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "utc_offset_minutes".to_string(),
                min: -(24 * 60 - 1),
                max: 24 * 60 - 1,
            })
    }

    /// UTC calendar (tests and servers that store local midnight as UTC).
    pub fn utc() -> Self {
        BillingCalendar::new(Utc.fix())
    }

    /// Offset in minutes east of UTC.
    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }

    /// Calendar day of `instant` in local time.
    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Local midnight of `day`, as a UTC instant.
    ///
    /// Delivery dates are normalised to this value when written.
    pub fn local_midnight(&self, day: NaiveDate) -> DateTime<Utc> {
        self.local_to_utc(day.and_time(NaiveTime::MIN))
    }

    /// First instant of the local day (inclusive).
    pub fn start_of_day(&self, day: NaiveDate) -> DateTime<Utc> {
        self.local_midnight(day)
    }

    /// Last millisecond of the local day (inclusive).
    pub fn end_of_day(&self, day: NaiveDate) -> DateTime<Utc> {
        self.local_midnight(day) + Duration::days(1) - Duration::milliseconds(1)
    }

    /// Checks if `instant` falls within the local day `day`.
    ///
    /// Equivalent to `start_of_day(day) <= instant <= end_of_day(day)` for
    /// millisecond-precision instants.
    pub fn contains(&self, day: NaiveDate, instant: DateTime<Utc>) -> bool {
        self.day_of(instant) == day
    }

    fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let shift = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&(local - shift))
    }

    // =========================================================================
    // Timestamp Parsing
    // =========================================================================

    /// Parses a stored timestamp strictly.
    ///
    /// ## Accepted Forms
    /// ```text
    /// 2024-03-05T00:00:00+05:30        RFC 3339
    /// 2024-03-05 00:00:00.123+00:00    SQLite / sqlx text encoding
    /// 2024-03-05 06:15:00              naive → local time
    /// 2024-03-05                       bare date → local midnight
    /// 1709577000000                    epoch milliseconds
    /// ```
    pub fn parse_timestamp(&self, raw: &str) -> CoreResult<DateTime<Utc>> {
        let value = raw.trim();
        let malformed = || CoreError::malformed_timestamp("timestamp", raw);

        if value.is_empty() {
            return Err(malformed());
        }

        if value.chars().all(|c| c.is_ascii_digit() || c == '-') && !value.contains("--") {
            if let Ok(millis) = value.parse::<i64>() {
                return Utc.timestamp_millis_opt(millis).single().ok_or_else(malformed);
            }
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(dt.with_timezone(&Utc));
        }

        for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
            if let Ok(dt) = DateTime::parse_from_str(value, format) {
                return Ok(dt.with_timezone(&Utc));
            }
        }

        for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(self.local_to_utc(naive));
            }
        }

        if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(self.local_midnight(day));
        }

        Err(malformed())
    }

    /// Parses a stored timestamp, substituting `fallback` when malformed.
    ///
    /// One bad historical record must not block a whole statement, so the
    /// error is logged and swallowed here.
    pub fn recover_timestamp(
        &self,
        raw: &str,
        fallback: DateTime<Utc>,
        field: &str,
        record_id: &str,
    ) -> DateTime<Utc> {
        match self.parse_timestamp(raw) {
            Ok(instant) => instant,
            Err(_) => {
                warn!(
                    field = %field,
                    record_id = %record_id,
                    raw = %raw,
                    fallback = %fallback,
                    "Malformed timestamp, substituting default"
                );
                fallback
            }
        }
    }

    /// Optional variant of [`recover_timestamp`](Self::recover_timestamp):
    /// a missing value stays missing.
    pub fn recover_optional_timestamp(
        &self,
        raw: Option<&str>,
        fallback: DateTime<Utc>,
        field: &str,
        record_id: &str,
    ) -> Option<DateTime<Utc>> {
        raw.filter(|value| !value.trim().is_empty())
            .map(|value| self.recover_timestamp(value, fallback, field, record_id))
    }
}

impl Default for BillingCalendar {
    /// India Standard Time.
    fn default() -> Self {
        BillingCalendar::from_offset_minutes(DEFAULT_UTC_OFFSET_MINUTES)
            .unwrap_or_else(|_| BillingCalendar::utc())
    }
}

// =============================================================================
// Billing Month
// =============================================================================

/// A calendar month that statements are produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BillingMonth {
    #[ts(as = "String")]
    first_day: NaiveDate,
}

impl BillingMonth {
    /// Creates a billing month.
    pub fn new(year: i32, month: u32) -> Result<Self, ValidationError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first_day| BillingMonth { first_day })
            .ok_or_else(|| ValidationError::OutOfRange {
                field: "month".to_string(),
                min: 1,
                max: 12,
            })
    }

    /// The month containing `day`.
    pub fn containing(day: NaiveDate) -> Self {
        BillingMonth {
            first_day: day.with_day0(0).unwrap_or(day),
        }
    }

    /// Parses `YYYY-MM` (the value of an HTML month input).
    ///
    /// ## Example
    /// ```rust
    /// use milkbook_core::BillingMonth;
    ///
    /// let march = BillingMonth::parse("2024-03").unwrap();
    /// assert_eq!(march.to_string(), "March 2024");
    /// assert!(BillingMonth::parse("2024-13").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidFormat {
            field: "month".to_string(),
            reason: "expected YYYY-MM".to_string(),
        };
        let (year, month) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        BillingMonth::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    /// First day of the month (inclusive).
    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    /// Last day of the month (inclusive).
    pub fn last_day(&self) -> NaiveDate {
        self.first_day
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// Checks if `day` falls within `[first_day, last_day]`.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.first_day <= day && day <= self.last_day()
    }

    /// Every day of the month, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last_day();
        self.first_day.iter_days().take_while(move |day| *day <= last)
    }

    /// The following month.
    pub fn next(&self) -> Option<Self> {
        self.first_day
            .checked_add_months(Months::new(1))
            .map(|first_day| BillingMonth { first_day })
    }

    /// The preceding month.
    pub fn previous(&self) -> Option<Self> {
        self.first_day
            .checked_sub_months(Months::new(1))
            .map(|first_day| BillingMonth { first_day })
    }

    /// `YYYY-MM` key, used in cache keys and export file names.
    pub fn key(&self) -> String {
        self.first_day.format("%Y-%m").to_string()
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_day.format("%B %Y"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> BillingCalendar {
        BillingCalendar::from_offset_minutes(330).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_of_uses_local_time() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 4, 20, 0, 0).unwrap();
        assert_eq!(ist().day_of(instant), day(2024, 3, 5));
        assert_eq!(BillingCalendar::utc().day_of(instant), day(2024, 3, 4));
    }

    #[test]
    fn test_local_midnight_and_window() {
        let cal = ist();
        let d = day(2024, 3, 5);
        let start = cal.start_of_day(d);
        let end = cal.end_of_day(d);

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 4, 18, 30, 0).unwrap());
        assert_eq!(end - start, Duration::days(1) - Duration::milliseconds(1));
        assert!(cal.contains(d, start));
        assert!(cal.contains(d, end));
        assert!(!cal.contains(d, end + Duration::milliseconds(1)));
        assert!(!cal.contains(d, start - Duration::milliseconds(1)));
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let cal = ist();
        let midnight = cal.local_midnight(day(2024, 3, 5));

        assert_eq!(cal.parse_timestamp("2024-03-05T00:00:00+05:30").unwrap(), midnight);
        assert_eq!(cal.parse_timestamp("2024-03-04 18:30:00+00:00").unwrap(), midnight);
        assert_eq!(cal.parse_timestamp("2024-03-04 18:30:00.000+00:00").unwrap(), midnight);
        assert_eq!(cal.parse_timestamp("2024-03-05 00:00:00").unwrap(), midnight);
        assert_eq!(cal.parse_timestamp("2024-03-05").unwrap(), midnight);
        assert_eq!(
            cal.parse_timestamp(&midnight.timestamp_millis().to_string()).unwrap(),
            midnight
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let cal = ist();
        assert!(matches!(
            cal.parse_timestamp("not a date"),
            Err(CoreError::MalformedTimestamp { .. })
        ));
        assert!(cal.parse_timestamp("").is_err());
        assert!(cal.parse_timestamp("2024-02-30").is_err());
    }

    #[test]
    fn test_recover_timestamp_substitutes_fallback() {
        let cal = ist();
        let fallback = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(cal.recover_timestamp("garbage", fallback, "date", "d1"), fallback);
        assert_eq!(
            cal.recover_optional_timestamp(None, fallback, "created_at", "d1"),
            None
        );
        assert_eq!(
            cal.recover_optional_timestamp(Some("2024-03-05"), fallback, "created_at", "d1"),
            Some(cal.local_midnight(day(2024, 3, 5)))
        );
    }

    #[test]
    fn test_default_calendar_is_ist() {
        assert_eq!(BillingCalendar::default().offset_minutes(), 330);
    }

    #[test]
    fn test_billing_month_bounds() {
        let feb = BillingMonth::new(2024, 2).unwrap();
        assert_eq!(feb.first_day(), day(2024, 2, 1));
        assert_eq!(feb.last_day(), day(2024, 2, 29));
        assert!(feb.contains(day(2024, 2, 29)));
        assert!(!feb.contains(day(2024, 3, 1)));
        assert_eq!(feb.days().count(), 29);
    }

    #[test]
    fn test_billing_month_navigation() {
        let dec = BillingMonth::new(2023, 12).unwrap();
        assert_eq!(dec.next().unwrap(), BillingMonth::new(2024, 1).unwrap());
        assert_eq!(dec.previous().unwrap(), BillingMonth::new(2023, 11).unwrap());
        assert_eq!(BillingMonth::containing(day(2024, 3, 17)).key(), "2024-03");
        assert!(BillingMonth::new(2024, 0).is_err());
    }
}
