//! # Price Timeline
//!
//! Point-in-time price lookup: "what did a litre of milk type M cost on day D?"
//!
//! ## Containment
//! ```text
//! cow   ├── p1 @ ₹10 ──────────┤├── p2 @ ₹12 ──────────────────────────►
//!       Jan 1            Jan 31 Feb 1                         (open end)
//!
//! price_for(cow, Jan 15) = ₹10
//! price_for(cow, Mar 1)  = ₹12
//! ```
//!
//! A period covers every local calendar day from `day_of(start_date)` to
//! `day_of(end_date)` inclusive; an open end covers every later day.
//!
//! ## Overlap
//! Overlapping periods are a data anomaly the timeline tolerates. When several
//! periods cover a day, the one with the latest `start_date` wins and, if the
//! starts are equal, the lexicographically larger price id wins. On the day a
//! price changes, both the closed and the new period cover the day; the new
//! one wins by start.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::calendar::BillingCalendar;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{MilkType, Price};

// =============================================================================
// Price Period
// =============================================================================

/// A price resolved to local calendar days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricePeriod {
    pub id: String,
    pub milk_type: MilkType,
    pub amount: Money,
    /// Instant the period started (tie-break key).
    pub start: DateTime<Utc>,
    /// Instant the period ended, `None` while current.
    pub end: Option<DateTime<Utc>>,
    /// First covered day.
    pub first_day: NaiveDate,
    /// Last covered day, `None` = open.
    pub last_day: Option<NaiveDate>,
}

impl PricePeriod {
    fn from_price(price: &Price, calendar: &BillingCalendar) -> Self {
        PricePeriod {
            id: price.id.clone(),
            milk_type: price.milk_type,
            amount: price.amount,
            start: price.start_date,
            end: price.end_date,
            first_day: calendar.day_of(price.start_date),
            last_day: price.end_date.map(|end| calendar.day_of(end)),
        }
    }

    /// Checks if this period covers `day`.
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.first_day <= day && self.last_day.map_or(true, |last| day <= last)
    }

    /// Checks if this is the open ("current") period.
    pub fn is_current(&self) -> bool {
        self.end.is_none()
    }

    /// Precedence among periods covering the same day: latest start, then id.
    fn precedence(&self, other: &PricePeriod) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Checks if the two periods share more than a boundary instant.
    ///
    /// Closing one period at `now` and opening the next at `now` is the normal
    /// price change and does not count.
    fn overlaps(&self, other: &PricePeriod) -> bool {
        let self_before_other_ends = other.end.map_or(true, |end| self.start < end);
        let other_before_self_ends = self.end.map_or(true, |end| other.start < end);
        self.milk_type == other.milk_type && self_before_other_ends && other_before_self_ends
    }
}

/// Two periods of the same milk type whose ranges intersect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceOverlap {
    pub milk_type: MilkType,
    /// The period that wins lookups inside the overlap.
    pub winner_id: String,
    pub shadowed_id: String,
}

// =============================================================================
// Price Timeline
// =============================================================================

/// Immutable lookup structure, built once per reporting or write operation.
#[derive(Debug, Clone, Default)]
pub struct PriceTimeline {
    /// Sorted by milk type, then precedence descending, so the first covering
    /// period of a milk type is the winner.
    periods: Vec<PricePeriod>,
}

impl PriceTimeline {
    /// Builds the timeline from every stored price.
    ///
    /// Logs a warning for every overlapping pair and for any milk type with
    /// more than one current period; neither is fatal.
    pub fn build(prices: &[Price], calendar: &BillingCalendar) -> Self {
        let mut periods: Vec<PricePeriod> = prices
            .iter()
            .map(|price| PricePeriod::from_price(price, calendar))
            .collect();
        periods.sort_by(|a, b| a.milk_type.cmp(&b.milk_type).then_with(|| b.precedence(a)));

        let timeline = PriceTimeline { periods };

        for overlap in timeline.overlaps() {
            warn!(
                milk_type = %overlap.milk_type,
                winner = %overlap.winner_id,
                shadowed = %overlap.shadowed_id,
                "Overlapping price periods"
            );
        }

        for milk_type in MilkType::ALL {
            let current = timeline
                .periods_for(milk_type)
                .filter(|p| p.is_current())
                .count();
            if current > 1 {
                warn!(milk_type = %milk_type, count = current, "More than one current price");
            }
        }

        debug!(periods = timeline.periods.len(), "Built price timeline");
        timeline
    }

    /// Price per litre of `milk_type` on `day`, if any period covers it.
    pub fn price_for(&self, milk_type: MilkType, day: NaiveDate) -> Option<Money> {
        self.period_for(milk_type, day).map(|p| p.amount)
    }

    /// The winning period covering `day`.
    pub fn period_for(&self, milk_type: MilkType, day: NaiveDate) -> Option<&PricePeriod> {
        self.periods_for(milk_type).find(|p| p.covers(day))
    }

    /// Reporting lookup: falls back to `fallback` (the delivery's cached
    /// price) when no period covers the day. Never fails.
    pub fn price_or(&self, milk_type: MilkType, day: NaiveDate, fallback: Money) -> Money {
        match self.price_for(milk_type, day) {
            Some(amount) => amount,
            None => {
                debug!(
                    milk_type = %milk_type,
                    day = %day,
                    fallback = %fallback,
                    "No price period covers day, using cached price"
                );
                fallback
            }
        }
    }

    /// Write-path lookup: the milk type must have a current (open) period,
    /// and some period must cover `day`. Either missing is `MissingPrice`.
    pub fn require(&self, milk_type: MilkType, day: NaiveDate) -> CoreResult<Money> {
        if self.current(milk_type).is_none() {
            debug!(milk_type = %milk_type, day = %day, "No current price period");
            return Err(CoreError::MissingPrice { milk_type, day });
        }
        self.price_for(milk_type, day)
            .ok_or(CoreError::MissingPrice { milk_type, day })
    }

    /// The open period with the highest precedence.
    pub fn current(&self, milk_type: MilkType) -> Option<&PricePeriod> {
        self.periods_for(milk_type).find(|p| p.is_current())
    }

    /// Every overlapping pair, winner first.
    pub fn overlaps(&self) -> Vec<PriceOverlap> {
        let mut found = Vec::new();
        for (i, winner) in self.periods.iter().enumerate() {
            for shadowed in &self.periods[i + 1..] {
                if winner.overlaps(shadowed) {
                    found.push(PriceOverlap {
                        milk_type: winner.milk_type,
                        winner_id: winner.id.clone(),
                        shadowed_id: shadowed.id.clone(),
                    });
                }
            }
        }
        found
    }

    /// Periods of one milk type, highest precedence first.
    pub fn periods_for(&self, milk_type: MilkType) -> impl Iterator<Item = &PricePeriod> {
        self.periods.iter().filter(move |p| p.milk_type == milk_type)
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn period(
        id: &str,
        rupees: i64,
        milk_type: MilkType,
        start: NaiveDate,
        end: Option<NaiveDate>,
        cal: &BillingCalendar,
    ) -> Price {
        Price::new(
            id,
            Money::from_rupees(rupees),
            milk_type,
            cal.local_midnight(start),
            end.map(|d| cal.local_midnight(d)),
        )
    }

    #[test]
    fn test_lookup_across_periods() {
        let cal = BillingCalendar::default();
        let prices = vec![
            period("jan", 10, MilkType::Cow, day(2024, 1, 1), Some(day(2024, 1, 31)), &cal),
            period("feb", 12, MilkType::Cow, day(2024, 2, 1), None, &cal),
        ];
        let timeline = PriceTimeline::build(&prices, &cal);

        assert_eq!(timeline.price_for(MilkType::Cow, day(2024, 1, 15)), Some(Money::from_rupees(10)));
        assert_eq!(timeline.price_for(MilkType::Cow, day(2024, 1, 31)), Some(Money::from_rupees(10)));
        assert_eq!(timeline.price_for(MilkType::Cow, day(2024, 3, 1)), Some(Money::from_rupees(12)));
        assert_eq!(timeline.price_for(MilkType::Cow, day(2023, 12, 31)), None);
        assert!(timeline.overlaps().is_empty());
    }

    #[test]
    fn test_milk_types_priced_independently() {
        let cal = BillingCalendar::utc();
        let prices = vec![
            period("cow", 50, MilkType::Cow, day(2024, 1, 1), None, &cal),
            period("buf", 70, MilkType::Buffalo, day(2024, 3, 1), None, &cal),
        ];
        let timeline = PriceTimeline::build(&prices, &cal);

        assert_eq!(timeline.price_for(MilkType::Buffalo, day(2024, 2, 1)), None);
        assert_eq!(timeline.price_for(MilkType::Buffalo, day(2024, 3, 1)), Some(Money::from_rupees(70)));
        assert_eq!(timeline.price_for(MilkType::Cow, day(2024, 2, 1)), Some(Money::from_rupees(50)));
    }

    #[test]
    fn test_overlap_latest_start_wins() {
        let cal = BillingCalendar::utc();
        let prices = vec![
            period("old", 40, MilkType::Cow, day(2024, 1, 1), None, &cal),
            period("new", 45, MilkType::Cow, day(2024, 2, 10), None, &cal),
        ];
        let timeline = PriceTimeline::build(&prices, &cal);

        assert_eq!(timeline.price_for(MilkType::Cow, day(2024, 2, 1)), Some(Money::from_rupees(40)));
        assert_eq!(timeline.price_for(MilkType::Cow, day(2024, 2, 10)), Some(Money::from_rupees(45)));
        assert_eq!(timeline.current(MilkType::Cow).unwrap().id, "new");

        let overlaps = timeline.overlaps();
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].winner_id, "new");
        assert_eq!(overlaps[0].shadowed_id, "old");
    }

    #[test]
    fn test_equal_start_tie_breaks_on_id() {
        let cal = BillingCalendar::utc();
        let a = period("a", 40, MilkType::Cow, day(2024, 1, 1), None, &cal);
        let b = period("b", 41, MilkType::Cow, day(2024, 1, 1), None, &cal);

        let forward = PriceTimeline::build(&[a.clone(), b.clone()], &cal);
        let reverse = PriceTimeline::build(&[b, a], &cal);

        assert_eq!(forward.price_for(MilkType::Cow, day(2024, 1, 5)), Some(Money::from_rupees(41)));
        assert_eq!(reverse.price_for(MilkType::Cow, day(2024, 1, 5)), Some(Money::from_rupees(41)));
    }

    #[test]
    fn test_price_change_day_prefers_new_period() {
        let cal = BillingCalendar::utc();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let old = Price::new(
            "old",
            Money::from_rupees(50),
            MilkType::Cow,
            now - Duration::days(30),
            Some(now),
        );
        let new = Price::new("new", Money::from_rupees(55), MilkType::Cow, now, None);
        let timeline = PriceTimeline::build(&[old, new], &cal);

        assert_eq!(timeline.price_for(MilkType::Cow, day(2024, 3, 9)), Some(Money::from_rupees(50)));
        assert_eq!(timeline.price_for(MilkType::Cow, day(2024, 3, 10)), Some(Money::from_rupees(55)));
        assert!(timeline.overlaps().is_empty());
    }

    #[test]
    fn test_price_or_and_require() {
        let cal = BillingCalendar::utc();
        let timeline = PriceTimeline::build(&[], &cal);
        let d = day(2023, 1, 1);

        assert_eq!(
            timeline.price_or(MilkType::Buffalo, d, Money::from_rupees(45)),
            Money::from_rupees(45)
        );
        assert!(matches!(
            timeline.require(MilkType::Buffalo, d),
            Err(CoreError::MissingPrice { milk_type: MilkType::Buffalo, .. })
        ));
    }

    #[test]
    fn test_require_needs_current_period() {
        let cal = BillingCalendar::utc();
        let january = period("jan", 50, MilkType::Cow, day(2024, 1, 1), Some(day(2024, 1, 31)), &cal);
        let timeline = PriceTimeline::build(&[january], &cal);

        // The closed period still prices reports for the day
        assert_eq!(timeline.price_for(MilkType::Cow, day(2024, 1, 15)), Some(Money::from_rupees(50)));
        assert!(timeline.current(MilkType::Cow).is_none());
        assert!(matches!(
            timeline.require(MilkType::Cow, day(2024, 1, 15)),
            Err(CoreError::MissingPrice { milk_type: MilkType::Cow, .. })
        ));
    }
}
