//! # Delivery Deduplication
//!
//! Collapses raw delivery records into at most one record per
//! (client, local day, milk type).
//!
//! ## Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Raw records for key  asha:2024-03-05:cow                               │
//! │                                                                         │
//! │    d1  qty 2 L   created_at 08:00                                       │
//! │    d2  qty 3 L   created_at 08:05     ◄── kept (later created_at)       │
//! │                                                                         │
//! │  Sort key per record = created_at, or the delivery date when absent     │
//! │  Equal sort keys     → lexicographically larger id is kept              │
//! │  The kept record is used verbatim; fields are never merged              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The winner is a maximum over a total order, so the result does not depend
//! on input order and deduplicating a deduplicated set changes nothing.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::btree_map::{BTreeMap, Entry};
use tracing::debug;

use crate::calendar::{BillingCalendar, BillingMonth};
use crate::types::{Delivery, DeliveryKey, MilkType};

/// At most one delivery per [`DeliveryKey`], iterated in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupedDeliveries {
    by_key: BTreeMap<DeliveryKey, Delivery>,
}

/// What deduplication kept and discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeReport {
    pub raw_count: usize,
    pub kept: usize,
    /// Ids of superseded duplicates, sorted.
    pub discarded_ids: Vec<String>,
}

fn sort_key(delivery: &Delivery) -> DateTime<Utc> {
    delivery.created_at.unwrap_or(delivery.date)
}

fn supersedes(candidate: &Delivery, incumbent: &Delivery) -> bool {
    (sort_key(candidate), &candidate.id) > (sort_key(incumbent), &incumbent.id)
}

/// Deduplicates raw deliveries. Single pass, keyed on the local day.
pub fn dedupe(
    raw: impl IntoIterator<Item = Delivery>,
    calendar: &BillingCalendar,
) -> DedupedDeliveries {
    dedupe_with_report(raw, calendar).0
}

/// Deduplicates and reports the discarded duplicates.
pub fn dedupe_with_report(
    raw: impl IntoIterator<Item = Delivery>,
    calendar: &BillingCalendar,
) -> (DedupedDeliveries, DedupeReport) {
    let mut by_key: BTreeMap<DeliveryKey, Delivery> = BTreeMap::new();
    let mut report = DedupeReport::default();

    for delivery in raw {
        report.raw_count += 1;
        let key = DeliveryKey::new(
            delivery.client_id.clone(),
            calendar.day_of(delivery.date),
            delivery.milk_type,
        );

        match by_key.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(delivery);
            }
            Entry::Occupied(mut slot) => {
                let loser = if supersedes(&delivery, slot.get()) {
                    slot.insert(delivery)
                } else {
                    delivery
                };
                debug!(
                    key = %slot.key(),
                    kept = %slot.get().id,
                    discarded = %loser.id,
                    "Discarded duplicate delivery"
                );
                report.discarded_ids.push(loser.id);
            }
        }
    }

    report.kept = by_key.len();
    report.discarded_ids.sort();

    if !report.discarded_ids.is_empty() {
        debug!(
            raw = report.raw_count,
            kept = report.kept,
            discarded = report.discarded_ids.len(),
            "Deduplicated deliveries"
        );
    }

    (DedupedDeliveries { by_key }, report)
}

impl DedupedDeliveries {
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn get(&self, key: &DeliveryKey) -> Option<&Delivery> {
        self.by_key.get(key)
    }

    /// All entries in key order (client, day, milk type).
    pub fn iter(&self) -> impl Iterator<Item = (&DeliveryKey, &Delivery)> {
        self.by_key.iter()
    }

    /// One client's deliveries, day-ascending.
    pub fn for_client<'a>(&'a self, client_id: &str) -> impl Iterator<Item = (&'a DeliveryKey, &'a Delivery)> {
        let from = DeliveryKey::new(client_id, NaiveDate::MIN, MilkType::Cow);
        let to = DeliveryKey::new(client_id, NaiveDate::MAX, MilkType::Buffalo);
        self.by_key.range(from..=to)
    }

    /// Entries whose local day falls within `month`.
    pub fn in_month(&self, month: BillingMonth) -> impl Iterator<Item = (&DeliveryKey, &Delivery)> {
        self.by_key.iter().filter(move |(key, _)| month.contains(key.day))
    }

    /// Entries on one local day.
    pub fn on_day(&self, day: NaiveDate) -> impl Iterator<Item = (&DeliveryKey, &Delivery)> {
        self.by_key.iter().filter(move |(key, _)| key.day == day)
    }

    /// Retained records in key order.
    pub fn into_vec(self) -> Vec<Delivery> {
        self.by_key.into_values().collect()
    }

    /// The underlying key → record map.
    pub fn into_deliveries(self) -> BTreeMap<DeliveryKey, Delivery> {
        self.by_key
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Money, Quantity};
    use chrono::{Duration, TimeZone};

    fn cal() -> BillingCalendar {
        BillingCalendar::default()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn delivery(
        id: &str,
        client: &str,
        on: NaiveDate,
        milk_type: MilkType,
        litres: f64,
        created_at: Option<DateTime<Utc>>,
    ) -> Delivery {
        let quantity = Quantity::from_litres(litres);
        let price = Money::from_rupees(50);
        Delivery {
            id: id.to_string(),
            client_id: client.to_string(),
            milk_type,
            date: cal().local_midnight(on),
            quantity,
            price_at_delivery: price,
            total_amount: price.for_quantity(quantity),
            created_at,
        }
    }

    fn at(hour: u32, minute: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 3, 5, hour, minute, 0).unwrap())
    }

    #[test]
    fn test_later_created_at_wins() {
        let d = day(2024, 3, 5);
        let raw = vec![
            delivery("d1", "asha", d, MilkType::Cow, 2.0, at(2, 30)),
            delivery("d2", "asha", d, MilkType::Cow, 3.0, at(2, 35)),
        ];
        let (deduped, report) = dedupe_with_report(raw, &cal());

        let kept = deduped
            .get(&DeliveryKey::new("asha", d, MilkType::Cow))
            .unwrap();
        assert_eq!(kept.id, "d2");
        assert_eq!(kept.quantity, Quantity::from_whole_litres(3));
        assert_eq!(report.raw_count, 2);
        assert_eq!(report.kept, 1);
        assert_eq!(report.discarded_ids, vec!["d1".to_string()]);
    }

    #[test]
    fn test_missing_created_at_uses_date_then_id() {
        let d = day(2024, 3, 5);
        let raw = vec![
            delivery("b", "asha", d, MilkType::Cow, 1.0, None),
            delivery("a", "asha", d, MilkType::Cow, 2.0, None),
        ];
        let deduped = dedupe(raw, &cal());
        assert_eq!(deduped.into_vec()[0].id, "b");
    }

    #[test]
    fn test_milk_types_and_days_are_separate_keys() {
        let raw = vec![
            delivery("d1", "asha", day(2024, 3, 5), MilkType::Cow, 1.0, None),
            delivery("d2", "asha", day(2024, 3, 5), MilkType::Buffalo, 1.0, None),
            delivery("d3", "asha", day(2024, 3, 6), MilkType::Cow, 1.0, None),
            delivery("d4", "bina", day(2024, 3, 5), MilkType::Cow, 1.0, None),
        ];
        let deduped = dedupe(raw, &cal());
        assert_eq!(deduped.len(), 4);
        assert_eq!(deduped.for_client("asha").count(), 3);
        assert_eq!(deduped.on_day(day(2024, 3, 5)).count(), 3);
    }

    #[test]
    fn test_key_uses_local_day() {
        // 20:00 UTC on 4 March is 01:30 IST on 5 March.
        let mut late = delivery("d1", "asha", day(2024, 3, 5), MilkType::Cow, 1.0, None);
        late.date = Utc.with_ymd_and_hms(2024, 3, 4, 20, 0, 0).unwrap();
        let deduped = dedupe(vec![late], &cal());
        assert!(deduped
            .get(&DeliveryKey::new("asha", day(2024, 3, 5), MilkType::Cow))
            .is_some());
    }

    #[test]
    fn test_order_independent_and_idempotent() {
        let d = day(2024, 3, 5);
        let base = at(1, 0).unwrap();
        let raw: Vec<Delivery> = (0..6)
            .map(|i| {
                let created = if i % 2 == 0 {
                    Some(base + Duration::minutes(i64::from(i % 3)))
                } else {
                    None
                };
                let client = if i < 3 { "asha" } else { "bina" };
                delivery(&format!("d{}", i), client, d, MilkType::Cow, 1.0, created)
            })
            .collect();

        let mut reversed = raw.clone();
        reversed.reverse();

        let forward = dedupe(raw, &cal());
        let backward = dedupe(reversed, &cal());
        assert_eq!(forward, backward);

        let again = dedupe(forward.clone().into_vec(), &cal());
        assert_eq!(again, forward);
    }

    #[test]
    fn test_at_most_one_per_key() {
        let d = day(2024, 3, 5);
        let raw: Vec<Delivery> = (0..10)
            .map(|i| delivery(&format!("d{}", i), "asha", d, MilkType::Cow, 1.0, at(1, i)))
            .collect();
        let deduped = dedupe(raw, &cal());
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped.into_deliveries().into_values().next().unwrap().id, "d9");
    }

    #[test]
    fn test_in_month_filters_on_local_day() {
        let raw = vec![
            delivery("feb", "asha", day(2024, 2, 29), MilkType::Cow, 1.0, None),
            delivery("mar", "asha", day(2024, 3, 1), MilkType::Cow, 1.0, None),
            delivery("end", "asha", day(2024, 3, 31), MilkType::Cow, 1.0, None),
        ];
        let deduped = dedupe(raw, &cal());
        let march = BillingMonth::new(2024, 3).unwrap();
        let ids: Vec<&str> = deduped.in_month(march).map(|(_, d)| d.id.as_str()).collect();
        assert_eq!(ids, vec!["mar", "end"]);
    }
}
