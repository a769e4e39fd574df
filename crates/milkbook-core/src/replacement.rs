//! # Delivery Replacement
//!
//! Plans the storage writes for re-entering one day's deliveries.
//!
//! ## Plan Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Save day 2024-03-05                                                    │
//! │                                                                         │
//! │  desired  (asha, cow) → 0 L        existing  #1 asha cow 2024-03-05     │
//! │           (bina, cow) → 4 L                                             │
//! │                                                                         │
//! │  to_delete = [#1]              every in-window record whose             │
//! │                                (client, milk type) is in desired        │
//! │  to_insert = [bina cow 4 L     every desired entry with qty > 0,        │
//! │               @ ₹50 = ₹200]    priced through the timeline              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage must apply `to_delete` before `to_insert`, inside one transaction.
//! A plan is computed from the storage state of the attempt that applies it;
//! retrying means re-reading and re-planning.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use ts_rs::TS;

use crate::calendar::BillingCalendar;
use crate::error::CoreResult;
use crate::money::{Money, Quantity};
use crate::timeline::PriceTimeline;
use crate::types::{Delivery, DeliveryDraft, MilkType};
use crate::validation::validate_quantity;

/// Desired quantity per (client id, milk type) for one day.
///
/// A quantity of zero means "no delivery": existing records are removed and
/// nothing is inserted.
pub type DesiredEntries = BTreeMap<(String, MilkType), Quantity>;

/// Deletions and insertions that make storage match the desired entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReplacementPlan {
    #[ts(as = "String")]
    pub day: NaiveDate,
    /// Ids to delete (applied first).
    pub to_delete: Vec<String>,
    /// Records to insert (applied second).
    pub to_insert: Vec<DeliveryDraft>,
}

impl ReplacementPlan {
    /// Checks if applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }
}

/// Existing records that really fall on `day`; anything else is logged and
/// left alone.
fn in_window<'a>(
    day: NaiveDate,
    existing: &'a [Delivery],
    calendar: &'a BillingCalendar,
) -> impl Iterator<Item = &'a Delivery> + 'a {
    existing.iter().filter(move |delivery| {
        let inside = calendar.contains(day, delivery.date);
        if !inside {
            warn!(
                delivery_id = %delivery.id,
                day = %day,
                date = %delivery.date,
                "Existing delivery outside the target day, not deleting"
            );
        }
        inside
    })
}

/// Plans a replacement of `day`'s deliveries.
///
/// Only keys present in `desired` are touched: an empty map is a no-op, not a
/// clear. Use [`plan_clear_day`] to remove everything on the day.
///
/// ## Errors
/// - `Validation` if any desired quantity is negative
/// - `MissingPrice` if an entry with quantity > 0 has a milk type with no
///   current price, or no price period covering `day`; checked before any
///   plan is returned
pub fn plan_replacement(
    day: NaiveDate,
    desired: &DesiredEntries,
    existing: &[Delivery],
    timeline: &PriceTimeline,
    calendar: &BillingCalendar,
) -> CoreResult<ReplacementPlan> {
    for quantity in desired.values() {
        validate_quantity(*quantity)?;
    }

    let mut priced: Vec<(&String, MilkType, Quantity, Money)> = Vec::new();
    for ((client_id, milk_type), quantity) in desired {
        if quantity.is_positive() {
            let price = timeline.require(*milk_type, day)?;
            priced.push((client_id, *milk_type, *quantity, price));
        }
    }

    let to_delete: Vec<String> = in_window(day, existing, calendar)
        .filter(|delivery| desired.contains_key(&(delivery.client_id.clone(), delivery.milk_type)))
        .map(|delivery| delivery.id.clone())
        .collect();

    let date = calendar.local_midnight(day);
    let to_insert: Vec<DeliveryDraft> = priced
        .into_iter()
        .map(|(client_id, milk_type, quantity, price)| DeliveryDraft {
            client_id: client_id.clone(),
            milk_type,
            date,
            quantity,
            price_at_delivery: price,
            total_amount: price.for_quantity(quantity),
        })
        .collect();

    debug!(
        day = %day,
        deletes = to_delete.len(),
        inserts = to_insert.len(),
        "Planned delivery replacement"
    );

    Ok(ReplacementPlan {
        day,
        to_delete,
        to_insert,
    })
}

/// Plans removal of every delivery on `day`.
pub fn plan_clear_day(
    day: NaiveDate,
    existing: &[Delivery],
    calendar: &BillingCalendar,
) -> ReplacementPlan {
    let to_delete: Vec<String> = in_window(day, existing, calendar)
        .map(|delivery| delivery.id.clone())
        .collect();

    debug!(day = %day, deletes = to_delete.len(), "Planned day clear");

    ReplacementPlan {
        day,
        to_delete,
        to_insert: Vec::new(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
