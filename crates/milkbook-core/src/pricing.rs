//! # Price Changes
//!
//! Plans "set a new current price" for one milk type.
//!
//! ```text
//! before   cow  ├── p1 @ ₹50 ───────────────────────────►  (current)
//!
//! after    cow  ├── p1 @ ₹50 ──────────┤                   closed at now
//!                                       ├── p2 @ ₹55 ─────►  opened at now
//! ```
//!
//! Every open period of the milk type is closed, so a transient state with two
//! current prices heals on the next change. A change that would overlap an
//! existing period (one starting after `now`, or one closed after `now`) is
//! rejected rather than stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{MilkType, Price};
use crate::validation::validate_price_amount;

/// An open period to be closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClosedPeriod {
    pub id: String,
    #[ts(as = "String")]
    pub end_date: DateTime<Utc>,
}

/// Writes for one price change, applied together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PriceChange {
    pub close: Vec<ClosedPeriod>,
    pub open: Price,
}

/// Plans a new current price of `amount` for `milk_type`, effective `now`.
///
/// ## Errors
/// - `Validation` if `amount` is not positive
/// - `OverlappingPrice` if a period of the milk type reaches past `now`
pub fn plan_price_change(
    prices: &[Price],
    milk_type: MilkType,
    amount: Money,
    now: DateTime<Utc>,
) -> CoreResult<PriceChange> {
    validate_price_amount(amount)?;

    let same_type = prices.iter().filter(|p| p.milk_type == milk_type);

    if let Some(conflict) = same_type.clone().find(|p| {
        p.start_date > now || p.end_date.map_or(false, |end| end > now)
    }) {
        return Err(CoreError::OverlappingPrice {
            milk_type,
            start: now,
            conflicting_id: conflict.id.clone(),
        });
    }

    let close: Vec<ClosedPeriod> = same_type
        .filter(|p| p.is_current())
        .map(|p| ClosedPeriod {
            id: p.id.clone(),
            end_date: now,
        })
        .collect();

    let open = Price {
        id: Uuid::new_v4().to_string(),
        amount,
        milk_type,
        start_date: now,
        end_date: None,
        created_at: Some(now),
    };

    info!(
        milk_type = %milk_type,
        amount = %amount,
        closing = close.len(),
        "Planned price change"
    );

    Ok(PriceChange { close, open })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()
    }

    fn open(id: &str, milk_type: MilkType, days_ago: i64) -> Price {
        Price::new(
            id,
            Money::from_rupees(50),
            milk_type,
            now() - Duration::days(days_ago),
            None,
        )
    }

    #[test]
    fn test_closes_current_and_opens_new() {
        let prices = vec![open("cow-1", MilkType::Cow, 30), open("buf-1", MilkType::Buffalo, 30)];
        let change = plan_price_change(&prices, MilkType::Cow, Money::from_rupees(55), now()).unwrap();

        assert_eq!(
            change.close,
            vec![ClosedPeriod {
                id: "cow-1".to_string(),
                end_date: now(),
            }]
        );
        assert_eq!(change.open.milk_type, MilkType::Cow);
        assert_eq!(change.open.amount, Money::from_rupees(55));
        assert_eq!(change.open.start_date, now());
        assert!(change.open.is_current());
    }

    #[test]
    fn test_closes_every_open_period() {
        let prices = vec![open("a", MilkType::Cow, 30), open("b", MilkType::Cow, 10)];
        let change = plan_price_change(&prices, MilkType::Cow, Money::from_rupees(55), now()).unwrap();
        assert_eq!(change.close.len(), 2);
    }

    #[test]
    fn test_first_price_closes_nothing() {
        let change = plan_price_change(&[], MilkType::Buffalo, Money::from_rupees(70), now()).unwrap();
        assert!(change.close.is_empty());
    }

    #[test]
    fn test_rejects_future_dated_overlap() {
        let prices = vec![open("future", MilkType::Cow, -2)];
        let err = plan_price_change(&prices, MilkType::Cow, Money::from_rupees(55), now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::OverlappingPrice { ref conflicting_id, .. } if conflicting_id == "future"
        ));

        let mut closed_later = open("closed", MilkType::Cow, 30);
        closed_later.end_date = Some(now() + Duration::days(1));
        assert!(plan_price_change(&[closed_later], MilkType::Cow, Money::from_rupees(55), now()).is_err());
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let err = plan_price_change(&[], MilkType::Cow, Money::zero(), now()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::MustBePositive { .. })
        ));
    }
}
