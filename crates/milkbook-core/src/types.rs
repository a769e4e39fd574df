//! # Domain Types
//!
//! Core domain types used throughout MilkBook.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Client       │   │     Price       │   │    Delivery     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  name           │   │  amount / litre │   │  client_id (ref)│       │
//! │  │  status         │   │  milk_type      │   │  milk_type      │       │
//! │  │  phone, address │   │  start..=end    │   │  date, quantity │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   MilkType      │   │  ClientStatus   │   │  DeliveryKey    │       │
//! │  │  Cow (default)  │   │  Active         │   │  client_id      │       │
//! │  │  Buffalo        │   │  Inactive       │   │  day, milk_type │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Fields
//! `Delivery.price_at_delivery` and `Delivery.total_amount` are captured at
//! write time. They are a cache, not the source of truth: statements re-price
//! every delivery through the [`PriceTimeline`](crate::timeline::PriceTimeline)
//! and only fall back to the snapshot when no period covers the day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, Quantity};

// =============================================================================
// Milk Type
// =============================================================================

/// Classification of milk with independent pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MilkType {
    /// Cow milk. Records written before milk types existed are cow milk.
    #[default]
    Cow,
    /// Buffalo milk.
    Buffalo,
}

impl MilkType {
    /// Every milk type, in display order.
    pub const ALL: [MilkType; 2] = [MilkType::Cow, MilkType::Buffalo];

    /// Stored/serialised name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MilkType::Cow => "cow",
            MilkType::Buffalo => "buffalo",
        }
    }

    /// Resolves a stored milk type leniently.
    ///
    /// ## Rules
    /// - Missing → `Cow` (older records predate milk types)
    /// - Unknown → `Cow`, with a warning
    pub fn from_stored(raw: Option<&str>) -> MilkType {
        match raw.map(str::trim) {
            None | Some("") => MilkType::Cow,
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!(value = %value, "Unknown milk type in stored record, treating as cow");
                MilkType::Cow
            }),
        }
    }
}

impl fmt::Display for MilkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MilkType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cow" => Ok(MilkType::Cow),
            "buffalo" => Ok(MilkType::Buffalo),
            _ => Err(ValidationError::NotAllowed {
                field: "milk_type".to_string(),
                allowed: MilkType::ALL.iter().map(|m| m.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// Lifecycle state of a client.
///
/// Deactivation is the intended way to retire a client; deliveries keep
/// referencing the id either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// Receives deliveries and appears on the delivery sheet.
    #[default]
    Active,
    /// Retired; history and statements remain.
    Inactive,
}

impl ClientStatus {
    /// Maps the legacy `active` flag. A missing flag means active.
    pub fn from_flag(active: Option<bool>) -> Self {
        match active {
            Some(false) => ClientStatus::Inactive,
            Some(true) | None => ClientStatus::Active,
        }
    }

    /// Storage flag for this status.
    pub const fn as_flag(&self) -> bool {
        match self {
            ClientStatus::Active => true,
            ClientStatus::Inactive => false,
        }
    }
}

/// A customer who receives milk deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Client {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name on the delivery sheet and statements.
    pub name: String,

    /// Delivery address.
    pub address: String,

    /// Contact phone number.
    pub phone: String,

    /// Active or retired.
    pub status: ClientStatus,

    /// When the client was created.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// When the client was last edited.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Checks if the client is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.status, ClientStatus::Active)
    }
}

// =============================================================================
// Price
// =============================================================================

/// A per-litre price for one milk type over a date range.
///
/// `end_date = None` marks the current price. Under correct operation a milk
/// type has at most one current price and no overlapping periods; readers
/// must not rely on either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Price {
    pub id: String,
    /// Price per litre.
    pub amount: Money,
    pub milk_type: MilkType,
    /// First instant of the period (inclusive).
    #[ts(as = "String")]
    pub start_date: DateTime<Utc>,
    /// Last instant of the period (inclusive); `None` = still active.
    #[ts(as = "Option<String>")]
    pub end_date: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Price {
    /// Creates a price period without a creation timestamp.
    pub fn new(
        id: impl Into<String>,
        amount: Money,
        milk_type: MilkType,
        start_date: DateTime<Utc>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        Price {
            id: id.into(),
            amount,
            milk_type,
            start_date,
            end_date,
            created_at: None,
        }
    }

    /// Checks if this is an open ("current") period.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.end_date.is_none()
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// A stored delivery of one milk type to one client on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Delivery {
    pub id: String,
    /// Non-owning reference; the client may since have been deleted.
    pub client_id: String,
    pub milk_type: MilkType,
    /// Local midnight of the delivery day (time of day is not meaningful).
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub quantity: Quantity,
    /// Price per litre captured when the record was written (snapshot).
    pub price_at_delivery: Money,
    /// `quantity × price_at_delivery` at write time (snapshot).
    pub total_amount: Money,
    /// Insertion time; only used to pick among duplicates.
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Delivery {
    /// Materialises a draft as a stored record.
    pub fn from_draft(
        id: impl Into<String>,
        draft: DeliveryDraft,
        created_at: DateTime<Utc>,
    ) -> Self {
        Delivery {
            id: id.into(),
            client_id: draft.client_id,
            milk_type: draft.milk_type,
            date: draft.date,
            quantity: draft.quantity,
            price_at_delivery: draft.price_at_delivery,
            total_amount: draft.total_amount,
            created_at: Some(created_at),
        }
    }
}

/// A delivery to be inserted, produced by a replacement plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeliveryDraft {
    pub client_id: String,
    pub milk_type: MilkType,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub quantity: Quantity,
    pub price_at_delivery: Money,
    pub total_amount: Money,
}

// =============================================================================
// Delivery Key
// =============================================================================

/// The tuple that must uniquely identify a delivery.
///
/// Ordered by client, then day, then milk type, so maps keyed by it iterate
/// deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeliveryKey {
    pub client_id: String,
    pub day: NaiveDate,
    pub milk_type: MilkType,
}

impl DeliveryKey {
    pub fn new(client_id: impl Into<String>, day: NaiveDate, milk_type: MilkType) -> Self {
        DeliveryKey {
            client_id: client_id.into(),
            day,
            milk_type,
        }
    }
}

impl fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.client_id, self.day, self.milk_type)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milk_type_default_is_cow() {
        assert_eq!(MilkType::default(), MilkType::Cow);
    }

    #[test]
    fn test_milk_type_parse() {
        assert_eq!("cow".parse::<MilkType>().unwrap(), MilkType::Cow);
        assert_eq!(" Buffalo ".parse::<MilkType>().unwrap(), MilkType::Buffalo);
        assert!("goat".parse::<MilkType>().is_err());
    }

    #[test]
    fn test_milk_type_from_stored_is_lenient() {
        assert_eq!(MilkType::from_stored(None), MilkType::Cow);
        assert_eq!(MilkType::from_stored(Some("")), MilkType::Cow);
        assert_eq!(MilkType::from_stored(Some("buffalo")), MilkType::Buffalo);
        assert_eq!(MilkType::from_stored(Some("goat")), MilkType::Cow);
    }

    #[test]
    fn test_milk_type_serde_lowercase() {
        assert_eq!(serde_json::to_string(&MilkType::Buffalo).unwrap(), "\"buffalo\"");
        let parsed: MilkType = serde_json::from_str("\"cow\"").unwrap();
        assert_eq!(parsed, MilkType::Cow);
    }

    #[test]
    fn test_client_status_from_flag() {
        assert_eq!(ClientStatus::from_flag(None), ClientStatus::Active);
        assert_eq!(ClientStatus::from_flag(Some(true)), ClientStatus::Active);
        assert_eq!(ClientStatus::from_flag(Some(false)), ClientStatus::Inactive);
        assert!(!ClientStatus::Inactive.as_flag());
    }

    #[test]
    fn test_delivery_key_ordering() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let a = DeliveryKey::new("a", day, MilkType::Buffalo);
        let b = DeliveryKey::new("b", day, MilkType::Cow);
        assert!(a < b);
        assert_eq!(a.to_string(), "a:2024-03-05:buffalo");
    }
}
