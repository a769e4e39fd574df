//! # milkbook-core: Pure Billing Logic for MilkBook
//!
//! This crate is the **heart** of MilkBook. It turns a raw, possibly
//! duplicated stream of delivery records plus a time-sliced price history
//! into deterministic monthly statements, and plans the storage writes that
//! keep "one delivery per client per day per milk type" true.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MilkBook Data Flow                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 milkbook-db (storage collaborator)              │   │
//! │  │        clients, prices, deliveries  ──►  fresh snapshot         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ milkbook-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   raw deliveries ──► dedupe ──┬──► build_statements ──► output  │   │
//! │  │                               │                                 │   │
//! │  │                               └──► plan_replacement ──► plan    │   │
//! │  │                                         ▲                       │   │
//! │  │   prices ──► PriceTimeline ─────────────┘ (and statements)      │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Client, Price, Delivery, MilkType, ...)
//! - [`money`] - Money (paise) and Quantity (millilitres), integer only
//! - [`calendar`] - Local-time day bucketing and billing months
//! - [`timeline`] - Point-in-time price lookup
//! - [`dedupe`] - One delivery per (client, day, milk type)
//! - [`replacement`] - Delete/insert plans for re-entering a day
//! - [`statement`] - Monthly statements, history rows, daily summary
//! - [`pricing`] - Planning a new current price
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use milkbook_core::{BillingCalendar, MilkType, Money, Price, PriceTimeline};
//!
//! let calendar = BillingCalendar::utc();
//! let start = calendar.local_midnight(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
//! let price = Price::new("p1", Money::from_rupees(50), MilkType::Cow, start, None);
//!
//! let timeline = PriceTimeline::build(&[price], &calendar);
//! let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
//! assert_eq!(timeline.price_for(MilkType::Cow, day), Some(Money::from_rupees(50)));
//! assert_eq!(timeline.price_for(MilkType::Buffalo, day), None);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod calendar;
pub mod dedupe;
pub mod error;
pub mod money;
pub mod pricing;
pub mod replacement;
pub mod statement;
pub mod timeline;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use calendar::{BillingCalendar, BillingMonth};
pub use dedupe::{dedupe, dedupe_with_report, DedupeReport, DedupedDeliveries};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Quantity};
pub use pricing::{plan_price_change, ClosedPeriod, PriceChange};
pub use replacement::{plan_clear_day, plan_replacement, DesiredEntries, ReplacementPlan};
pub use statement::{
    build_statements, daily_summary, delivery_history, ClientStatement, DailySummary, HistoryRow,
    LineItem, StatementBook,
};
pub use timeline::{PriceOverlap, PricePeriod, PriceTimeline};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Display name used for deliveries whose client no longer exists.
///
/// Clients may be hard-deleted by the surrounding app while deliveries still
/// reference them; those rows render under this name instead of failing.
pub const UNKNOWN_CLIENT_NAME: &str = "Unknown";

/// Default UTC offset (minutes) for day bucketing: India Standard Time.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;
