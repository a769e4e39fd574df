//! # Statements
//!
//! Monthly per-client statements, the delivery history listing and the daily
//! dashboard summary. All three read a deduplicated delivery set and never
//! fail on bad data.
//!
//! ## Statement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  clients (caller-sorted) ──┐                                            │
//! │                            │                                            │
//! │  DedupedDeliveries ────────┼──► per client, month filter (local day)    │
//! │                            │         │                                  │
//! │  PriceTimeline ────────────┘         ▼                                  │
//! │                              price = timeline price for (milk, day),    │
//! │                                      else the cached price_at_delivery  │
//! │                              amount = price × quantity (rounded once)   │
//! │                                      │                                  │
//! │                                      ▼                                  │
//! │                              ClientStatement { line_items, totals }     │
//! │                              totals are exact sums of the lines         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};
use ts_rs::TS;

use crate::calendar::{BillingCalendar, BillingMonth};
use crate::dedupe::DedupedDeliveries;
use crate::money::{Money, Quantity};
use crate::timeline::PriceTimeline;
use crate::types::{Client, MilkType};
use crate::UNKNOWN_CLIENT_NAME;

// =============================================================================
// Statement Types
// =============================================================================

/// One delivered line on a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    /// Local delivery day.
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub milk_type: MilkType,
    pub quantity: Quantity,
    /// Per-litre price applied.
    pub price: Money,
    /// `price × quantity`, rounded to the paisa.
    pub amount: Money,
}

/// A client's bill for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClientStatement {
    pub client_id: String,
    pub client_name: String,
    pub total_quantity: Quantity,
    pub total_amount: Money,
    /// Day-ascending, then by milk type.
    pub line_items: Vec<LineItem>,
}

impl ClientStatement {
    /// Checks if anything was delivered (what gets printed).
    pub fn is_billed(&self) -> bool {
        self.total_quantity.is_positive()
    }
}

/// Every statement for a month plus book-level totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatementBook {
    pub month: BillingMonth,
    pub statements: Vec<ClientStatement>,
    /// Deliveries in the month whose client was not in the client list.
    pub orphaned: usize,
}

impl StatementBook {
    /// Builds statements for `clients` and counts orphaned deliveries.
    pub fn build(
        month: BillingMonth,
        clients: &[Client],
        deduped: &DedupedDeliveries,
        timeline: &PriceTimeline,
        calendar: &BillingCalendar,
    ) -> Self {
        let statements = build_statements(month, clients, deduped, timeline, calendar);

        let known: HashSet<&str> = clients.iter().map(|c| c.id.as_str()).collect();
        let orphaned = deduped
            .in_month(month)
            .filter(|(key, _)| !known.contains(key.client_id.as_str()))
            .count();
        if orphaned > 0 {
            warn!(month = %month, orphaned, "Deliveries reference clients not in the statement run");
        }

        let book = StatementBook {
            month,
            statements,
            orphaned,
        };
        info!(
            month = %month,
            clients = book.statements.len(),
            billed = book.billed().count(),
            total = %book.grand_total_amount(),
            "Built monthly statements"
        );
        book
    }

    /// Statements with deliveries.
    pub fn billed(&self) -> impl Iterator<Item = &ClientStatement> {
        self.statements.iter().filter(|s| s.is_billed())
    }

    pub fn grand_total_quantity(&self) -> Quantity {
        self.statements.iter().map(|s| s.total_quantity).sum()
    }

    pub fn grand_total_amount(&self) -> Money {
        self.statements.iter().map(|s| s.total_amount).sum()
    }
}

// =============================================================================
// Statement Builder
// =============================================================================

/// Builds one statement per client, preserving client order.
///
/// Clients without deliveries get a zero statement.
pub fn build_statements(
    month: BillingMonth,
    clients: &[Client],
    deduped: &DedupedDeliveries,
    timeline: &PriceTimeline,
    calendar: &BillingCalendar,
) -> Vec<ClientStatement> {
    clients
        .iter()
        .map(|client| {
            let mut line_items: Vec<LineItem> = deduped
                .for_client(&client.id)
                .map(|(_, delivery)| delivery)
                .filter_map(|delivery| {
                    let day = calendar.day_of(delivery.date);
                    if !month.contains(day) {
                        return None;
                    }
                    let price = timeline.price_or(delivery.milk_type, day, delivery.price_at_delivery);
                    Some(LineItem {
                        date: day,
                        milk_type: delivery.milk_type,
                        quantity: delivery.quantity,
                        price,
                        amount: price.for_quantity(delivery.quantity),
                    })
                })
                .collect();
            line_items.sort_by_key(|item| (item.date, item.milk_type));

            ClientStatement {
                client_id: client.id.clone(),
                client_name: client.name.clone(),
                total_quantity: line_items.iter().map(|item| item.quantity).sum(),
                total_amount: line_items.iter().map(|item| item.amount).sum(),
                line_items,
            }
        })
        .collect()
}

// =============================================================================
// Delivery History
// =============================================================================

/// One row of the delivery history listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HistoryRow {
    pub delivery_id: String,
    pub client_id: String,
    /// Client name, or "Unknown" if the client was deleted.
    pub client_name: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub milk_type: MilkType,
    pub quantity: Quantity,
    /// Cached write-time price, as stored.
    pub price_at_delivery: Money,
    pub total_amount: Money,
}

impl HistoryRow {
    /// Case-insensitive match on client name, or on the `dd/mm/yyyy` date.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }
        self.client_name
            .to_lowercase()
            .contains(&query.to_lowercase())
            || self.date.format("%d/%m/%Y").to_string().contains(query)
    }
}

/// Deliveries of `month`, newest first.
pub fn delivery_history(
    month: BillingMonth,
    clients: &[Client],
    deduped: &DedupedDeliveries,
    calendar: &BillingCalendar,
) -> Vec<HistoryRow> {
    let names: HashMap<&str, &str> = clients
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let mut rows: Vec<HistoryRow> = deduped
        .iter()
        .map(|(_, delivery)| delivery)
        .filter_map(|delivery| {
            let day = calendar.day_of(delivery.date);
            month.contains(day).then(|| HistoryRow {
                delivery_id: delivery.id.clone(),
                client_id: delivery.client_id.clone(),
                client_name: names
                    .get(delivery.client_id.as_str())
                    .copied()
                    .unwrap_or(UNKNOWN_CLIENT_NAME)
                    .to_string(),
                date: day,
                milk_type: delivery.milk_type,
                quantity: delivery.quantity,
                price_at_delivery: delivery.price_at_delivery,
                total_amount: delivery.total_amount,
            })
        })
        .collect();

    rows.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.client_name.cmp(&b.client_name))
            .then_with(|| a.milk_type.cmp(&b.milk_type))
    });
    rows
}

// =============================================================================
// Daily Summary
// =============================================================================

/// Dashboard figures for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailySummary {
    #[ts(as = "String")]
    pub day: NaiveDate,
    pub delivery_count: usize,
    pub client_count: usize,
    pub total_quantity: Quantity,
    pub revenue: Money,
}

/// Summarises `day`, pricing through the timeline with cached fallback.
pub fn daily_summary(
    day: NaiveDate,
    deduped: &DedupedDeliveries,
    timeline: &PriceTimeline,
) -> DailySummary {
    let mut clients = HashSet::new();
    let mut summary = DailySummary {
        day,
        delivery_count: 0,
        client_count: 0,
        total_quantity: Quantity::zero(),
        revenue: Money::zero(),
    };

    for (key, delivery) in deduped.on_day(day) {
        let price = timeline.price_or(key.milk_type, day, delivery.price_at_delivery);
        summary.delivery_count += 1;
        summary.total_quantity += delivery.quantity;
        summary.revenue += price.for_quantity(delivery.quantity);
        clients.insert(key.client_id.as_str());
    }

    summary.client_count = clients.len();
    summary
}

// =============================================================================
// Unit Tests
// =============================================================================
