//! # Billing Service
//!
//! Operator-level operations: read a fresh snapshot, run it through
//! milkbook-core, apply the resulting plan.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  monthly_statements(March)                                              │
//! │    clients ◄── storage          prices ◄── storage                      │
//! │    deliveries of March ◄── storage (raw, maybe duplicated)              │
//! │         │                          │                                    │
//! │         ▼                          ▼                                    │
//! │      dedupe ───────────────► StatementBook ◄── PriceTimeline            │
//! │                                                                         │
//! │  save_day(5 March, desired)                                             │
//! │    deliveries of 5 March + prices ◄── storage                           │
//! │         │                                                               │
//! │         ▼                                                               │
//! │    plan_replacement ──► apply_plan (one transaction, deletes first)     │
//! │         ▲                    │                                          │
//! │         └── stale? re-read ──┘   (up to MAX_WRITE_ATTEMPTS)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reports and write plans never read the cache: they are computed from what
//! storage holds right now. Only the display reads
//! ([`BillingService::day_entries`], [`BillingService::current_prices`]) go
//! through it.

use chrono::{DateTime, NaiveDate, Utc};
use milkbook_core::{
    daily_summary, dedupe_with_report, delivery_history, plan_clear_day, plan_price_change,
    plan_replacement, BillingCalendar, BillingMonth, Client, DailySummary, DedupedDeliveries,
    Delivery, DesiredEntries, HistoryRow, MilkType, Money, Price, PriceTimeline, ReplacementPlan,
    StatementBook,
};
use std::collections::HashSet;
use std::future::Future;
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;

/// Attempts for a write whose plan went stale between read and commit.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Billing operations over a [`Database`].
#[derive(Debug, Clone)]
pub struct BillingService {
    db: Database,
}

impl BillingService {
    pub fn new(db: Database) -> Self {
        BillingService { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn calendar(&self) -> BillingCalendar {
        self.db.calendar()
    }

    async fn timeline(&self) -> DbResult<PriceTimeline> {
        let prices = self.db.prices().list().await?;
        Ok(PriceTimeline::build(&prices, &self.calendar()))
    }

    fn dedupe(&self, raw: Vec<Delivery>) -> DedupedDeliveries {
        let (deduped, report) = dedupe_with_report(raw, &self.calendar());
        if !report.discarded_ids.is_empty() {
            info!(
                raw = report.raw_count,
                kept = report.kept,
                discarded = report.discarded_ids.len(),
                "Duplicate deliveries reconciled"
            );
        }
        deduped
    }

    async fn deduped_month(&self, month: BillingMonth) -> DbResult<DedupedDeliveries> {
        let raw = self.db.deliveries().list_for_month(month).await?;
        Ok(self.dedupe(raw))
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Statements for every active client (sorted by name), plus inactive
    /// clients who still received milk that month.
    pub async fn monthly_statements(&self, month: BillingMonth) -> DbResult<StatementBook> {
        let deduped = self.deduped_month(month).await?;
        let timeline = self.timeline().await?;

        let delivered: HashSet<&str> = deduped
            .iter()
            .map(|(key, _)| key.client_id.as_str())
            .collect();
        let clients: Vec<Client> = self
            .db
            .clients()
            .list()
            .await?
            .into_iter()
            .filter(|c| c.is_active() || delivered.contains(c.id.as_str()))
            .collect();

        Ok(StatementBook::build(
            month,
            &clients,
            &deduped,
            &timeline,
            &self.calendar(),
        ))
    }

    /// Deliveries of the month, newest first.
    pub async fn history(&self, month: BillingMonth) -> DbResult<Vec<HistoryRow>> {
        let deduped = self.deduped_month(month).await?;
        let clients = self.db.clients().list().await?;
        Ok(delivery_history(month, &clients, &deduped, &self.calendar()))
    }

    /// Dashboard figures for one day.
    pub async fn daily_summary(&self, day: NaiveDate) -> DbResult<DailySummary> {
        let raw = self.db.deliveries().list_for_day(day).await?;
        let deduped = self.dedupe(raw);
        let timeline = self.timeline().await?;
        Ok(daily_summary(day, &deduped, &timeline))
    }

    /// Current quantities of one day, for pre-filling the delivery sheet.
    ///
    /// Reads through the cache; the result is only shown, never billed.
    pub async fn day_entries(&self, day: NaiveDate) -> DbResult<DesiredEntries> {
        let raw = self.db.deliveries().list_for_day_cached(day).await?;
        Ok(self
            .dedupe(raw)
            .into_vec()
            .into_iter()
            .map(|d| ((d.client_id, d.milk_type), d.quantity))
            .collect())
    }

    /// Open price periods, one per milk type at most, for the price page.
    ///
    /// Reads through the cache, like [`day_entries`](Self::day_entries).
    pub async fn current_prices(&self) -> DbResult<Vec<Price>> {
        let prices = self.db.prices().list_cached().await?;
        Ok(prices.into_iter().filter(Price::is_current).collect())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Replaces the deliveries of `day` for every entry in `desired`.
    ///
    /// ## Errors
    /// - `Core(MissingPrice)` if a milk type with quantity > 0 has no price
    /// - `Core(Validation)` for negative quantities
    /// - `TransactionFailed` if the day kept changing underneath
    pub async fn save_day(
        &self,
        day: NaiveDate,
        desired: &DesiredEntries,
    ) -> DbResult<ReplacementPlan> {
        let plan = retry_stale(move || async move {
            let existing = self.db.deliveries().list_for_day(day).await?;
            let timeline = self.timeline().await?;
            let plan = plan_replacement(day, desired, &existing, &timeline, &self.calendar())?;
            self.db.deliveries().apply_plan(&plan).await?;
            Ok::<_, DbError>(plan)
        })
        .await?;

        info!(
            day = %day,
            deleted = plan.to_delete.len(),
            inserted = plan.to_insert.len(),
            "Saved deliveries"
        );
        Ok(plan)
    }

    /// Removes every delivery of `day`.
    pub async fn clear_day(&self, day: NaiveDate) -> DbResult<ReplacementPlan> {
        let plan = retry_stale(move || async move {
            let existing = self.db.deliveries().list_for_day(day).await?;
            let plan = plan_clear_day(day, &existing, &self.calendar());
            self.db.deliveries().apply_plan(&plan).await?;
            Ok::<_, DbError>(plan)
        })
        .await?;

        info!(day = %day, deleted = plan.to_delete.len(), "Cleared day");
        Ok(plan)
    }

    /// Sets a new current price, effective now.
    pub async fn set_price(&self, milk_type: MilkType, amount: Money) -> DbResult<Price> {
        self.set_price_at(milk_type, amount, Utc::now()).await
    }

    /// Sets a new current price effective at `now`.
    pub async fn set_price_at(
        &self,
        milk_type: MilkType,
        amount: Money,
        now: DateTime<Utc>,
    ) -> DbResult<Price> {
        retry_stale(move || async move {
            let prices = self.db.prices().list().await?;
            let change = plan_price_change(&prices, milk_type, amount, now)?;
            self.db.prices().apply_change(&change).await?;
            Ok::<_, DbError>(change.open)
        })
        .await
    }
}

/// Re-runs a read-plan-apply cycle while it fails with a retryable error.
async fn retry_stale<T, F, Fut>(mut attempt: F) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(e) if e.is_retryable() && tries < MAX_WRITE_ATTEMPTS => {
                warn!(attempt = tries, error = %e, "Write plan went stale, retrying");
            }
            result => return result,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use chrono::TimeZone;
    use milkbook_core::{CoreError, Quantity, UNKNOWN_CLIENT_NAME};

    async fn service() -> BillingService {
        BillingService::new(Database::new(DbConfig::in_memory()).await.unwrap())
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn march() -> BillingMonth {
        BillingMonth::new(2024, 3).unwrap()
    }

    fn feb_28_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 28, 6, 30, 0).unwrap()
    }

    fn desired(entries: &[(&str, MilkType, f64)]) -> DesiredEntries {
        entries
            .iter()
            .map(|(client, milk, litres)| {
                ((client.to_string(), *milk), Quantity::from_litres(*litres))
            })
            .collect()
    }

    async fn with_clients(svc: &BillingService) -> (Client, Client) {
        let clients = svc.database().clients();
        let asha = clients.create("Asha", "Pune", "9876543210").await.unwrap();
        let bina = clients.create("Bina", "Pune", "9876543211").await.unwrap();
        (asha, bina)
    }

    #[tokio::test]
    async fn test_save_day_and_statement() {
        let svc = service().await;
        let (asha, bina) = with_clients(&svc).await;
        svc.set_price_at(MilkType::Cow, Money::from_rupees(50), feb_28_noon())
            .await
            .unwrap();

        svc.save_day(day(2024, 3, 5), &desired(&[(asha.id.as_str(), MilkType::Cow, 2.0)]))
            .await
            .unwrap();
        // Re-entering the day replaces, never duplicates
        let plan = svc
            .save_day(
                day(2024, 3, 5),
                &desired(&[(asha.id.as_str(), MilkType::Cow, 0.0), (bina.id.as_str(), MilkType::Cow, 4.0)]),
            )
            .await
            .unwrap();
        assert_eq!(plan.to_delete.len(), 1);
        assert_eq!(plan.to_insert.len(), 1);

        let stored = svc.database().deliveries().list_for_day(day(2024, 3, 5)).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].client_id, bina.id);

        let book = svc.monthly_statements(march()).await.unwrap();
        assert_eq!(book.statements.len(), 2);
        assert_eq!(book.statements[0].client_name, "Asha");
        assert_eq!(book.statements[0].total_amount, Money::zero());
        assert_eq!(book.statements[1].total_amount, Money::from_rupees(200));
        assert_eq!(book.grand_total_amount(), Money::from_rupees(200));
    }

    #[tokio::test]
    async fn test_save_day_without_price_fails() {
        let svc = service().await;
        let (asha, _) = with_clients(&svc).await;

        let err = svc
            .save_day(day(2024, 3, 5), &desired(&[(asha.id.as_str(), MilkType::Buffalo, 1.0)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::MissingPrice { milk_type: MilkType::Buffalo, .. })
        ));
        assert!(svc
            .database()
            .deliveries()
            .list_for_day(day(2024, 3, 5))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_reconciled_in_statement() {
        let svc = service().await;
        let (asha, _) = with_clients(&svc).await;
        svc.set_price_at(MilkType::Cow, Money::from_rupees(50), feb_28_noon())
            .await
            .unwrap();

        let calendar = svc.database().calendar();
        let repo = svc.database().deliveries();
        for (id, litres, minute) in [("d1", 2, 0), ("d2", 3, 5)] {
            let quantity = Quantity::from_whole_litres(litres);
            repo.insert(&Delivery {
                id: id.to_string(),
                client_id: asha.id.clone(),
                milk_type: MilkType::Cow,
                date: calendar.local_midnight(day(2024, 3, 5)),
                quantity,
                price_at_delivery: Money::from_rupees(50),
                total_amount: Money::from_rupees(50).for_quantity(quantity),
                created_at: Some(Utc.with_ymd_and_hms(2024, 3, 5, 2, minute, 0).unwrap()),
            })
            .await
            .unwrap();
        }

        let book = svc.monthly_statements(march()).await.unwrap();
        let asha_statement = &book.statements[0];
        assert_eq!(asha_statement.total_quantity, Quantity::from_whole_litres(3));
        assert_eq!(asha_statement.total_amount, Money::from_rupees(150));
    }

    #[tokio::test]
    async fn test_clear_day() {
        let svc = service().await;
        let (asha, bina) = with_clients(&svc).await;
        svc.set_price_at(MilkType::Cow, Money::from_rupees(50), feb_28_noon())
            .await
            .unwrap();
        svc.save_day(
            day(2024, 3, 5),
            &desired(&[(asha.id.as_str(), MilkType::Cow, 1.0), (bina.id.as_str(), MilkType::Cow, 1.5)]),
        )
        .await
        .unwrap();
        svc.save_day(day(2024, 3, 6), &desired(&[(asha.id.as_str(), MilkType::Cow, 1.0)]))
            .await
            .unwrap();

        let plan = svc.clear_day(day(2024, 3, 5)).await.unwrap();
        assert_eq!(plan.to_delete.len(), 2);
        assert_eq!(svc.daily_summary(day(2024, 3, 5)).await.unwrap().delivery_count, 0);
        assert_eq!(svc.daily_summary(day(2024, 3, 6)).await.unwrap().delivery_count, 1);
    }

    #[tokio::test]
    async fn test_price_change_applies_from_change_day() {
        let svc = service().await;
        let (asha, _) = with_clients(&svc).await;
        svc.set_price_at(MilkType::Cow, Money::from_rupees(50), feb_28_noon())
            .await
            .unwrap();
        svc.save_day(day(2024, 3, 5), &desired(&[(asha.id.as_str(), MilkType::Cow, 1.0)]))
            .await
            .unwrap();

        let change_at = Utc.with_ymd_and_hms(2024, 3, 10, 3, 0, 0).unwrap();
        svc.set_price_at(MilkType::Cow, Money::from_rupees(60), change_at)
            .await
            .unwrap();
        svc.save_day(day(2024, 3, 12), &desired(&[(asha.id.as_str(), MilkType::Cow, 1.0)]))
            .await
            .unwrap();

        let book = svc.monthly_statements(march()).await.unwrap();
        let prices: Vec<Money> = book.statements[0].line_items.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![Money::from_rupees(50), Money::from_rupees(60)]);

        let current: Vec<Price> = svc
            .database()
            .prices()
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(Price::is_current)
            .collect();
        assert_eq!(current.len(), 1);
    }

    #[tokio::test]
    async fn test_backdated_price_rejected() {
        let svc = service().await;
        let change_at = Utc.with_ymd_and_hms(2024, 3, 10, 3, 0, 0).unwrap();
        svc.set_price_at(MilkType::Cow, Money::from_rupees(60), change_at)
            .await
            .unwrap();

        let err = svc
            .set_price_at(MilkType::Cow, Money::from_rupees(55), feb_28_noon())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::OverlappingPrice { .. })));
    }

    #[tokio::test]
    async fn test_history_and_inactive_clients() {
        let svc = service().await;
        let (asha, bina) = with_clients(&svc).await;
        svc.set_price_at(MilkType::Cow, Money::from_rupees(50), feb_28_noon())
            .await
            .unwrap();
        svc.save_day(
            day(2024, 3, 5),
            &desired(&[(asha.id.as_str(), MilkType::Cow, 1.0), (bina.id.as_str(), MilkType::Cow, 2.0)]),
        )
        .await
        .unwrap();

        svc.database().clients().deactivate(&asha.id).await.unwrap();
        svc.database().clients().delete(&bina.id).await.unwrap();

        // Inactive Asha still billed for March; deleted Bina is an orphan
        let book = svc.monthly_statements(march()).await.unwrap();
        assert_eq!(book.statements.len(), 1);
        assert_eq!(book.statements[0].client_id, asha.id);
        assert_eq!(book.orphaned, 1);

        let rows = svc.history(march()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.client_name == UNKNOWN_CLIENT_NAME));
    }

    #[tokio::test]
    async fn test_day_entries_follow_saves() {
        let svc = service().await;
        let (asha, _) = with_clients(&svc).await;
        svc.set_price_at(MilkType::Cow, Money::from_rupees(50), feb_28_noon())
            .await
            .unwrap();

        assert!(svc.day_entries(day(2024, 3, 5)).await.unwrap().is_empty());
        svc.save_day(day(2024, 3, 5), &desired(&[(asha.id.as_str(), MilkType::Cow, 1.5)]))
            .await
            .unwrap();

        let entries = svc.day_entries(day(2024, 3, 5)).await.unwrap();
        assert_eq!(
            entries.get(&(asha.id.clone(), MilkType::Cow)),
            Some(&Quantity::from_litres(1.5))
        );
    }

    #[tokio::test]
    async fn test_current_prices_follow_price_changes() {
        let svc = service().await;
        assert!(svc.current_prices().await.unwrap().is_empty());

        svc.set_price_at(MilkType::Cow, Money::from_rupees(50), feb_28_noon())
            .await
            .unwrap();
        let change_at = Utc.with_ymd_and_hms(2024, 3, 10, 3, 0, 0).unwrap();
        svc.set_price_at(MilkType::Cow, Money::from_rupees(60), change_at)
            .await
            .unwrap();

        let current = svc.current_prices().await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].amount, Money::from_rupees(60));
    }
}
