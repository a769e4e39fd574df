//! # Delivery Repository
//!
//! Database operations for deliveries.
//!
//! ## Applying a Replacement Plan
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    DELETE each id in plan.to_delete    ← first: a crash here can lose   │
//! │                                          a record, never duplicate one  │
//! │    INSERT each draft in plan.to_insert                                  │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  A delete that matches no row means someone else changed the day since │
//! │  the plan was made: the transaction rolls back with TransactionFailed, │
//! │  and the caller re-reads the day and plans again.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use milkbook_core::{
    BillingCalendar, BillingMonth, Delivery, MilkType, Money, Quantity, ReplacementPlan,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, ReadCache};
use crate::error::{DbError, DbResult};
use crate::repository::{encode_timestamp, CANONICAL_TIMESTAMP_PATTERN};

#[derive(Debug, sqlx::FromRow)]
struct DeliveryRow {
    id: String,
    client_id: String,
    milk_type: Option<String>,
    date: String,
    quantity_ml: i64,
    price_at_delivery_paise: i64,
    total_amount_paise: i64,
    created_at: Option<String>,
}

impl DeliveryRow {
    fn into_delivery(self, calendar: &BillingCalendar) -> Delivery {
        let now = Utc::now();
        Delivery {
            client_id: self.client_id,
            milk_type: MilkType::from_stored(self.milk_type.as_deref()),
            date: calendar.recover_timestamp(&self.date, now, "date", &self.id),
            quantity: Quantity::from_millilitres(self.quantity_ml),
            price_at_delivery: Money::from_paise(self.price_at_delivery_paise),
            total_amount: Money::from_paise(self.total_amount_paise),
            created_at: calendar.recover_optional_timestamp(
                self.created_at.as_deref(),
                now,
                "created_at",
                &self.id,
            ),
            id: self.id,
        }
    }
}

/// Repository for delivery database operations.
#[derive(Debug, Clone)]
pub struct DeliveryRepository {
    pool: SqlitePool,
    cache: ReadCache,
    calendar: BillingCalendar,
}

impl DeliveryRepository {
    /// Creates a new DeliveryRepository.
    pub fn new(pool: SqlitePool, cache: ReadCache, calendar: BillingCalendar) -> Self {
        DeliveryRepository {
            pool,
            cache,
            calendar,
        }
    }

    /// Raw (not deduplicated) deliveries dated within `[start, end]`, ordered
    /// by date then id.
    ///
    /// Canonical dates are range-filtered in SQL. Legacy forms (epoch millis,
    /// offset suffixes, naive local times) can't be compared as text, so they
    /// are always fetched and filtered here after parsing; unparseable dates
    /// belong to no window.
    pub async fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<Delivery>> {
        let rows: Vec<DeliveryRow> = sqlx::query_as(
            r#"
            SELECT id, client_id, milk_type, date, quantity_ml,
                   price_at_delivery_paise, total_amount_paise, created_at
            FROM deliveries
            WHERE (date >= ?1 AND date <= ?2)
               OR date NOT LIKE ?3
            "#,
        )
        .bind(encode_timestamp(start))
        .bind(encode_timestamp(end))
        .bind(CANONICAL_TIMESTAMP_PATTERN)
        .fetch_all(&self.pool)
        .await?;

        let fetched = rows.len();
        let mut deliveries: Vec<Delivery> = rows
            .into_iter()
            .filter(|row| match self.calendar.parse_timestamp(&row.date) {
                Ok(date) => start <= date && date <= end,
                Err(e) => {
                    warn!(id = %row.id, error = %e, "Delivery date unreadable, left out of window");
                    false
                }
            })
            .map(|row| row.into_delivery(&self.calendar))
            .collect();
        deliveries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));

        debug!(
            fetched,
            count = deliveries.len(),
            start = %start,
            end = %end,
            "Loaded deliveries"
        );
        Ok(deliveries)
    }

    /// Raw deliveries of one local day.
    pub async fn list_for_day(&self, day: NaiveDate) -> DbResult<Vec<Delivery>> {
        self.list_between(self.calendar.start_of_day(day), self.calendar.end_of_day(day))
            .await
    }

    /// [`list_for_day`](Self::list_for_day) through the read cache (delivery
    /// sheet only).
    pub async fn list_for_day_cached(&self, day: NaiveDate) -> DbResult<Vec<Delivery>> {
        self.cache
            .get_or_load(CacheKey::Deliveries(day), || self.list_for_day(day))
            .await
    }

    /// Raw deliveries of one billing month.
    pub async fn list_for_month(&self, month: BillingMonth) -> DbResult<Vec<Delivery>> {
        self.list_between(
            self.calendar.start_of_day(month.first_day()),
            self.calendar.end_of_day(month.last_day()),
        )
        .await
    }

    /// Inserts a delivery as-is (imports and seeding).
    ///
    /// Does not enforce one record per key; use
    /// [`apply_plan`](Self::apply_plan) for operator writes.
    pub async fn insert(&self, delivery: &Delivery) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_delivery(&mut tx, delivery).await?;
        tx.commit().await?;

        self.cache
            .invalidate(&CacheKey::Deliveries(self.calendar.day_of(delivery.date)))
            .await;
        Ok(())
    }

    /// Applies a replacement plan in one transaction, deletes first.
    ///
    /// Returns the inserted records.
    pub async fn apply_plan(&self, plan: &ReplacementPlan) -> DbResult<Vec<Delivery>> {
        if plan.is_noop() {
            debug!(day = %plan.day, "Nothing to apply");
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;

        for id in &plan.to_delete {
            let result = sqlx::query("DELETE FROM deliveries WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                warn!(id = %id, day = %plan.day, "Delivery already gone, rolling back plan");
                return Err(DbError::TransactionFailed(format!(
                    "delivery {} changed since the plan was made",
                    id
                )));
            }
        }

        let now = Utc::now();
        let mut inserted = Vec::with_capacity(plan.to_insert.len());
        for draft in &plan.to_insert {
            let delivery = Delivery::from_draft(Uuid::new_v4().to_string(), draft.clone(), now);
            insert_delivery(&mut tx, &delivery).await?;
            inserted.push(delivery);
        }

        tx.commit().await?;

        info!(
            day = %plan.day,
            deleted = plan.to_delete.len(),
            inserted = inserted.len(),
            "Applied delivery plan"
        );
        self.cache.invalidate(&CacheKey::Deliveries(plan.day)).await;
        Ok(inserted)
    }
}

async fn insert_delivery(tx: &mut Transaction<'_, Sqlite>, delivery: &Delivery) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO deliveries (
            id, client_id, milk_type, date, quantity_ml,
            price_at_delivery_paise, total_amount_paise, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&delivery.id)
    .bind(&delivery.client_id)
    .bind(delivery.milk_type.as_str())
    .bind(encode_timestamp(delivery.date))
    .bind(delivery.quantity.millilitres())
    .bind(delivery.price_at_delivery.paise())
    .bind(delivery.total_amount.paise())
    .bind(delivery.created_at.map(encode_timestamp))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
