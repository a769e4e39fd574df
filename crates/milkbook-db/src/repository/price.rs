//! # Price Repository
//!
//! Database operations for price periods.
//!
//! A price change is two writes (close the current period, open the new one)
//! and always runs in one transaction. Closing only matches rows that are
//! still open, so a change planned from a stale read rolls back instead of
//! leaving two current prices.

use chrono::Utc;
use milkbook_core::{BillingCalendar, MilkType, Money, Price, PriceChange};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, ReadCache};
use crate::error::{DbError, DbResult};
use crate::repository::encode_timestamp;

#[derive(Debug, sqlx::FromRow)]
struct PriceRow {
    id: String,
    amount_paise: i64,
    milk_type: Option<String>,
    start_date: String,
    end_date: Option<String>,
    created_at: Option<String>,
}

impl PriceRow {
    fn into_price(self, calendar: &BillingCalendar) -> Price {
        let now = Utc::now();
        Price {
            amount: Money::from_paise(self.amount_paise),
            milk_type: MilkType::from_stored(self.milk_type.as_deref()),
            start_date: calendar.recover_timestamp(&self.start_date, now, "start_date", &self.id),
            end_date: calendar.recover_optional_timestamp(
                self.end_date.as_deref(),
                now,
                "end_date",
                &self.id,
            ),
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

/// Repository for price database operations.
#[derive(Debug, Clone)]
pub struct PriceRepository {
    pool: SqlitePool,
    cache: ReadCache,
    calendar: BillingCalendar,
}

impl PriceRepository {
    /// Creates a new PriceRepository.
    pub fn new(pool: SqlitePool, cache: ReadCache, calendar: BillingCalendar) -> Self {
        PriceRepository {
            pool,
            cache,
            calendar,
        }
    }

    /// Every price period, newest start first.
    pub async fn list(&self) -> DbResult<Vec<Price>> {
        let rows: Vec<PriceRow> = sqlx::query_as(
            r#"
            SELECT id, amount_paise, milk_type, start_date, end_date, created_at
            FROM prices
            ORDER BY start_date DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_price(&self.calendar))
            .collect())
    }

    /// [`list`](Self::list) through the read cache (price page only).
    pub async fn list_cached(&self) -> DbResult<Vec<Price>> {
        self.cache
            .get_or_load(CacheKey::Prices, || self.list())
            .await
    }

    /// Inserts a price period as-is (imports and seeding).
    pub async fn insert(&self, price: &Price) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_price(&mut tx, price).await?;
        tx.commit().await?;

        self.cache.invalidate(&CacheKey::Prices).await;
        Ok(())
    }

    /// Applies a planned price change atomically.
    ///
    /// ## Errors
    /// - `TransactionFailed` if a period to close is no longer open (retryable)
    pub async fn apply_change(&self, change: &PriceChange) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        for closed in &change.close {
            let result = sqlx::query(
                "UPDATE prices SET end_date = ?2 WHERE id = ?1 AND end_date IS NULL",
            )
            .bind(&closed.id)
            .bind(encode_timestamp(closed.end_date))
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                warn!(id = %closed.id, "Price period already closed, rolling back change");
                return Err(DbError::TransactionFailed(format!(
                    "price {} is no longer current",
                    closed.id
                )));
            }
            debug!(id = %closed.id, end_date = %closed.end_date, "Closed price period");
        }

        insert_price(&mut tx, &change.open).await?;
        tx.commit().await?;

        info!(
            id = %change.open.id,
            milk_type = %change.open.milk_type,
            amount = %change.open.amount,
            "New current price"
        );
        self.cache.invalidate(&CacheKey::Prices).await;
        Ok(())
    }
}

async fn insert_price(tx: &mut Transaction<'_, Sqlite>, price: &Price) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO prices (id, amount_paise, milk_type, start_date, end_date, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&price.id)
    .bind(price.amount.paise())
    .bind(price.milk_type.as_str())
    .bind(encode_timestamp(price.start_date))
    .bind(price.end_date.map(encode_timestamp))
    .bind(price.created_at.map(encode_timestamp))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use crate::DbError;
    use chrono::{Duration, TimeZone, Utc};
    use milkbook_core::{plan_price_change, MilkType, Money, Price};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_apply_change_closes_and_opens() {
        let db = db().await;
        let repo = db.prices();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let old = Price::new("old", Money::from_rupees(50), MilkType::Cow, now - Duration::days(30), None);
        repo.insert(&old).await.unwrap();

        let prices = repo.list().await.unwrap();
        let change = plan_price_change(&prices, MilkType::Cow, Money::from_rupees(55), now).unwrap();
        repo.apply_change(&change).await.unwrap();

        let prices = repo.list().await.unwrap();
        assert_eq!(prices.len(), 2);
        let current: Vec<&Price> = prices.iter().filter(|p| p.is_current()).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].amount, Money::from_rupees(55));
        let closed = prices.iter().find(|p| p.id == "old").unwrap();
        assert_eq!(closed.end_date, Some(now));
    }

    #[tokio::test]
    async fn test_stale_change_rolls_back() {
        let db = db().await;
        let repo = db.prices();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        repo.insert(&Price::new("old", Money::from_rupees(50), MilkType::Cow, now - Duration::days(30), None))
            .await
            .unwrap();

        let snapshot = repo.list().await.unwrap();
        let first = plan_price_change(&snapshot, MilkType::Cow, Money::from_rupees(55), now).unwrap();
        let second = plan_price_change(&snapshot, MilkType::Cow, Money::from_rupees(60), now).unwrap();

        repo.apply_change(&first).await.unwrap();
        let err = repo.apply_change(&second).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionFailed(_)));
        assert!(err.is_retryable());

        let prices = repo.list().await.unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices.iter().filter(|p| p.is_current()).count(), 1);
    }

    #[tokio::test]
    async fn test_legacy_null_milk_type_reads_as_cow() {
        let db = db().await;
        sqlx::query(
            "INSERT INTO prices (id, amount_paise, milk_type, start_date) VALUES ('p', 4500, NULL, '2023-01-01')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let prices = db.prices().list().await.unwrap();
        assert_eq!(prices[0].milk_type, MilkType::Cow);
        assert!(prices[0].created_at.is_none());
    }
}
