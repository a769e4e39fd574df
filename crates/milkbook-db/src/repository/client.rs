//! # Client Repository
//!
//! Database operations for clients.
//!
//! ## Client Lifecycle
//! ```text
//! create() ──► Active ──deactivate()──► Inactive
//!                │                          │
//!                └────────── delete() ──────┘   hard delete; deliveries keep
//!                                                the id and show "Unknown"
//! ```

use chrono::Utc;
use milkbook_core::validation::{validate_address, validate_client_name, validate_phone};
use milkbook_core::{BillingCalendar, Client, ClientStatus, CoreError};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{CacheKey, ReadCache};
use crate::error::{DbError, DbResult};
use crate::repository::encode_timestamp;

#[derive(Debug, sqlx::FromRow)]
struct ClientRow {
    id: String,
    name: String,
    address: String,
    phone: String,
    active: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl ClientRow {
    fn into_client(self, calendar: &BillingCalendar) -> Client {
        let now = Utc::now();
        Client {
            created_at: calendar.recover_timestamp(&self.created_at, now, "created_at", &self.id),
            updated_at: calendar.recover_timestamp(&self.updated_at, now, "updated_at", &self.id),
            status: ClientStatus::from_flag(self.active.map(|flag| flag != 0)),
            id: self.id,
            name: self.name,
            address: self.address,
            phone: self.phone,
        }
    }
}

const SELECT_CLIENTS: &str = r#"
    SELECT id, name, address, phone, active, created_at, updated_at
    FROM clients
"#;

fn validate_client(client: &Client) -> DbResult<()> {
    validate_client_name(&client.name).map_err(CoreError::from)?;
    validate_address(&client.address).map_err(CoreError::from)?;
    validate_phone(&client.phone).map_err(CoreError::from)?;
    Ok(())
}

/// Repository for client database operations.
#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
    cache: ReadCache,
    calendar: BillingCalendar,
}

impl ClientRepository {
    /// Creates a new ClientRepository.
    pub fn new(pool: SqlitePool, cache: ReadCache, calendar: BillingCalendar) -> Self {
        ClientRepository {
            pool,
            cache,
            calendar,
        }
    }

    async fn fetch(&self, filter: &str) -> DbResult<Vec<Client>> {
        let sql = format!("{} {} ORDER BY name COLLATE NOCASE, id", SELECT_CLIENTS, filter);
        let rows: Vec<ClientRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_client(&self.calendar))
            .collect())
    }

    /// Every client, active or not, sorted by name.
    pub async fn list(&self) -> DbResult<Vec<Client>> {
        self.fetch("").await
    }

    /// Active clients sorted by name (the delivery sheet and statement order).
    pub async fn list_active_sorted(&self) -> DbResult<Vec<Client>> {
        self.fetch("WHERE active IS NULL OR active <> 0").await
    }

    /// [`list_active_sorted`](Self::list_active_sorted) through the read cache.
    pub async fn list_active_cached(&self) -> DbResult<Vec<Client>> {
        let all: Vec<Client> = self
            .cache
            .get_or_load(CacheKey::Clients, || self.list())
            .await?;
        Ok(all.into_iter().filter(Client::is_active).collect())
    }

    /// Gets a client by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Client>> {
        let sql = format!("{} WHERE id = ?1", SELECT_CLIENTS);
        let row: Option<ClientRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.into_client(&self.calendar)))
    }

    /// Inserts a client after validating its fields.
    pub async fn insert(&self, client: &Client) -> DbResult<()> {
        validate_client(client)?;
        debug!(id = %client.id, name = %client.name, "Inserting client");

        sqlx::query(
            r#"
            INSERT INTO clients (id, name, address, phone, active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&client.id)
        .bind(client.name.trim())
        .bind(client.address.trim())
        .bind(client.phone.trim())
        .bind(client.status.as_flag())
        .bind(encode_timestamp(client.created_at))
        .bind(encode_timestamp(client.updated_at))
        .execute(&self.pool)
        .await?;

        self.cache.invalidate(&CacheKey::Clients).await;
        Ok(())
    }

    /// Creates an active client with a new id.
    pub async fn create(&self, name: &str, address: &str, phone: &str) -> DbResult<Client> {
        let now = Utc::now();
        let client = Client {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            address: address.trim().to_string(),
            phone: phone.trim().to_string(),
            status: ClientStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.insert(&client).await?;
        info!(id = %client.id, name = %client.name, "Client created");
        Ok(client)
    }

    /// Updates name, address, phone and status; bumps `updated_at`.
    pub async fn update(&self, client: &Client) -> DbResult<()> {
        validate_client(client)?;

        let result = sqlx::query(
            r#"
            UPDATE clients SET
                name = ?2,
                address = ?3,
                phone = ?4,
                active = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&client.id)
        .bind(client.name.trim())
        .bind(client.address.trim())
        .bind(client.phone.trim())
        .bind(client.status.as_flag())
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", &client.id));
        }

        self.cache.invalidate(&CacheKey::Clients).await;
        Ok(())
    }

    /// Marks a client inactive. Their deliveries and statements remain.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE clients SET active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(encode_timestamp(Utc::now()))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", id));
        }

        info!(id = %id, "Client deactivated");
        self.cache.invalidate(&CacheKey::Clients).await;
        Ok(())
    }

    /// Hard-deletes a client. Deliveries referencing it are kept.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", id));
        }

        info!(id = %id, "Client deleted");
        self.cache.invalidate(&CacheKey::Clients).await;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use crate::DbError;
    use milkbook_core::{ClientStatus, CoreError};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = db().await;
        let created = db
            .clients()
            .create("Asha", "12 MG Road", "9876543210")
            .await
            .unwrap();

        let loaded = db.clients().get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Asha");
        assert_eq!(loaded.status, ClientStatus::Active);
        assert!(db.clients().get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_sorted_excludes_inactive() {
        let db = db().await;
        let repo = db.clients();
        repo.create("zoya", "Pune", "9876543210").await.unwrap();
        let bina = repo.create("Bina", "Pune", "9876543211").await.unwrap();
        repo.create("asha", "Pune", "9876543212").await.unwrap();

        repo.deactivate(&bina.id).await.unwrap();

        let names: Vec<String> = repo
            .list_active_sorted()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["asha", "zoya"]);
        assert_eq!(repo.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_legacy_null_active_is_active() {
        let db = db().await;
        sqlx::query(
            "INSERT INTO clients (id, name, address, phone, active, created_at, updated_at)
             VALUES ('legacy', 'Old', 'Pune', '9876543210', NULL, 'garbage', '2024-01-01')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let clients = db.clients().list_active_sorted().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert!(clients[0].is_active());
    }

    #[tokio::test]
    async fn test_cache_invalidated_on_mutation() {
        let db = db().await;
        let repo = db.clients();
        let asha = repo.create("Asha", "Pune", "9876543210").await.unwrap();

        assert_eq!(repo.list_active_cached().await.unwrap().len(), 1);
        repo.deactivate(&asha.id).await.unwrap();
        assert!(repo.list_active_cached().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = db().await;
        let repo = db.clients();
        let mut asha = repo.create("Asha", "Pune", "9876543210").await.unwrap();

        asha.phone = "020-2345678".to_string();
        repo.update(&asha).await.unwrap();
        assert_eq!(repo.get_by_id(&asha.id).await.unwrap().unwrap().phone, "020-2345678");

        repo.delete(&asha.id).await.unwrap();
        assert!(matches!(
            repo.delete(&asha.id).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_client_rejected() {
        let db = db().await;
        let err = db.clients().create("", "Pune", "9876543210").await.unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::Validation(_))));
    }
}
