//! # Read Cache
//!
//! Short-lived snapshots for screens that re-read the same lists (the client
//! picker, the price page, the delivery sheet of one day).
//!
//! ## Invalidation Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Mutation                         Invalidates                           │
//! │  ───────────────────────────────  ──────────────────────────────────    │
//! │  insert / update / deactivate /   CacheKey::Clients                     │
//! │  delete client                                                          │
//! │  apply price change               CacheKey::Prices                      │
//! │  insert delivery / apply plan     CacheKey::Deliveries(day)             │
//! │                                                                         │
//! │  Statements, history and summaries never read from here: reporting     │
//! │  always takes a fresh snapshot from storage.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries are stored as `serde_json::Value` so one cache can hold every list
//! type; they expire after the configured TTL.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::DbResult;

/// What a cache entry holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Every client.
    Clients,
    /// Every price period.
    Prices,
    /// Deliveries stored for one local day.
    Deliveries(NaiveDate),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Clients => f.write_str("clients"),
            CacheKey::Prices => f.write_str("prices"),
            CacheKey::Deliveries(day) => write!(f, "deliveries_{}", day),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    stored_at: Instant,
    value: serde_json::Value,
}

/// TTL cache shared by every repository of one [`Database`](crate::Database).
///
/// Cloning is cheap; clones share entries.
#[derive(Debug, Clone)]
pub struct ReadCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    ttl: Duration,
}

impl ReadCache {
    /// Creates an empty cache. A zero TTL disables caching.
    pub fn new(ttl: Duration) -> Self {
        ReadCache {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a fresh entry, or `None` if missing, expired or unreadable.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;

        if entry.stored_at.elapsed() >= self.ttl {
            debug!(key = %key, "Cache entry expired");
            return None;
        }

        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Unreadable cache entry");
                None
            }
        }
    }

    /// Stores a snapshot under `key`.
    pub async fn put<T: Serialize>(&self, key: CacheKey, value: &T) {
        if self.ttl.is_zero() {
            return;
        }
        match serde_json::to_value(value) {
            Ok(value) => {
                let entry = CacheEntry {
                    stored_at: Instant::now(),
                    value,
                };
                self.entries.write().await.insert(key, entry);
            }
            Err(e) => warn!(key = %key, error = %e, "Could not cache snapshot"),
        }
    }

    /// Returns the cached value, or loads, stores and returns it.
    pub async fn get_or_load<T, F, Fut>(&self, key: CacheKey, load: F) -> DbResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = load().await?;
        self.put(key, &value).await;
        Ok(value)
    }

    /// Drops one entry. Called after every mutation touching `key`.
    pub async fn invalidate(&self, key: &CacheKey) {
        if self.entries.write().await.remove(key).is_some() {
            debug!(key = %key, "Cache invalidated");
        }
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let cache = ReadCache::new(Duration::from_secs(60));
        cache.put(CacheKey::Clients, &vec!["asha".to_string()]).await;

        let hit: Option<Vec<String>> = cache.get(&CacheKey::Clients).await;
        assert_eq!(hit, Some(vec!["asha".to_string()]));

        cache.invalidate(&CacheKey::Clients).await;
        let miss: Option<Vec<String>> = cache.get(&CacheKey::Clients).await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = ReadCache::new(Duration::from_secs(60));
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let other = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();

        cache.put(CacheKey::Deliveries(day), &1u32).await;
        cache.put(CacheKey::Deliveries(other), &2u32).await;
        cache.invalidate(&CacheKey::Deliveries(day)).await;

        assert_eq!(cache.get::<u32>(&CacheKey::Deliveries(day)).await, None);
        assert_eq!(cache.get::<u32>(&CacheKey::Deliveries(other)).await, Some(2));
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let cache = ReadCache::new(Duration::ZERO);
        cache.put(CacheKey::Prices, &5u32).await;
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.get::<u32>(&CacheKey::Prices).await, None);
    }

    #[tokio::test]
    async fn test_get_or_load_loads_once() {
        let cache = ReadCache::new(Duration::from_secs(60));
        let first: u32 = cache.get_or_load(CacheKey::Prices, || async { Ok(7) }).await.unwrap();
        let second: u32 = cache
            .get_or_load(CacheKey::Prices, || async { Ok(99) })
            .await
            .unwrap();
        assert_eq!((first, second), (7, 7));
    }

    #[test]
    fn test_key_display() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(CacheKey::Deliveries(day).to_string(), "deliveries_2024-03-05");
    }
}
