//! # Application Configuration
//!
//! Defaults overridden by `MILKBOOK_*` environment variables.
//!
//! | Variable                      | Default                          |
//! |-------------------------------|----------------------------------|
//! | `MILKBOOK_DB_PATH`            | `<platform data dir>/milkbook.db`|
//! | `MILKBOOK_UTC_OFFSET_MINUTES` | `330` (IST)                      |
//! | `MILKBOOK_CACHE_TTL_SECS`     | `300`                            |
//! | `MILKBOOK_BUSINESS_NAME`      | `MilkBook Dairy`                 |

use directories::ProjectDirs;
use milkbook_core::{BillingCalendar, DEFAULT_UTC_OFFSET_MINUTES};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pool::DbConfig;

const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file.
    pub database_path: PathBuf,

    /// Minutes east of UTC used for day bucketing.
    pub utc_offset_minutes: i32,

    /// Lifetime of read cache entries.
    pub cache_ttl: Duration,

    /// Shown on statements.
    pub business_name: String,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_path = match lookup("MILKBOOK_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_database_path()?,
        };

        let utc_offset_minutes: i32 = lookup("MILKBOOK_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|| DEFAULT_UTC_OFFSET_MINUTES.to_string())
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue("MILKBOOK_UTC_OFFSET_MINUTES".to_string()))?;

        let cache_ttl_secs: u64 = lookup("MILKBOOK_CACHE_TTL_SECS")
            .unwrap_or_else(|| DEFAULT_CACHE_TTL_SECS.to_string())
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue("MILKBOOK_CACHE_TTL_SECS".to_string()))?;

        let config = AppConfig {
            database_path,
            utc_offset_minutes,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            business_name: lookup("MILKBOOK_BUSINESS_NAME")
                .unwrap_or_else(|| "MilkBook Dairy".to_string()),
        };

        // Reject offsets chrono can't represent
        config.calendar()?;

        Ok(config)
    }

    /// Calendar for the configured offset.
    pub fn calendar(&self) -> Result<BillingCalendar, ConfigError> {
        BillingCalendar::from_offset_minutes(self.utc_offset_minutes)
            .map_err(|_| ConfigError::InvalidValue("MILKBOOK_UTC_OFFSET_MINUTES".to_string()))
    }

    /// Database configuration derived from this config.
    pub fn db_config(&self) -> Result<DbConfig, ConfigError> {
        Ok(DbConfig::new(&self.database_path)
            .calendar(self.calendar()?)
            .cache_ttl(self.cache_ttl))
    }
}

/// Determines the database file path based on the platform.
///
/// ## Platform-Specific Paths
/// - **macOS**: `~/Library/Application Support/com.milkbook.app/milkbook.db`
/// - **Windows**: `%APPDATA%\milkbook\app\data\milkbook.db`
/// - **Linux**: `~/.local/share/app/milkbook.db`
fn default_database_path() -> Result<PathBuf, ConfigError> {
    let dirs = ProjectDirs::from("com", "milkbook", "app")
        .ok_or_else(|| ConfigError::MissingRequired("MILKBOOK_DB_PATH".to_string()))?;
    Ok(dirs.data_dir().join("milkbook.db"))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

// =============================================================================
// Unit Tests
// =============================================================================
