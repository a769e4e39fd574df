//! # milkbook-db: Storage Layer for MilkBook
//!
//! This crate provides database access for MilkBook.
//! It uses SQLite for local storage with sqlx for async operations, and
//! hands every snapshot to milkbook-core for the billing math.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MilkBook Data Flow                               │
//! │                                                                         │
//! │  Operator action (save day, set price, print statements)                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   milkbook-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │ BillingService│    │  Repositories │    │  Migrations  │   │   │
//! │  │   │ (billing.rs)  │───►│ ClientRepo    │    │  (embedded)  │   │   │
//! │  │   │               │    │ PriceRepo     │    │ 001_init.sql │   │   │
//! │  │   │ plan + apply  │    │ DeliveryRepo  │    │              │   │   │
//! │  │   └───────┬───────┘    └───────┬───────┘    └──────────────┘   │   │
//! │  │           │                    │  ReadCache (display only)     │   │
//! │  │           ▼                    ▼                                │   │
//! │  │     milkbook-core        Database (pool.rs, SqlitePool)         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/Library/Application Support/com.milkbook.app/milkbook.db    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`billing`] - Statements, history and day saves over fresh snapshots
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`cache`] - TTL read cache for display lists
//! - [`config`] - Environment configuration
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (client, price, delivery)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use milkbook_db::{AppConfig, BillingService, Database};
//! use milkbook_core::BillingMonth;
//!
//! let config = AppConfig::from_env()?;
//! let db = Database::new(config.db_config()?).await?;
//!
//! let billing = BillingService::new(db);
//! let book = billing.monthly_statements(BillingMonth::new(2024, 3)?).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod billing;
pub mod cache;
pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use billing::BillingService;
pub use cache::{CacheKey, ReadCache};
pub use config::{AppConfig, ConfigError};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::client::ClientRepository;
pub use repository::delivery::DeliveryRepository;
pub use repository::price::PriceRepository;
