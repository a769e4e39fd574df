//! # Error Types
//!
//! Domain-specific error types for milkbook-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  milkbook-core errors (this file)                                      │
//! │  ├── CoreError        - Billing domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  milkbook-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures (wraps CoreError)  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller / operator       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Read Path vs Write Path
//! Reporting (dedupe, timeline lookups, statements) never fails on bad data:
//! it falls back and logs. Writing (replacement plans, price changes) fails
//! loudly, because a delivery stored with a wrong or zero price is worse than
//! a blocked write.
//!
//! There is deliberately no "ambiguous duplicate" error: duplicate delivery
//! records are always resolved deterministically.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::types::MilkType;

// =============================================================================
// Core Error
// =============================================================================

/// Core billing errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A write needs a price for a milk type and none covers the day.
    ///
    /// ## When This Occurs
    /// - Saving deliveries before any price was ever set for that milk type
    /// - Saving deliveries for a day before the first price period started
    ///
    /// ## User Workflow
    /// ```text
    /// Save day (Bina: buffalo 2 L)
    ///      │
    ///      ▼
    /// No buffalo price covers 2024-03-05
    ///      │
    ///      ▼
    /// MissingPrice { milk_type: Buffalo, day: 2024-03-05 }
    ///      │
    ///      ▼
    /// Operator sets a buffalo price, then saves again
    /// ```
    #[error("No current price for {milk_type} milk on {day}; set a price first")]
    MissingPrice { milk_type: MilkType, day: NaiveDate },

    /// A stored date field could not be parsed.
    ///
    /// Only strict parsing returns this; reporting paths recover by
    /// substituting a default and logging.
    #[error("Malformed timestamp in {field}: '{raw}'")]
    MalformedTimestamp { field: String, raw: String },

    /// A new price period would overlap an existing one.
    #[error("New {milk_type} price starting {start} overlaps price {conflicting_id}")]
    OverlappingPrice {
        milk_type: MilkType,
        start: DateTime<Utc>,
        conflicting_id: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a MalformedTimestamp error.
    pub fn malformed_timestamp(field: impl Into<String>, raw: impl Into<String>) -> Self {
        CoreError::MalformedTimestamp {
            field: field.into(),
            raw: raw.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when operator input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid month).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
