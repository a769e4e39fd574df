//! # Validation Module
//!
//! Input validation utilities for MilkBook.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Operator forms                                               │
//! │  ├── Required fields, quantity picker (0 – 5 L in 0.25 L steps)        │
//! │  └── Immediate feedback                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Planners (Rust)                                              │
//! │  ├── plan_replacement / plan_price_change                              │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  └── CHECK constraints on quantities and amounts                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use milkbook_core::validation::{validate_client_name, validate_quantity};
//! use milkbook_core::Quantity;
//!
//! validate_client_name("Asha Patil").unwrap();
//! validate_quantity(Quantity::from_litres(2.5)).unwrap();
//! ```

use crate::error::ValidationError;
use crate::money::{Money, Quantity};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn required_with_max(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Client Validators
// =============================================================================

/// Validates a client's display name.
///
/// ## Rules
/// - Must not be empty
/// - At most 100 characters
///
/// ## Example
/// ```rust
/// use milkbook_core::validation::validate_client_name;
///
/// assert!(validate_client_name("Asha").is_ok());
/// assert!(validate_client_name("   ").is_err());
/// ```
pub fn validate_client_name(name: &str) -> ValidationResult<()> {
    required_with_max("name", name, 100)
}

/// Validates a delivery address.
pub fn validate_address(address: &str) -> ValidationResult<()> {
    required_with_max("address", address, 300)
}

/// Validates a phone number.
///
/// ## Rules
/// - Must not be empty
/// - Digits, spaces, `+`, `-` and parentheses only
/// - Between 7 and 15 digits
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    required_with_max("phone", phone, 20)?;

    let phone = phone.trim();
    if !phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'))
    {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must contain only digits, spaces, '+', '-' and parentheses".to_string(),
        });
    }

    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !(7..=15).contains(&digits) {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must contain 7 to 15 digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a delivered quantity for one client, milk type and day.
///
/// ## Rules
/// - Must not be negative (0 means "no delivery")
/// - No upper bound and no 0.25 L step check; bulk clients are valid
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Delivery sheet: Save day                                               │
/// │                                                                         │
/// │  Operator picks Asha / cow / 2.5 L                                     │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(2500 ml) ← THIS FUNCTION                            │
/// │       │                                                                 │
/// │       ├── qty < 0?    → Error: "quantity must not be negative"         │
/// │       │                                                                 │
/// │       └── OK → planned for insertion (or deletion when 0)              │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: Quantity) -> ValidationResult<()> {
    if qty.millilitres() < 0 {
        return Err(ValidationError::Negative {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a per-litre price.
///
/// ## Rules
/// - Must be positive (> 0); a zero price would bill deliveries for free
///
/// ## Example
/// ```rust
/// use milkbook_core::validation::validate_price_amount;
/// use milkbook_core::Money;
///
/// assert!(validate_price_amount(Money::from_rupees(52)).is_ok());
/// assert!(validate_price_amount(Money::zero()).is_err());
/// ```
pub fn validate_price_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "price".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
