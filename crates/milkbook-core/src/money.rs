//! # Money and Quantity
//!
//! Integer representations for rupees and litres.
//!
//! ## Why Integers?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.25 L × ₹52.40 summed over 31 days drifts by fractions of a paisa   │
//! │    and two totals of the same month may disagree in the last digit.     │
//! │                                                                         │
//! │  OUR SOLUTION: Integer units                                            │
//! │    Money    = paise (1/100 rupee)                                       │
//! │    Quantity = millilitres (1/1000 litre)                                │
//! │    Money × Quantity rounds ONCE per line, half away from zero           │
//! │    Totals are exact sums of the rounded lines                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use milkbook_core::money::{Money, Quantity};
//!
//! let rate = Money::from_rupees(50);          // ₹50.00 per litre
//! let qty = Quantity::from_litres(2.25);      // 2.25 L
//! assert_eq!(rate.for_quantity(qty), Money::from_paise(11250)); // ₹112.50
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

/// Millilitres per litre.
const ML_PER_LITRE: i64 = 1000;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in paise (1/100 of a rupee).
///
/// ## Design Decisions
/// - **i64 (signed)**: Differences between statements can be negative
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support (serialises as the bare paise integer)
///
/// ## Where Money is Used
/// ```text
/// Price.amount ──► PriceTimeline ──► LineItem.price ──► LineItem.amount
///                                                           │
///                         ClientStatement.total_amount ◄────┘ (exact sum)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paise.
    ///
    /// ## Example
    /// ```rust
    /// use milkbook_core::money::Money;
    ///
    /// let price = Money::from_paise(5250); // ₹52.50
    /// assert_eq!(price.paise(), 5250);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Money(paise)
    }

    /// Creates a Money value from whole rupees.
    #[inline]
    pub const fn from_rupees(rupees: i64) -> Self {
        Money(rupees * 100)
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee portion.
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the paise portion (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Amount owed for `qty` at this per-litre rate.
    ///
    /// ## Rounding
    /// ```text
    /// paise × ml / 1000, rounded half away from zero
    ///
    /// ₹52.50 × 0.25 L = 5250 × 250 / 1000 = 1312.5 → 1313 paise (₹13.13)
    /// ```
    ///
    /// i128 intermediates keep large monthly quantities from overflowing.
    pub fn for_quantity(&self, qty: Quantity) -> Money {
        let product = self.0 as i128 * qty.millilitres() as i128;
        let divisor = ML_PER_LITRE as i128;
        let half = divisor / 2;
        let rounded = if product >= 0 {
            (product + half) / divisor
        } else {
            (product - half) / divisor
        };
        Money(rounded as i64)
    }
}

/// Shows money as `₹12.50` (debugging and logs; presentation formats itself).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.rupees().abs(), self.paise_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Quantity Type
// =============================================================================

/// A volume of milk in millilitres.
///
/// Operators enter litres in 0.25 L steps; nothing here enforces the step,
/// but every quantity is exact to the millilitre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Creates a quantity from millilitres.
    #[inline]
    pub const fn from_millilitres(ml: i64) -> Self {
        Quantity(ml)
    }

    /// Creates a quantity from litres, rounded to the nearest millilitre.
    ///
    /// ## Example
    /// ```rust
    /// use milkbook_core::money::Quantity;
    ///
    /// assert_eq!(Quantity::from_litres(1.75).millilitres(), 1750);
    /// ```
    pub fn from_litres(litres: f64) -> Self {
        Quantity((litres * ML_PER_LITRE as f64).round() as i64)
    }

    /// Creates a quantity from whole litres.
    #[inline]
    pub const fn from_whole_litres(litres: i64) -> Self {
        Quantity(litres * ML_PER_LITRE)
    }

    /// Returns the quantity in millilitres.
    #[inline]
    pub const fn millilitres(&self) -> i64 {
        self.0
    }

    /// Returns the quantity in litres (for display only).
    #[inline]
    pub fn litres(&self) -> f64 {
        self.0 as f64 / ML_PER_LITRE as f64
    }

    /// Zero litres.
    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    /// Checks if the quantity is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the quantity is positive.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

/// Shows quantity as `2.25 L`, trimming to the millilitre.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let whole = (self.0 / ML_PER_LITRE).abs();
        let frac = (self.0 % ML_PER_LITRE).abs();
        if frac == 0 {
            return write!(f, "{}{} L", sign, whole);
        }
        let digits = format!("{:03}", frac);
        write!(f, "{}{}.{} L", sign, whole, digits.trim_end_matches('0'))
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
