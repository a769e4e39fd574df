//! # Repository Module
//!
//! Data access for clients, prices and deliveries.
//!
//! ## Conventions
//! - Each repository holds a pool clone, the shared [`ReadCache`](crate::cache::ReadCache)
//!   and the [`BillingCalendar`](milkbook_core::BillingCalendar) used to read
//!   stored timestamps.
//! - Every mutation invalidates the cache keys it touches before returning.
//! - Rows are decoded into private `*Row` structs and converted to core types;
//!   malformed stored timestamps are recovered (logged, replaced by "now"),
//!   never raised.

pub mod client;
pub mod delivery;
pub mod price;

use chrono::{DateTime, SecondsFormat, Utc};

/// `LIKE` pattern matching exactly the output of [`encode_timestamp`].
pub(crate) const CANONICAL_TIMESTAMP_PATTERN: &str = "____-__-__T__:__:__.___Z";

/// Encodes a timestamp for storage: RFC 3339 UTC, millisecond precision.
///
/// A fixed width keeps string comparison in SQL equal to time comparison.
pub(crate) fn encode_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encode_timestamp_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 3, 4, 18, 30, 0).unwrap();
        assert_eq!(encode_timestamp(a), "2024-03-04T18:30:00.000Z");
        assert_eq!(encode_timestamp(a).len(), encode_timestamp(Utc::now()).len());
    }

    #[test]
    fn test_canonical_pattern_length_matches_encoding() {
        let encoded = encode_timestamp(Utc::now());
        assert_eq!(encoded.len(), CANONICAL_TIMESTAMP_PATTERN.len());
        assert!(encoded.ends_with('Z'));
    }
}
