//! Time utilities.
//!
//! Timestamps are stored as Unix milliseconds and exposed as
//! `DateTime<Utc>`. Everything that is persisted goes through
//! [`truncate_millis`] first so a value read back compares equal to the one
//! that was written.

use chrono::{DateTime, TimeZone, Utc};

/// Returns the current instant, truncated to millisecond precision.
pub fn now() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Drops sub-millisecond precision.
pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Converts stored Unix milliseconds back into an instant.
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_reasonable() {
        let ts = now().timestamp();
        // Should be after 2024-01-01 (1704067200)
        assert!(ts > 1704067200, "Timestamp {} is too old", ts);
        // Should be before 2100-01-01 (4102444800)
        assert!(ts < 4102444800, "Timestamp {} is too far in future", ts);
    }

    #[test]
    fn test_truncate_round_trips_through_millis() {
        let at = Utc::now();
        let truncated = truncate_millis(at);
        assert_eq!(from_millis(truncated.timestamp_millis()), Some(truncated));
        assert!(at - truncated < chrono::Duration::milliseconds(1));
    }
}
