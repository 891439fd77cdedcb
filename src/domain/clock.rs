//! Saturating conversions between configured spans and timestamps.
//!
//! Configured durations come in as unsigned integers; anything that would not
//! fit a `chrono` span or push a deadline past what the database stores is
//! clamped instead of overflowing.

use chrono::{DateTime, Duration, Utc};

/// 9999-12-31T23:59:59Z, the last instant with a four digit year.
const FAR_FUTURE_SECS: i64 = 253_402_300_799;

#[must_use]
pub fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

#[must_use]
pub fn minutes(mins: u64) -> Duration {
    seconds(mins.saturating_mul(60))
}

#[must_use]
pub fn days(days: u64) -> Duration {
    seconds(days.saturating_mul(86_400))
}

/// Latest representable instant for stored deadlines.
#[must_use]
pub fn far_future() -> DateTime<Utc> {
    DateTime::from_timestamp(FAR_FUTURE_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `from + after`, clamped to [`far_future`].
#[must_use]
pub fn deadline(from: DateTime<Utc>, after: Duration) -> DateTime<Utc> {
    let far = far_future();
    from.checked_add_signed(after).map_or(far, |at| at.min(far))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_saturate() {
        assert_eq!(seconds(90), Duration::seconds(90));
        assert_eq!(minutes(2), Duration::seconds(120));
        assert_eq!(days(1), Duration::hours(24));
        assert_eq!(seconds(u64::MAX), Duration::MAX);
        assert_eq!(minutes(u64::MAX), Duration::MAX);
        assert_eq!(days(u64::MAX / 2), Duration::MAX);
    }

    #[test]
    fn test_deadline_is_clamped() {
        let now = Utc::now();
        assert_eq!(deadline(now, Duration::seconds(5)), now + Duration::seconds(5));
        assert_eq!(deadline(now, Duration::MAX), far_future());
        assert_eq!(deadline(now, seconds(10_000_000_000_000_000)), far_future());
        assert!(deadline(now, Duration::seconds(-5)) < now);
    }
}
