//! Cooldown between scheduled syncs
//!
//! Pure functions over timestamps so triggers can be tested without clocks.

use chrono::{DateTime, Duration, Utc};

/// Whether `cooldown_secs` have passed since `last_synced_at`
///
/// An account that never completed a sync is always due.
pub fn cooldown_elapsed(
    last_synced_at: Option<DateTime<Utc>>,
    cooldown_secs: u64,
    now: DateTime<Utc>,
) -> bool {
    match last_synced_at {
        Some(last) => (now - last).num_seconds() >= cooldown_secs as i64,
        None => true,
    }
}

/// Earliest time the next scheduled sync may start
pub fn next_sync_at(
    last_synced_at: Option<DateTime<Utc>>,
    cooldown_secs: u64,
) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(cooldown_secs).unwrap_or(i64::MAX);
    last_synced_at.and_then(|last| last.checked_add_signed(Duration::try_seconds(secs)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_synced_is_due() {
        assert!(cooldown_elapsed(None, 3600, Utc::now()));
        assert!(next_sync_at(None, 3600).is_none());
    }

    #[test]
    fn test_recent_sync_is_not_due() {
        let now = Utc::now();
        assert!(!cooldown_elapsed(Some(now - Duration::seconds(10)), 30, now));
    }

    #[test]
    fn test_boundary_is_due() {
        let now = Utc::now();
        assert!(cooldown_elapsed(Some(now - Duration::seconds(30)), 30, now));
        assert!(cooldown_elapsed(Some(now), 0, now));
    }

    #[test]
    fn test_next_sync_at() {
        let last = Utc::now();
        assert_eq!(next_sync_at(Some(last), 90), Some(last + Duration::seconds(90)));
    }
}
