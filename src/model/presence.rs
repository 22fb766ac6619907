use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::sync::Keyed;

/// Liveness row for one (event, user) pair.
///
/// At most one row exists per pair. `joined_at` marks the start of the
/// current join session and survives heartbeats; only an explicit leave
/// followed by a rejoin produces a fresh value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRow {
    /// Event the user is present in.
    pub event_id: Uuid,
    /// User this row tracks.
    pub user_id: Uuid,
    /// First-seen timestamp for the current join session.
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    /// Timestamp of the most recent heartbeat.
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen_at: OffsetDateTime,
}

impl PresenceRow {
    /// Whether the row counts as "active now" under the given window.
    ///
    /// A `last_seen_at` in the future (clock skew between writers) counts
    /// as active rather than being rejected.
    pub fn is_active(&self, now: OffsetDateTime, window: Duration) -> bool {
        now - self.last_seen_at <= time::Duration::seconds(window.as_secs() as i64)
    }
}

impl Keyed for PresenceRow {
    type Key = (Uuid, Uuid);

    fn key(&self) -> Self::Key {
        (self.event_id, self.user_id)
    }
}

/// Presence snapshot split into the active set and the stale remainder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresencePartition {
    /// Rows with a heartbeat inside the active window, oldest join first.
    pub active: Vec<PresenceRow>,
    /// Rows past the window but not yet explicitly departed.
    pub recent: Vec<PresenceRow>,
}

/// Partition rows into active and recent sets against the window.
pub fn partition<'a>(
    rows: impl IntoIterator<Item = &'a PresenceRow>,
    now: OffsetDateTime,
    window: Duration,
) -> PresencePartition {
    let mut split = PresencePartition::default();
    for row in rows {
        if row.is_active(now, window) {
            split.active.push(row.clone());
        } else {
            split.recent.push(row.clone());
        }
    }
    split.active.sort_by_key(|row| row.joined_at);
    split.recent.sort_by_key(|row| row.joined_at);
    split
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(90);

    fn row(seen_sec: i64) -> PresenceRow {
        PresenceRow {
            event_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            joined_at: datetime!(2026-03-01 18:00:00 UTC),
            last_seen_at: datetime!(2026-03-01 18:00:00 UTC) + time::Duration::seconds(seen_sec),
        }
    }

    #[test]
    fn heartbeat_within_window_is_active() {
        // Heartbeats at t=0 and t=50; queried at t=100: 100-50 <= 90.
        let row = row(50);
        let at_100 = datetime!(2026-03-01 18:00:00 UTC) + time::Duration::seconds(100);
        assert!(row.is_active(at_100, WINDOW));

        // Queried at t=200: 200-50 > 90, stale but not departed.
        let at_200 = datetime!(2026-03-01 18:00:00 UTC) + time::Duration::seconds(200);
        assert!(!row.is_active(at_200, WINDOW));
    }

    #[test]
    fn boundary_age_is_still_active() {
        let row = row(0);
        let at_window = datetime!(2026-03-01 18:00:00 UTC) + time::Duration::seconds(90);
        assert!(row.is_active(at_window, WINDOW));
    }

    #[test]
    fn future_last_seen_counts_as_active() {
        let row = row(30);
        let before = datetime!(2026-03-01 18:00:00 UTC);
        assert!(row.is_active(before, WINDOW));
    }

    #[test]
    fn partition_splits_and_orders_by_join_time() {
        let now = datetime!(2026-03-01 18:05:00 UTC);
        let mut early = row(295);
        early.joined_at = datetime!(2026-03-01 17:50:00 UTC);
        let late = row(290);
        let stale = row(10);

        let split = partition([&late, &early, &stale], now, WINDOW);
        assert_eq!(split.active, vec![early, late]);
        assert_eq!(split.recent, vec![stale]);
    }
}
