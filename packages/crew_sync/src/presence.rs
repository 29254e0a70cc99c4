//! Presence tracking: online/offline and last-seen per user.
//!
//! A user id absent from the map is simply unknown/offline, never an error.
//! Full roster pushes replace the state wholesale; incremental pushes merge
//! key by key, overwriting only the keys present in the partial map.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::{PresenceRecord, UserId};

#[derive(Debug, Default)]
pub struct PresenceTracker {
    records: HashMap<UserId, PresenceRecord>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace presence state wholesale (full roster push).
    pub fn apply_snapshot(&mut self, roster: HashMap<UserId, PresenceRecord>) {
        self.records = roster;
    }

    /// Merge a partial map, overwriting only the keys it contains.
    pub fn apply_merge(&mut self, partial: HashMap<UserId, PresenceRecord>) {
        self.records.extend(partial);
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.records.get(&user_id).is_some_and(|r| r.is_online())
    }

    pub fn last_seen(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.records.get(&user_id).and_then(|r| r.last_seen)
    }

    pub fn record(&self, user_id: UserId) -> Option<&PresenceRecord> {
        self.records.get(&user_id)
    }

    /// Number of employees currently online. The admin's own id never counts.
    pub fn online_employee_count(&self, admin_id: UserId) -> usize {
        self.records
            .iter()
            .filter(|(id, r)| **id != admin_id && r.is_online())
            .count()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PresenceStatus;
    use chrono::TimeZone;

    fn online() -> PresenceRecord {
        PresenceRecord::online(Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap())
    }

    fn offline() -> PresenceRecord {
        PresenceRecord {
            status: PresenceStatus::Offline,
            last_seen: Some(Utc.with_ymd_and_hms(2026, 3, 10, 11, 0, 0).unwrap()),
        }
    }

    #[test]
    fn unknown_user_reads_as_offline() {
        let tracker = PresenceTracker::new();
        assert!(!tracker.is_online(42));
        assert!(tracker.last_seen(42).is_none());
    }

    #[test]
    fn snapshot_replaces_wholesale() {
        let mut tracker = PresenceTracker::new();
        tracker.apply_snapshot(HashMap::from([(1, online()), (2, online())]));
        assert!(tracker.is_online(2));

        // A new snapshot without user 2 drops them entirely.
        tracker.apply_snapshot(HashMap::from([(1, online())]));
        assert!(tracker.is_online(1));
        assert!(!tracker.is_online(2));
    }

    #[test]
    fn merge_overwrites_only_present_keys() {
        let mut tracker = PresenceTracker::new();
        tracker.apply_snapshot(HashMap::from([(1, online()), (2, online())]));
        tracker.apply_merge(HashMap::from([(2, offline()), (3, online())]));

        assert!(tracker.is_online(1));
        assert!(!tracker.is_online(2));
        assert!(tracker.is_online(3));
        assert!(tracker.last_seen(2).is_some());
    }

    #[test]
    fn admin_is_excluded_from_the_online_employee_count() {
        let admin = 1;
        let mut tracker = PresenceTracker::new();
        tracker.apply_snapshot(HashMap::from([
            (admin, online()),
            (4, online()),
            (7, online()),
            (9, offline()),
        ]));
        assert_eq!(tracker.online_employee_count(admin), 2);
    }
}
