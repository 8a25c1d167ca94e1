//! Pending-approval tracker
//!
//! Records join requests that are waiting for an admin, so a user who has
//! asked to join a gating group is not locked out while the request is in
//! flight. Per `(user, group)` the lifecycle is `absent -> pending -> absent`;
//! admission itself is never stored, the oracle reports it at check time.

use crate::storage::{SqlStore, StoreError};
use crate::types::{GroupId, MemberStatus, PendingApproval, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Join-event feed input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    /// The user asked to join a group that requires approval
    JoinRequested { user: UserId, group: GroupId },

    /// The platform reported a new membership status for the user
    StatusChanged { user: UserId, group: GroupId, status: MemberStatus },
}

/// What `apply_event` did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEffect {
    Recorded,
    Cleared,
}

/// Tracker over the `pending_approvals` table
#[derive(Clone)]
pub struct PendingApprovalTracker {
    store: SqlStore,
}

impl PendingApprovalTracker {
    pub fn new(store: SqlStore) -> Self {
        Self { store }
    }

    /// Mark a request as pending, refreshing the request time if one exists
    pub fn record_request(&self, user_id: UserId, group_id: GroupId) -> Result<(), StoreError> {
        self.store.upsert_pending(user_id, group_id, Timestamp::now())?;
        debug!(user = %user_id, group = %group_id, "Join request recorded");
        Ok(())
    }

    pub fn has_pending_request(&self, user_id: UserId, group_id: GroupId) -> Result<bool, StoreError> {
        self.store.has_pending(user_id, group_id)
    }

    /// Drop the request for exactly this pair; no-op if absent
    pub fn clear_request(&self, user_id: UserId, group_id: GroupId) -> Result<(), StoreError> {
        if self.store.delete_pending(user_id, group_id)? {
            debug!(user = %user_id, group = %group_id, "Join request cleared");
        }
        Ok(())
    }

    pub fn get_request(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<PendingApproval>, StoreError> {
        self.store.get_pending(user_id, group_id)
    }

    /// Outstanding requests of a user, oldest first
    pub fn pending_for_user(&self, user_id: UserId) -> Result<Vec<PendingApproval>, StoreError> {
        self.store.pending_for_user(user_id)
    }

    /// React to a join-event feed entry
    ///
    /// Admission and departure both clear the pending row for the reported
    /// pair only; requests for other groups are left alone.
    pub fn apply_event(&self, event: MembershipEvent) -> Result<EventEffect, StoreError> {
        match event {
            MembershipEvent::JoinRequested { user, group } => {
                self.record_request(user, group)?;
                Ok(EventEffect::Recorded)
            }
            // Every reported status is either an admission or a departure
            MembershipEvent::StatusChanged { user, group, status } => {
                debug!(user = %user, group = %group, %status, "Membership status changed");
                self.clear_request(user, group)?;
                Ok(EventEffect::Cleared)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PendingApprovalTracker {
        PendingApprovalTracker::new(SqlStore::memory().unwrap())
    }

    #[test]
    fn test_record_then_clear_returns_to_absent() {
        let tracker = tracker();
        let (user, group) = (UserId(5), GroupId(-100));

        assert!(!tracker.has_pending_request(user, group).unwrap());
        tracker.record_request(user, group).unwrap();
        assert!(tracker.has_pending_request(user, group).unwrap());

        tracker.clear_request(user, group).unwrap();
        assert!(!tracker.has_pending_request(user, group).unwrap());
        assert!(tracker.get_request(user, group).unwrap().is_none());
    }

    #[test]
    fn test_record_is_idempotent() {
        let tracker = tracker();
        let (user, group) = (UserId(5), GroupId(1));

        tracker.record_request(user, group).unwrap();
        let first = tracker.get_request(user, group).unwrap().unwrap();
        tracker.record_request(user, group).unwrap();
        let second = tracker.get_request(user, group).unwrap().unwrap();

        assert!(second.requested_at >= first.requested_at);
        assert_eq!(tracker.pending_for_user(user).unwrap().len(), 1);
    }

    #[test]
    fn test_clear_absent_is_noop() {
        let tracker = tracker();
        tracker.clear_request(UserId(1), GroupId(1)).unwrap();
        assert!(!tracker.has_pending_request(UserId(1), GroupId(1)).unwrap());
    }

    #[test]
    fn test_join_request_event_records() {
        let tracker = tracker();
        let effect = tracker
            .apply_event(MembershipEvent::JoinRequested { user: UserId(3), group: GroupId(9) })
            .unwrap();

        assert_eq!(effect, EventEffect::Recorded);
        assert!(tracker.has_pending_request(UserId(3), GroupId(9)).unwrap());
    }

    #[test]
    fn test_admission_and_departure_events_clear() {
        let tracker = tracker();
        let statuses = [
            MemberStatus::Member,
            MemberStatus::Administrator,
            MemberStatus::Restricted,
            MemberStatus::Left,
            MemberStatus::Banned,
        ];
        for status in statuses {
            tracker.record_request(UserId(3), GroupId(9)).unwrap();
            let effect = tracker
                .apply_event(MembershipEvent::StatusChanged {
                    user: UserId(3),
                    group: GroupId(9),
                    status,
                })
                .unwrap();

            assert_eq!(effect, EventEffect::Cleared, "status {status}");
            assert!(!tracker.has_pending_request(UserId(3), GroupId(9)).unwrap());
        }
    }

    #[test]
    fn test_departure_only_clears_reported_group() {
        let tracker = tracker();
        tracker.record_request(UserId(3), GroupId(9)).unwrap();
        tracker.record_request(UserId(3), GroupId(10)).unwrap();

        tracker
            .apply_event(MembershipEvent::StatusChanged {
                user: UserId(3),
                group: GroupId(9),
                status: MemberStatus::Left,
            })
            .unwrap();

        assert!(!tracker.has_pending_request(UserId(3), GroupId(9)).unwrap());
        assert!(tracker.has_pending_request(UserId(3), GroupId(10)).unwrap());
    }
}
