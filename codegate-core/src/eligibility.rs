//! Membership verification engine
//!
//! Decides whether a user may receive gated content. A user is eligible when
//! every required group is satisfied, either because the oracle reports an
//! accepted membership status or because the user has a pending join request
//! for that group (the admin has not approved it yet). The first group that
//! is not satisfied ends the check.
//!
//! Oracle failures never reach the caller: a failed or timed-out query is
//! treated like non-membership, so without a pending request access is
//! denied.

use crate::approvals::PendingApprovalTracker;
use crate::metrics::{ELIGIBILITY_DENIED, ELIGIBILITY_GRACE, ELIGIBILITY_GRANTED, ORACLE_FAILURES};
use crate::oracle::{self, MembershipOracle, OracleError};
use crate::types::{GroupId, MemberStatus, UserId};
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Why a group was not satisfied by the oracle alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shortfall {
    /// The oracle answered with a status outside the accepted set
    Status(MemberStatus),
    /// The oracle could not be asked
    Oracle(OracleError),
}

/// Per-group result of a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    Accepted(MemberStatus),
    /// Satisfied through a pending join request
    Grace(Shortfall),
    Denied(Shortfall),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDecision {
    pub group: GroupId,
    pub outcome: GroupOutcome,
}

/// Decisions for the groups that were evaluated, in order
///
/// A denied check ends with the denying group; later groups are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibilityReport {
    pub decisions: Vec<GroupDecision>,
}

impl EligibilityReport {
    pub fn is_eligible(&self) -> bool {
        !self
            .decisions
            .iter()
            .any(|d| matches!(d.outcome, GroupOutcome::Denied(_)))
    }

    /// The group that ended a denied check
    pub fn denied_by(&self) -> Option<GroupId> {
        self.decisions
            .iter()
            .find(|d| matches!(d.outcome, GroupOutcome::Denied(_)))
            .map(|d| d.group)
    }
}

/// Checks users against a set of required groups
#[derive(Clone)]
pub struct EligibilityEngine {
    oracle: Arc<dyn MembershipOracle>,
    tracker: PendingApprovalTracker,
    oracle_timeout: Duration,
}

impl EligibilityEngine {
    pub fn new(
        oracle: Arc<dyn MembershipOracle>,
        tracker: PendingApprovalTracker,
        oracle_timeout: Duration,
    ) -> Self {
        Self { oracle, tracker, oracle_timeout }
    }

    /// Whether `user_id` satisfies every group in `required_groups`
    pub async fn is_eligible(&self, user_id: UserId, required_groups: &[GroupId]) -> bool {
        self.check(user_id, required_groups).await.is_eligible()
    }

    /// Run the check and keep the per-group decisions
    pub async fn check(&self, user_id: UserId, required_groups: &[GroupId]) -> EligibilityReport {
        let mut report = EligibilityReport::default();
        let mut seen = HashSet::new();

        for &group in required_groups {
            if !seen.insert(group) {
                continue;
            }

            let outcome = self.check_group(user_id, group).await;
            let denied = matches!(outcome, GroupOutcome::Denied(_));
            report.decisions.push(GroupDecision { group, outcome });

            if denied {
                break;
            }
        }

        if report.is_eligible() {
            counter!(ELIGIBILITY_GRANTED).increment(1);
        } else {
            counter!(ELIGIBILITY_DENIED).increment(1);
            debug!(user = %user_id, group = ?report.denied_by(), "Eligibility denied");
        }

        report
    }

    async fn check_group(&self, user_id: UserId, group: GroupId) -> GroupOutcome {
        let queried =
            oracle::with_timeout(self.oracle_timeout, self.oracle.member_status(group, user_id))
                .await;

        let shortfall = match queried {
            Ok(status) if status.is_accepted() => {
                debug!(user = %user_id, group = %group, %status, "Group satisfied");
                return GroupOutcome::Accepted(status);
            }
            Ok(status) => Shortfall::Status(status),
            Err(e) => {
                counter!(ORACLE_FAILURES).increment(1);
                debug!(user = %user_id, group = %group, error = %e, "Membership query failed");
                Shortfall::Oracle(e)
            }
        };

        let pending = match self.tracker.has_pending_request(user_id, group) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(user = %user_id, group = %group, error = %e, "Pending request lookup failed");
                false
            }
        };

        if pending {
            counter!(ELIGIBILITY_GRACE).increment(1);
            debug!(user = %user_id, group = %group, ?shortfall, "Group satisfied by pending request");
            GroupOutcome::Grace(shortfall)
        } else {
            GroupOutcome::Denied(shortfall)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqlStore;
    use crate::test_utils::MockOracle;

    fn engine(oracle: Arc<MockOracle>, tracker: PendingApprovalTracker) -> EligibilityEngine {
        EligibilityEngine::new(oracle, tracker, Duration::from_secs(2))
    }

    fn tracker() -> PendingApprovalTracker {
        PendingApprovalTracker::new(SqlStore::memory().unwrap())
    }

    const USER: UserId = UserId(1001);

    #[tokio::test]
    async fn test_no_required_groups_is_eligible() {
        let oracle = Arc::new(MockOracle::new());
        let engine = engine(oracle.clone(), tracker());

        assert!(engine.is_eligible(USER, &[]).await);
        assert_eq!(oracle.member_status_calls(), 0);
    }

    #[tokio::test]
    async fn test_all_accepted_statuses_pass() {
        let oracle = Arc::new(
            MockOracle::new()
                .with_status(GroupId(1), USER, MemberStatus::Member)
                .with_status(GroupId(2), USER, MemberStatus::Administrator)
                .with_status(GroupId(3), USER, MemberStatus::Owner)
                .with_status(GroupId(4), USER, MemberStatus::Restricted),
        );
        let engine = engine(oracle.clone(), tracker());

        let groups = [GroupId(1), GroupId(2), GroupId(3), GroupId(4)];
        assert!(engine.is_eligible(USER, &groups).await);
        assert_eq!(oracle.member_status_calls(), 4);
    }

    #[tokio::test]
    async fn test_non_member_short_circuits() {
        let oracle = Arc::new(
            MockOracle::new()
                .with_status(GroupId(1), USER, MemberStatus::Member)
                .with_status(GroupId(2), USER, MemberStatus::Left)
                .with_status(GroupId(3), USER, MemberStatus::Member),
        );
        let engine = engine(oracle.clone(), tracker());

        let report = engine.check(USER, &[GroupId(1), GroupId(2), GroupId(3)]).await;

        assert!(!report.is_eligible());
        assert_eq!(report.denied_by(), Some(GroupId(2)));
        assert_eq!(oracle.member_status_calls(), 2, "group 3 must not be queried");
    }

    #[tokio::test]
    async fn test_pending_request_grants_grace_for_non_member() {
        let oracle = Arc::new(MockOracle::new().with_status(GroupId(1), USER, MemberStatus::Left));
        let tracker = tracker();
        tracker.record_request(USER, GroupId(1)).unwrap();
        let engine = engine(oracle, tracker);

        let report = engine.check(USER, &[GroupId(1)]).await;
        assert!(report.is_eligible());
        assert_eq!(
            report.decisions[0].outcome,
            GroupOutcome::Grace(Shortfall::Status(MemberStatus::Left))
        );
    }

    #[tokio::test]
    async fn test_pending_request_grants_grace_for_oracle_error() {
        let oracle = Arc::new(MockOracle::new().with_status_error(
            GroupId(1),
            USER,
            OracleError::Unavailable("502".into()),
        ));
        let tracker = tracker();
        tracker.record_request(USER, GroupId(1)).unwrap();
        let engine = engine(oracle, tracker);

        assert!(engine.is_eligible(USER, &[GroupId(1)]).await);
    }

    #[tokio::test]
    async fn test_oracle_error_without_pending_denies() {
        let oracle = Arc::new(MockOracle::new().with_status_error(
            GroupId(1),
            USER,
            OracleError::Unavailable("connection refused".into()),
        ));
        let engine = engine(oracle, tracker());

        assert!(!engine.is_eligible(USER, &[GroupId(1)]).await);
    }

    #[tokio::test]
    async fn test_pending_request_for_other_group_does_not_help() {
        let oracle = Arc::new(MockOracle::new().with_status(GroupId(1), USER, MemberStatus::Left));
        let tracker = tracker();
        tracker.record_request(USER, GroupId(2)).unwrap();
        let engine = engine(oracle, tracker);

        assert!(!engine.is_eligible(USER, &[GroupId(1)]).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_oracle_failure() {
        let oracle = Arc::new(
            MockOracle::new()
                .with_status(GroupId(1), USER, MemberStatus::Member)
                .with_group_delay(GroupId(1), Duration::from_secs(30)),
        );
        let engine = engine(oracle, tracker());

        let report = engine.check(USER, &[GroupId(1)]).await;
        assert_eq!(
            report.decisions[0].outcome,
            GroupOutcome::Denied(Shortfall::Oracle(OracleError::Timeout(Duration::from_secs(2))))
        );
    }

    #[tokio::test]
    async fn test_check_does_not_mutate_tracker() {
        let oracle = Arc::new(MockOracle::new().with_status(GroupId(1), USER, MemberStatus::Member));
        let tracker = tracker();
        tracker.record_request(USER, GroupId(1)).unwrap();
        let engine = engine(oracle, tracker.clone());

        assert!(engine.is_eligible(USER, &[GroupId(1)]).await);
        assert!(tracker.has_pending_request(USER, GroupId(1)).unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_groups_queried_once() {
        let oracle = Arc::new(MockOracle::new().with_status(GroupId(1), USER, MemberStatus::Member));
        let engine = engine(oracle.clone(), tracker());

        assert!(engine.is_eligible(USER, &[GroupId(1), GroupId(1)]).await);
        assert_eq!(oracle.member_status_calls(), 1);
    }
}
