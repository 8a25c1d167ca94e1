//! Scripted MembershipOracle for tests
//!
//! Membership answers are scripted per `(group, user)`; anything unscripted
//! reports `Left`. Groups are unreachable unless marked otherwise. Every call
//! is logged so tests can assert on what the gate asked for.

use crate::oracle::{MembershipOracle, OracleError, OracleResult};
use crate::types::{ArtifactRef, GroupId, MemberStatus, MirrorLocator, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A call received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleCall {
    MemberStatus { group: GroupId, user: UserId },
    ValidateGroup(GroupId),
    DeleteMirror { storage_group: GroupId, locator: MirrorLocator },
    SendArtifact { destination: i64, artifact: ArtifactRef, caption: Option<String> },
}

/// In-memory oracle with scripted answers
pub struct MockOracle {
    statuses: Mutex<HashMap<(GroupId, UserId), OracleResult<MemberStatus>>>,
    delays: Mutex<HashMap<GroupId, Duration>>,
    probes: Mutex<HashMap<GroupId, OracleResult<bool>>>,
    delete_error: Mutex<Option<OracleError>>,
    send_error: Mutex<Option<OracleError>>,
    next_locator: AtomicI64,
    calls: Mutex<Vec<OracleCall>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            probes: Mutex::new(HashMap::new()),
            delete_error: Mutex::new(None),
            send_error: Mutex::new(None),
            next_locator: AtomicI64::new(1000),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_status(self, group: GroupId, user: UserId, status: MemberStatus) -> Self {
        self.set_status(group, user, status);
        self
    }

    pub fn with_status_error(self, group: GroupId, user: UserId, error: OracleError) -> Self {
        self.statuses.lock().unwrap().insert((group, user), Err(error));
        self
    }

    /// Delay every membership answer for `group`
    pub fn with_group_delay(self, group: GroupId, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(group, delay);
        self
    }

    pub fn with_reachable(self, group: GroupId) -> Self {
        self.probes.lock().unwrap().insert(group, Ok(true));
        self
    }

    pub fn with_probe_error(self, group: GroupId, error: OracleError) -> Self {
        self.probes.lock().unwrap().insert(group, Err(error));
        self
    }

    pub fn with_delete_error(self, error: OracleError) -> Self {
        *self.delete_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_send_error(self, error: OracleError) -> Self {
        *self.send_error.lock().unwrap() = Some(error);
        self
    }

    /// Change a membership answer after construction
    pub fn set_status(&self, group: GroupId, user: UserId, status: MemberStatus) {
        self.statuses.lock().unwrap().insert((group, user), Ok(status));
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn member_status_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, OracleCall::MemberStatus { .. }))
            .count()
    }

    /// Locators passed to `delete_mirror`, including failed attempts
    pub fn deleted_mirrors(&self) -> Vec<MirrorLocator> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                OracleCall::DeleteMirror { locator, .. } => Some(*locator),
                _ => None,
            })
            .collect()
    }

    /// `(destination, artifact)` pairs passed to `send_artifact`
    pub fn sent_artifacts(&self) -> Vec<(i64, ArtifactRef)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                OracleCall::SendArtifact { destination, artifact, .. } => {
                    Some((*destination, artifact.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: OracleCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipOracle for MockOracle {
    async fn member_status(&self, group_id: GroupId, user_id: UserId) -> OracleResult<MemberStatus> {
        self.record(OracleCall::MemberStatus { group: group_id, user: user_id });

        let delay = self.delays.lock().unwrap().get(&group_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.statuses
            .lock()
            .unwrap()
            .get(&(group_id, user_id))
            .cloned()
            .unwrap_or(Ok(MemberStatus::Left))
    }

    async fn validate_group(&self, group_id: GroupId) -> OracleResult<bool> {
        self.record(OracleCall::ValidateGroup(group_id));
        self.probes.lock().unwrap().get(&group_id).cloned().unwrap_or(Ok(false))
    }

    async fn delete_mirror(
        &self,
        storage_group: GroupId,
        locator: MirrorLocator,
    ) -> OracleResult<bool> {
        self.record(OracleCall::DeleteMirror { storage_group, locator });
        match self.delete_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }

    async fn send_artifact(
        &self,
        destination: i64,
        artifact: &ArtifactRef,
        caption: Option<&str>,
    ) -> OracleResult<MirrorLocator> {
        self.record(OracleCall::SendArtifact {
            destination,
            artifact: artifact.clone(),
            caption: caption.map(str::to_string),
        });
        if let Some(e) = self.send_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(MirrorLocator(self.next_locator.fetch_add(1, Ordering::SeqCst)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_member_is_left() {
        let oracle = MockOracle::new();
        let status = oracle.member_status(GroupId(1), UserId(1)).await.unwrap();
        assert_eq!(status, MemberStatus::Left);
        assert_eq!(oracle.member_status_calls(), 1);
    }

    #[tokio::test]
    async fn test_locators_are_distinct() {
        let oracle = MockOracle::new();
        let artifact = ArtifactRef::new("file");
        let a = oracle.send_artifact(1, &artifact, None).await.unwrap();
        let b = oracle.send_artifact(1, &artifact, Some("caption")).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(oracle.sent_artifacts().len(), 2);
    }
}
