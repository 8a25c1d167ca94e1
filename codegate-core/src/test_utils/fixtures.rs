//! Fixtures for building gates and content in tests

use crate::oracle::MembershipOracle;
use crate::service::{AccessPolicy, GateService};
use crate::storage::SqlStore;
use crate::types::{ArtifactRef, GroupId, NewContent};
use std::sync::Arc;

/// Content with artifact `file-{code}` and a derived title and description
pub fn sample_content(code: &str) -> NewContent {
    NewContent::new(code, ArtifactRef::new(format!("file-{code}")))
        .with_title(format!("Title {code}"))
        .with_description(format!("Description {code}"))
}

/// Policy gating on `groups` with no admins and no storage group
pub fn policy_with_groups(groups: &[i64]) -> AccessPolicy {
    AccessPolicy {
        required_groups: groups.iter().copied().map(GroupId).collect(),
        ..AccessPolicy::default()
    }
}

/// Gate over an in-memory store
pub fn memory_gate(oracle: Arc<dyn MembershipOracle>, policy: AccessPolicy) -> GateService {
    match SqlStore::memory() {
        Ok(store) => GateService::new(store, oracle, policy),
        Err(e) => panic!("failed to open in-memory store: {e}"),
    }
}
