//! Group directory: the set of gating groups
//!
//! Each group is known by a public reference (the invite token shown to
//! users) and by its external id. Both are unique; the reference can be
//! renamed, the id cannot.

use crate::oracle::{self, MembershipOracle};
use crate::storage::{SqlStore, StoreError};
use crate::types::{GroupEntry, GroupId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Group directory errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Group reference or id is already registered")]
    AlreadyExists,

    #[error("Group {group} is unreachable: {reason}")]
    UnreachableGroup { group: GroupId, reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// CRUD over the gating groups
#[derive(Clone)]
pub struct GroupDirectory {
    store: SqlStore,
    oracle: Arc<dyn MembershipOracle>,
    probe_timeout: Duration,
}

impl GroupDirectory {
    pub fn new(store: SqlStore, oracle: Arc<dyn MembershipOracle>, probe_timeout: Duration) -> Self {
        Self { store, oracle, probe_timeout }
    }

    fn normalize_reference(reference: &str) -> Result<String, DirectoryError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(DirectoryError::InvalidInput("group reference cannot be empty".into()));
        }
        Ok(reference.to_string())
    }

    /// Register a gating group after confirming it is reachable
    pub async fn add_group(
        &self,
        group_id: GroupId,
        reference: &str,
    ) -> Result<GroupEntry, DirectoryError> {
        let reference = Self::normalize_reference(reference)?;

        let reachable =
            oracle::with_timeout(self.probe_timeout, self.oracle.validate_group(group_id)).await;
        match reachable {
            Ok(true) => {}
            Ok(false) => {
                return Err(DirectoryError::UnreachableGroup {
                    group: group_id,
                    reason: "group not found".into(),
                })
            }
            Err(e) => {
                warn!(group = %group_id, error = %e, "Reachability probe failed");
                return Err(DirectoryError::UnreachableGroup {
                    group: group_id,
                    reason: e.to_string(),
                });
            }
        }

        let entry = GroupEntry { reference, group_id };
        if !self.store.insert_group(&entry)? {
            return Err(DirectoryError::AlreadyExists);
        }

        info!(group = %group_id, reference = %entry.reference, "Gating group added");
        Ok(entry)
    }

    /// Rename a group's public reference; `Ok(false)` if the old one is unknown
    pub fn rename_group_reference(
        &self,
        old_reference: &str,
        new_reference: &str,
    ) -> Result<bool, DirectoryError> {
        let new_reference = Self::normalize_reference(new_reference)?;

        match self.store.update_group_reference(old_reference.trim(), &new_reference) {
            Ok(renamed) => {
                if renamed {
                    info!(from = old_reference, to = %new_reference, "Gating group renamed");
                }
                Ok(renamed)
            }
            Err(e) if e.is_constraint_violation() => Err(DirectoryError::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_by_reference(&self, reference: &str) -> Result<Option<GroupEntry>, DirectoryError> {
        Ok(self.store.group_by_reference(reference.trim())?)
    }

    pub fn get_by_group_id(&self, group_id: GroupId) -> Result<Option<GroupEntry>, DirectoryError> {
        Ok(self.store.group_by_id(group_id)?)
    }

    /// All gating groups in insertion order
    pub fn list_groups(&self) -> Result<Vec<GroupEntry>, DirectoryError> {
        Ok(self.store.list_groups()?)
    }

    /// Remove a gating group; `Ok(false)` if the reference is unknown
    pub fn remove_group(&self, reference: &str) -> Result<bool, DirectoryError> {
        let removed = self.store.delete_group(reference.trim())?;
        if removed {
            info!(reference, "Gating group removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use crate::test_utils::MockOracle;

    fn directory(oracle: MockOracle) -> GroupDirectory {
        GroupDirectory::new(SqlStore::memory().unwrap(), Arc::new(oracle), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_add_group_and_lookup() {
        let dir = directory(MockOracle::new().with_reachable(GroupId(42)));

        let entry = dir.add_group(GroupId(42), " abc ").await.unwrap();
        assert_eq!(entry.reference, "abc");

        assert_eq!(dir.get_by_reference("abc").unwrap(), Some(entry.clone()));
        assert_eq!(dir.get_by_group_id(GroupId(42)).unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn test_add_group_collisions() {
        let oracle = MockOracle::new()
            .with_reachable(GroupId(42))
            .with_reachable(GroupId(43));
        let dir = directory(oracle);

        dir.add_group(GroupId(42), "abc").await.unwrap();

        let err = dir.add_group(GroupId(43), "abc").await.unwrap_err();
        assert!(matches!(err, DirectoryError::AlreadyExists));

        let err = dir.add_group(GroupId(42), "xyz").await.unwrap_err();
        assert!(matches!(err, DirectoryError::AlreadyExists));

        assert_eq!(dir.list_groups().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_unreachable_group_is_rejected() {
        let dir = directory(MockOracle::new());

        let err = dir.add_group(GroupId(7), "dead").await.unwrap_err();
        assert!(matches!(err, DirectoryError::UnreachableGroup { group: GroupId(7), .. }));
        assert!(dir.get_by_reference("dead").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_group_probe_error_is_unreachable() {
        let oracle = MockOracle::new()
            .with_probe_error(GroupId(7), OracleError::Unavailable("connection reset".into()));
        let dir = directory(oracle);

        let err = dir.add_group(GroupId(7), "flaky").await.unwrap_err();
        assert!(matches!(err, DirectoryError::UnreachableGroup { .. }));
    }

    #[tokio::test]
    async fn test_empty_reference_is_invalid() {
        let dir = directory(MockOracle::new().with_reachable(GroupId(1)));

        let err = dir.add_group(GroupId(1), "   ").await.unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_rename_group_reference() {
        let dir = directory(MockOracle::new().with_reachable(GroupId(42)));
        dir.add_group(GroupId(42), "abc").await.unwrap();

        assert!(dir.rename_group_reference("abc", "xyz").unwrap());
        assert!(dir.get_by_reference("abc").unwrap().is_none());
        assert_eq!(dir.get_by_reference("xyz").unwrap().unwrap().group_id, GroupId(42));

        assert!(!dir.rename_group_reference("missing", "other").unwrap());
    }

    #[tokio::test]
    async fn test_rename_onto_existing_reference() {
        let oracle = MockOracle::new().with_reachable(GroupId(1)).with_reachable(GroupId(2));
        let dir = directory(oracle);
        dir.add_group(GroupId(1), "one").await.unwrap();
        dir.add_group(GroupId(2), "two").await.unwrap();

        let err = dir.rename_group_reference("one", "two").unwrap_err();
        assert!(matches!(err, DirectoryError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_remove_group() {
        let dir = directory(MockOracle::new().with_reachable(GroupId(42)));
        dir.add_group(GroupId(42), "abc").await.unwrap();

        assert!(dir.remove_group("abc").unwrap());
        assert!(!dir.remove_group("abc").unwrap());
        assert!(dir.list_groups().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_groups_insertion_order() {
        let oracle = MockOracle::new()
            .with_reachable(GroupId(3))
            .with_reachable(GroupId(1))
            .with_reachable(GroupId(2));
        let dir = directory(oracle);

        for (id, reference) in [(3, "c"), (1, "a"), (2, "b")] {
            dir.add_group(GroupId(id), reference).await.unwrap();
        }

        let ids: Vec<_> = dir.list_groups().unwrap().into_iter().map(|g| g.group_id.0).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }
}
