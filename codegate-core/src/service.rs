//! GateService - the operations the messaging front end calls
//!
//! Wires the group directory, pending-approval tracker, eligibility engine
//! and content registry over one store and one oracle. Access settings come
//! in through an explicit [`AccessPolicy`].
//!
//! ```text
//! transport ──> GateService ──> EligibilityEngine ──> MembershipOracle
//!                   │                  └──> PendingApprovalTracker
//!                   ├──> ContentRegistry
//!                   └──> GroupDirectory
//! ```

use crate::approvals::{EventEffect, MembershipEvent, PendingApprovalTracker};
use crate::directory::GroupDirectory;
use crate::eligibility::{EligibilityEngine, EligibilityReport};
use crate::error::GateResult;
use crate::metrics::MIRROR_CLEANUP_FAILED;
use crate::oracle::{self, MembershipOracle};
use crate::registry::{self, ContentRegistry};
use crate::storage::SqlStore;
use crate::types::{ContentRecord, GroupEntry, GroupId, MirrorLocator, NewContent, UserId};
use metrics::counter;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Who administers the gate and which groups gate it
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub admin_ids: HashSet<UserId>,

    /// Groups required on top of the directory entries
    pub required_groups: Vec<GroupId>,

    /// Where registered artifacts are mirrored, if anywhere
    pub storage_group: Option<GroupId>,

    /// Budget for each individual oracle call
    pub oracle_timeout: Duration,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            admin_ids: HashSet::new(),
            required_groups: Vec::new(),
            storage_group: None,
            oracle_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a content request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Granted(ContentRecord),
    /// The user fails the membership check; the code was not looked up
    NotEligible(EligibilityReport),
    UnknownCode,
}

/// Result of delivering content to a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { code: String, locator: MirrorLocator },
    NotEligible(EligibilityReport),
    UnknownCode,
    /// Access was granted but the send failed
    SendFailed { code: String, reason: String },
}

/// Result of registering content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered { code: String, mirror: Option<MirrorLocator> },
    /// The code is taken; the existing record is untouched
    Duplicate { mirror_discarded: Option<MirrorCleanup> },
}

/// What happened to the mirrored copy after a removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorCleanup {
    /// No mirror was recorded
    NotNeeded,
    Deleted,
    /// The mirror is left behind and needs manual cleanup
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    pub removed: bool,
    pub record: Option<ContentRecord>,
    pub mirror: MirrorCleanup,
}

/// Caption text for a delivered or mirrored artifact
///
/// Title on the first line, description below it, then the code when given.
pub fn format_caption(
    title: Option<&str>,
    description: Option<&str>,
    code: Option<&str>,
) -> Option<String> {
    let lines: Vec<&str> = [title, description, code].into_iter().flatten().collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Access-gated content service
#[derive(Clone)]
pub struct GateService {
    directory: GroupDirectory,
    tracker: PendingApprovalTracker,
    engine: EligibilityEngine,
    registry: ContentRegistry,
    oracle: Arc<dyn MembershipOracle>,
    policy: AccessPolicy,
}

impl GateService {
    pub fn new(store: SqlStore, oracle: Arc<dyn MembershipOracle>, policy: AccessPolicy) -> Self {
        let tracker = PendingApprovalTracker::new(store.clone());
        let engine = EligibilityEngine::new(oracle.clone(), tracker.clone(), policy.oracle_timeout);

        Self {
            directory: GroupDirectory::new(store.clone(), oracle.clone(), policy.oracle_timeout),
            tracker,
            engine,
            registry: ContentRegistry::new(store),
            oracle,
            policy,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.policy.admin_ids.contains(&user_id)
    }

    /// Static groups followed by directory groups, without repeats
    pub fn required_groups(&self) -> GateResult<Vec<GroupId>> {
        let mut seen = HashSet::new();
        let directory_groups = self.directory.list_groups()?.into_iter().map(|g| g.group_id);

        Ok(self
            .policy
            .required_groups
            .iter()
            .copied()
            .chain(directory_groups)
            .filter(|g| seen.insert(*g))
            .collect())
    }

    /// Public references a denied user should join
    pub fn join_references(&self) -> GateResult<Vec<String>> {
        Ok(self.directory.list_groups()?.into_iter().map(|g| g.reference).collect())
    }

    pub async fn check_eligibility(&self, user_id: UserId) -> GateResult<EligibilityReport> {
        let required = self.required_groups()?;
        Ok(self.engine.check(user_id, &required).await)
    }

    pub async fn is_eligible(&self, user_id: UserId) -> GateResult<bool> {
        Ok(self.check_eligibility(user_id).await?.is_eligible())
    }

    /// Look up content for a user; the code is only consulted once access is granted
    pub async fn fetch(&self, user_id: UserId, code: &str) -> GateResult<FetchOutcome> {
        let report = self.check_eligibility(user_id).await?;
        if !report.is_eligible() {
            return Ok(FetchOutcome::NotEligible(report));
        }

        match self.registry.lookup(code)? {
            Some(record) => Ok(FetchOutcome::Granted(record)),
            None => {
                debug!(user = %user_id, code = code.trim(), "Unknown content code");
                Ok(FetchOutcome::UnknownCode)
            }
        }
    }

    /// Fetch and send the artifact to `destination`
    pub async fn deliver(
        &self,
        user_id: UserId,
        destination: i64,
        code: &str,
    ) -> GateResult<DeliveryOutcome> {
        let record = match self.fetch(user_id, code).await? {
            FetchOutcome::Granted(record) => record,
            FetchOutcome::NotEligible(report) => return Ok(DeliveryOutcome::NotEligible(report)),
            FetchOutcome::UnknownCode => return Ok(DeliveryOutcome::UnknownCode),
        };

        let caption = format_caption(record.title.as_deref(), record.description.as_deref(), None);
        let sent = oracle::with_timeout(
            self.policy.oracle_timeout,
            self.oracle.send_artifact(destination, &record.artifact_ref, caption.as_deref()),
        )
        .await;

        match sent {
            Ok(locator) => Ok(DeliveryOutcome::Delivered { code: record.code, locator }),
            Err(e) => {
                warn!(user = %user_id, code = %record.code, error = %e, "Content delivery failed");
                Ok(DeliveryOutcome::SendFailed { code: record.code, reason: e.to_string() })
            }
        }
    }

    /// Register content, mirroring it to the storage group first when one is configured
    pub async fn register_content(&self, content: NewContent) -> GateResult<RegisterOutcome> {
        // Reject bad input before anything is mirrored
        let code = registry::validate(&content)?;
        let mut content = NewContent { code, ..content };

        let mut fresh_mirror = None;
        if let Some(storage_group) = self.policy.storage_group {
            let caption = format_caption(
                content.title.as_deref(),
                content.description.as_deref(),
                Some(&content.code),
            );
            let locator = oracle::with_timeout(
                self.policy.oracle_timeout,
                self.oracle.send_artifact(storage_group.0, &content.artifact_ref, caption.as_deref()),
            )
            .await?;

            content = content.with_mirror(storage_group, locator);
            fresh_mirror = Some((storage_group, locator));
        }

        let code = content.code.clone();
        let created = match self.registry.register(content) {
            Ok(created) => created,
            Err(e) => {
                if let Some((group, locator)) = fresh_mirror {
                    self.discard_mirror(group, locator).await;
                }
                return Err(e.into());
            }
        };

        if created {
            let mirror = fresh_mirror.map(|(_, locator)| locator);
            return Ok(RegisterOutcome::Registered { code, mirror });
        }

        debug!(code = %code, "Content code already registered");
        let mirror_discarded = match fresh_mirror {
            Some((group, locator)) => Some(self.discard_mirror(group, locator).await),
            None => None,
        };
        Ok(RegisterOutcome::Duplicate { mirror_discarded })
    }

    /// Remove content; the mirror is deleted afterwards on a best-effort basis
    pub async fn remove_content(&self, code: &str) -> GateResult<RemovalReport> {
        let removal = self.registry.remove(code)?;

        let mirror = match removal.record.as_ref() {
            Some(ContentRecord { backing_locator: Some(locator), backing_group, .. }) => {
                // Rows mirrored before the group was recorded fall back to the current setting
                match backing_group.or(self.policy.storage_group) {
                    Some(group) => self.discard_mirror(group, *locator).await,
                    None => {
                        counter!(MIRROR_CLEANUP_FAILED).increment(1);
                        warn!(locator = %locator, code = %code.trim(), "Mirror location unknown, manual cleanup needed");
                        MirrorCleanup::Failed("no storage group configured".into())
                    }
                }
            }
            _ => MirrorCleanup::NotNeeded,
        };

        Ok(RemovalReport { removed: removal.removed, record: removal.record, mirror })
    }

    async fn discard_mirror(&self, storage_group: GroupId, locator: MirrorLocator) -> MirrorCleanup {
        let deleted = oracle::with_timeout(
            self.policy.oracle_timeout,
            self.oracle.delete_mirror(storage_group, locator),
        )
        .await;

        match deleted {
            Ok(true) => {
                debug!(locator = %locator, "Mirror deleted");
                MirrorCleanup::Deleted
            }
            Ok(false) => {
                counter!(MIRROR_CLEANUP_FAILED).increment(1);
                warn!(locator = %locator, group = %storage_group, "Mirror not deleted, manual cleanup needed");
                MirrorCleanup::Failed("platform refused deletion".into())
            }
            Err(e) => {
                counter!(MIRROR_CLEANUP_FAILED).increment(1);
                warn!(locator = %locator, group = %storage_group, error = %e, "Mirror delete failed, manual cleanup needed");
                MirrorCleanup::Failed(e.to_string())
            }
        }
    }

    pub fn lookup_content(&self, code: &str) -> GateResult<Option<ContentRecord>> {
        Ok(self.registry.lookup(code)?)
    }

    pub fn list_codes(&self) -> GateResult<Vec<String>> {
        Ok(self.registry.list_codes()?)
    }

    /// Feed a join event into the pending-approval tracker
    pub fn apply_event(&self, event: MembershipEvent) -> GateResult<EventEffect> {
        Ok(self.tracker.apply_event(event)?)
    }

    pub async fn add_group(&self, group_id: GroupId, reference: &str) -> GateResult<GroupEntry> {
        Ok(self.directory.add_group(group_id, reference).await?)
    }

    pub fn rename_group(&self, old_reference: &str, new_reference: &str) -> GateResult<bool> {
        Ok(self.directory.rename_group_reference(old_reference, new_reference)?)
    }

    pub fn remove_group(&self, reference: &str) -> GateResult<bool> {
        let removed = self.directory.remove_group(reference)?;
        if removed {
            info!(reference = reference.trim(), "Group no longer gates content");
        }
        Ok(removed)
    }

    pub fn list_groups(&self) -> GateResult<Vec<GroupEntry>> {
        Ok(self.directory.list_groups()?)
    }
}
