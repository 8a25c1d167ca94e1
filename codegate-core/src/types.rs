//! Identifiers and records shared by the gate components

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp representing the current time
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(millis)
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External user identity as reported by the messaging platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

/// External group identity (channel / supergroup id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for GroupId {
    fn from(id: i64) -> Self {
        GroupId(id)
    }
}

/// Opaque transport handle for a stored media artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    pub fn new(handle: impl Into<String>) -> Self {
        ArtifactRef(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of the mirrored copy of an artifact (message id in the storage group)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MirrorLocator(pub i64);

impl fmt::Display for MirrorLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Unique, immutable lookup code
    pub code: String,

    /// Handle of the underlying media
    pub artifact_ref: ArtifactRef,

    /// Where the mirrored copy lives, if one was made
    pub backing_locator: Option<MirrorLocator>,

    /// Storage group holding the mirror
    pub backing_group: Option<GroupId>,

    /// Display title
    pub title: Option<String>,

    /// Display description
    pub description: Option<String>,
}

/// Registration payload for a new content item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContent {
    pub code: String,
    pub artifact_ref: ArtifactRef,
    pub backing_locator: Option<MirrorLocator>,
    pub backing_group: Option<GroupId>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl NewContent {
    /// Payload with only the required fields set
    pub fn new(code: impl Into<String>, artifact_ref: ArtifactRef) -> Self {
        Self {
            code: code.into(),
            artifact_ref,
            backing_locator: None,
            backing_group: None,
            title: None,
            description: None,
        }
    }

    /// Record the mirrored copy and the group it was posted to
    pub fn with_mirror(mut self, group: GroupId, locator: MirrorLocator) -> Self {
        self.backing_group = Some(group);
        self.backing_locator = Some(locator);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A gating group registered in the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Public reference (invite token / link), unique and renameable
    pub reference: String,

    /// External group identity, unique and fixed
    pub group_id: GroupId,
}

/// Lifecycle state of a join request
///
/// Only outstanding requests are stored; a resolved request is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            _ => None,
        }
    }
}

/// An outstanding join request awaiting admin approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub status: ApprovalStatus,
    pub requested_at: Timestamp,
}

/// Membership status reported by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    Owner,
    Administrator,
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    /// Whether this status grants access to gated content
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            MemberStatus::Owner
                | MemberStatus::Administrator
                | MemberStatus::Member
                | MemberStatus::Restricted
        )
    }

    /// Whether this status means the user is no longer in the group
    pub fn is_departed(&self) -> bool {
        matches!(self, MemberStatus::Left | MemberStatus::Banned)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberStatus::Owner => "owner",
            MemberStatus::Administrator => "administrator",
            MemberStatus::Member => "member",
            MemberStatus::Restricted => "restricted",
            MemberStatus::Left => "left",
            MemberStatus::Banned => "banned",
        };
        f.write_str(s)
    }
}
