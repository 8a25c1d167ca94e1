//! MembershipOracle Trait - Abstraction over the external group platform
//!
//! The gate never talks to the messaging platform directly. Everything it
//! needs from it (membership status, group reachability, mirror upload and
//! deletion) goes through this trait, which enables:
//! - Swapping the HTTP Bot API client for another platform
//! - Testability via the scripted mock in `test_utils`
//!
//! ```text
//! GateService / EligibilityEngine / GroupDirectory
//!       |
//!       v
//! MembershipOracle (trait)
//!       |
//!       +---> BotApiOracle (HTTP Bot API)
//!       |
//!       +---> MockOracle (for testing)
//! ```

pub mod bot_api;

use crate::types::{ArtifactRef, GroupId, MemberStatus, MirrorLocator, UserId};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub use bot_api::{BotApiConfig, BotApiOracle};

/// Failures of an oracle call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Network failure or platform outage
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish within the per-call budget
    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// The platform answered but refused the request
    #[error("Oracle rejected request: {0}")]
    Rejected(String),

    /// The platform answered with something we could not decode
    #[error("Oracle response could not be decoded: {0}")]
    Decode(String),
}

pub type OracleResult<T> = Result<T, OracleError>;

/// Abstraction over the external membership platform
#[async_trait]
pub trait MembershipOracle: Send + Sync {
    /// Current status of `user_id` in `group_id`
    async fn member_status(&self, group_id: GroupId, user_id: UserId) -> OracleResult<MemberStatus>;

    /// Whether the group exists and is reachable with our credentials
    async fn validate_group(&self, group_id: GroupId) -> OracleResult<bool>;

    /// Delete a mirrored artifact from the storage group
    async fn delete_mirror(&self, storage_group: GroupId, locator: MirrorLocator)
        -> OracleResult<bool>;

    /// Send an artifact to a destination chat, returning where it landed
    async fn send_artifact(
        &self,
        destination: i64,
        artifact: &ArtifactRef,
        caption: Option<&str>,
    ) -> OracleResult<MirrorLocator>;
}

/// Run an oracle call under a timeout; an elapsed timer becomes `OracleError::Timeout`
///
/// The inner future is dropped on timeout, abandoning the request.
pub async fn with_timeout<T, F>(budget: Duration, call: F) -> OracleResult<T>
where
    F: Future<Output = OracleResult<T>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(budget)),
    }
}
